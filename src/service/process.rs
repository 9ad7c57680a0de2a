//! Process-backed silo service.
//!
//! Drives the external cluster runtime (`Host:Runtime`) as a supervised child
//! process. The bound option objects are exported to the child as environment
//! variables. Readiness is a marker line on stdout; the graceful-leave request
//! is closing the child's stdin.

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use super::{FaultReporter, ManagedService, ServiceError};
use crate::config::schema::{RuntimeOptions, SiloOptions};

/// Environment variable carrying every bound option object as JSON.
pub const OPTIONS_ENV: &str = "SILO_OPTIONS";

pub struct ProcessService {
    options: SiloOptions,
    running: Option<RunningProcess>,
}

struct RunningProcess {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    kill_tx: Option<oneshot::Sender<()>>,
    /// Exit status once the child is gone.
    exited: watch::Receiver<Option<String>>,
    /// Set before any exit the host asked for, so it is not reported as a fault.
    stopping: Arc<AtomicBool>,
}

impl ProcessService {
    pub fn new(options: SiloOptions) -> Self {
        Self {
            options,
            running: None,
        }
    }

    fn runtime(&self) -> &RuntimeOptions {
        &self.options.host.runtime
    }

    fn command(&self) -> Result<Command, ServiceError> {
        let runtime = self.runtime();
        let silo = &self.options.silo;
        let options_json = serde_json::to_string(&self.options)
            .map_err(|e| ServiceError::Other(format!("failed to encode options: {e}")))?;

        let mut cmd = Command::new(&runtime.program);
        cmd.args(&runtime.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env(OPTIONS_ENV, options_json)
            .env("SILO_CLUSTER_ID", &silo.cluster_id)
            .env("SILO_SERVICE_ID", &silo.service_id)
            .env("SILO_PORT", silo.silo_port.to_string())
            .env("SILO_GATEWAY_PORT", silo.gateway_port.to_string());

        if !runtime.working_directory.is_empty() {
            cmd.current_dir(&runtime.working_directory);
        }

        Ok(cmd)
    }
}

#[async_trait]
impl ManagedService for ProcessService {
    fn name(&self) -> &str {
        "silo-runtime"
    }

    async fn start(&mut self, faults: FaultReporter) -> Result<(), ServiceError> {
        let program = self.runtime().program.trim().to_string();
        if program.is_empty() {
            return Err(ServiceError::NotConfigured(
                "Host:Runtime:Program is empty".to_string(),
            ));
        }

        let mut child = self
            .command()?
            .spawn()
            .map_err(|source| ServiceError::Spawn {
                program: program.clone(),
                source,
            })?;
        let pid = child.id();
        tracing::info!(program = %program, pid = ?pid, "Runtime process spawned");

        let stdin = child.stdin.take();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(OutputLines::new(stderr)));
        }

        let mut stdout = child.stdout.take().map(OutputLines::new);
        let marker = self.runtime().ready_marker.clone();
        if !marker.is_empty() {
            let ready = match stdout.as_mut() {
                Some(lines) => wait_for_marker(lines, &marker).await?,
                None => false,
            };
            if !ready {
                // Stdout closed early; a runtime that is still alive gets killed.
                if let Err(e) = child.start_kill() {
                    tracing::debug!(error = %e, "Runtime process already gone");
                }
                let status = match child.wait().await {
                    Ok(status) => status.to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(ServiceError::ExitedDuringStart { status });
            }
        }
        if let Some(lines) = stdout {
            tokio::spawn(forward_stdout(lines));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exited) = watch::channel(None);
        let stopping = Arc::new(AtomicBool::new(false));
        tokio::spawn(supervise(
            child,
            kill_rx,
            exit_tx,
            Arc::clone(&stopping),
            faults,
        ));

        tracing::info!(pid = ?pid, "Runtime process ready");
        self.running = Some(RunningProcess {
            pid,
            stdin,
            kill_tx: Some(kill_tx),
            exited,
            stopping,
        });
        Ok(())
    }

    async fn stop(&mut self, deadline: Instant) -> Result<(), ServiceError> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };
        running.stopping.store(true, Ordering::SeqCst);

        // Closing stdin asks the runtime to leave the cluster.
        drop(running.stdin.take());
        let budget = deadline.saturating_duration_since(Instant::now());
        tracing::info!(pid = ?running.pid, budget = ?budget, "Requested runtime shutdown");

        let status = running
            .exited
            .wait_for(Option::is_some)
            .await
            .map(|status| (*status).clone().unwrap_or_default())
            .map_err(|_| ServiceError::Other("runtime supervisor went away".to_string()))?;
        tracing::info!(pid = ?running.pid, status = %status, "Runtime process exited");
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(running) = self.running.as_mut() {
            running.stopping.store(true, Ordering::SeqCst);
            if let Some(kill_tx) = running.kill_tx.take() {
                let _ = kill_tx.send(());
            }
            tracing::warn!(pid = ?running.pid, "Runtime process killed");
        }
    }
}

/// Line reader over a child pipe that tolerates invalid UTF-8.
struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line with invalid sequences replaced by U+FFFD. `None` on EOF.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Read stdout until a line contains `marker`. Returns `false` on EOF.
async fn wait_for_marker(
    lines: &mut OutputLines<ChildStdout>,
    marker: &str,
) -> Result<bool, ServiceError> {
    while let Some(line) = lines.next_line().await? {
        tracing::info!(target: "silo_runtime::stdout", "{line}");
        if line.contains(marker) {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn forward_stdout<R: AsyncRead + Unpin>(mut lines: OutputLines<R>) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(target: "silo_runtime::stdout", "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Lost runtime stdout");
                break;
            }
        }
    }
}

async fn forward_stderr<R: AsyncRead + Unpin>(mut lines: OutputLines<R>) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::warn!(target: "silo_runtime::stderr", "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Lost runtime stderr");
                break;
            }
        }
    }
}

/// Own the child until it exits, killing it on request.
async fn supervise(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    exited: watch::Sender<Option<String>>,
    stopping: Arc<AtomicBool>,
    faults: FaultReporter,
) {
    let exited_on_its_own = tokio::select! {
        status = child.wait() => Some(status),
        Ok(()) = &mut kill_rx => None,
    };
    let status = match exited_on_its_own {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "Failed to kill runtime process");
            }
            child.wait().await
        }
    };
    let status = match status {
        Ok(status) => status.to_string(),
        Err(e) => e.to_string(),
    };

    if !stopping.load(Ordering::SeqCst) {
        tracing::error!(status = %status, "Runtime process exited unexpectedly");
        faults.report(ServiceError::Exited {
            status: status.clone(),
        });
    }
    let _ = exited.send(Some(status));
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn service(script: &str, marker: &str) -> ProcessService {
        let mut options = SiloOptions::default();
        options.silo.cluster_id = "dev".to_string();
        options.host.runtime = RuntimeOptions {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_directory: String::new(),
            ready_marker: marker.to_string(),
        };
        ProcessService::new(options)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_empty_program_is_not_configured() {
        let mut service = ProcessService::new(SiloOptions::default());
        let (faults, _rx) = FaultReporter::channel();
        let result = service.start(faults).await;
        assert!(matches!(result, Err(ServiceError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let mut options = SiloOptions::default();
        options.host.runtime.program = "nonexistent_runtime_12345".to_string();
        let mut service = ProcessService::new(options);
        let (faults, _rx) = FaultReporter::channel();
        let result = service.start(faults).await;
        assert!(matches!(result, Err(ServiceError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_ready_marker_then_graceful_stop() {
        let mut service = service("echo booting; echo joined $SILO_CLUSTER_ID; cat", "joined dev");
        let (faults, mut rx) = FaultReporter::channel();

        service.start(faults).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), service.stop(deadline()))
            .await
            .unwrap()
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_exit_before_marker_fails_start() {
        let mut service = service("echo booting; exit 2", "joined");
        let (faults, _rx) = FaultReporter::channel();
        let result = service.start(faults).await;
        assert!(matches!(result, Err(ServiceError::ExitedDuringStart { .. })));
    }

    #[tokio::test]
    async fn test_output_lines_replace_invalid_utf8() {
        let input: &[u8] = b"ready\r\n\xff\xfe\nstill-alive";
        let mut lines = OutputLines::new(input);
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ready"));
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("\u{FFFD}\u{FFFD}")
        );
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("still-alive"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_after_marker_keeps_runtime_alive() {
        let mut service = service(
            r"printf 'ready\n'; printf '\377\n'; printf '\377\n' >&2; \
              for i in 1 2 3 4 5; do echo still-alive; echo still-alive >&2; sleep 0.1; done; cat",
            "ready",
        );
        let (faults, mut rx) = FaultReporter::channel();
        service.start(faults).await.unwrap();

        let fault = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(fault.is_err(), "unexpected fault: {fault:?}");

        tokio::time::timeout(Duration::from_secs(5), service.stop(deadline()))
            .await
            .unwrap()
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_utf8_before_marker_does_not_fail_start() {
        let mut service = service(r"printf '\377booting\n'; echo ready; cat", "ready");
        let (faults, _rx) = FaultReporter::channel();
        service.start(faults).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), service.stop(deadline()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_stdout_without_marker_fails_start() {
        let mut service = service("exec 1>&-; sleep 30", "ready");
        let (faults, _rx) = FaultReporter::channel();
        let result = tokio::time::timeout(Duration::from_secs(5), service.start(faults))
            .await
            .unwrap();
        assert!(matches!(result, Err(ServiceError::ExitedDuringStart { .. })));
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_reported_as_fault() {
        let mut service = service("exit 3", "");
        let (faults, mut rx) = FaultReporter::channel();
        service.start(faults).await.unwrap();

        let fault = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(fault, ServiceError::Exited { .. }));
    }

    #[tokio::test]
    async fn test_abort_kills_unresponsive_runtime() {
        let mut service = service("trap '' TERM; echo up; sleep 30", "up");
        let (faults, mut rx) = FaultReporter::channel();
        service.start(faults).await.unwrap();

        let stop = tokio::time::timeout(Duration::from_millis(200), service.stop(deadline())).await;
        assert!(stop.is_err());

        service.abort();
        let running = service.running.as_mut().unwrap();
        tokio::time::timeout(Duration::from_secs(5), running.exited.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
