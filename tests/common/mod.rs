//! Shared utilities for host integration tests.

#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing_subscriber::fmt::MakeWriter;

use silo_host::lifecycle::HostBuilder;
use silo_host::observability::FlushLogs;
use silo_host::{FaultReporter, ManagedService, ServiceError, SiloOptions};

/// Ordered record of the calls a [`ScriptedService`] received.
#[derive(Debug, Default)]
pub struct CallLog(Mutex<Vec<&'static str>>);

impl CallLog {
    pub fn push(&self, call: &'static str) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }
}

/// Managed service whose timing and failures are scripted by the test.
#[derive(Debug, Default, Clone)]
pub struct Script {
    pub start_delay: Duration,
    pub start_error: Option<&'static str>,
    pub stop_delay: Duration,
    /// Report a runtime fault this long after start completes.
    pub fault_after: Option<Duration>,
}

pub struct ScriptedService {
    script: Script,
    log: Arc<CallLog>,
}

impl ScriptedService {
    pub fn new(script: Script, log: Arc<CallLog>) -> Self {
        Self { script, log }
    }
}

#[async_trait]
impl ManagedService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&mut self, faults: FaultReporter) -> Result<(), ServiceError> {
        self.log.push("start");
        tokio::time::sleep(self.script.start_delay).await;
        if let Some(message) = self.script.start_error {
            self.log.push("start:failed");
            return Err(ServiceError::Other(message.to_string()));
        }
        if let Some(after) = self.script.fault_after {
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                faults.report(ServiceError::Other("lost cluster membership".to_string()));
            });
        }
        self.log.push("start:done");
        Ok(())
    }

    async fn stop(&mut self, _deadline: Instant) -> Result<(), ServiceError> {
        self.log.push("stop");
        tokio::time::sleep(self.script.stop_delay).await;
        self.log.push("stop:done");
        Ok(())
    }

    fn abort(&mut self) {
        self.log.push("abort");
    }
}

/// Factory closure producing a [`ScriptedService`] and remembering the options it saw.
pub fn scripted_factory(
    script: Script,
    log: Arc<CallLog>,
    seen: Arc<Mutex<Option<SiloOptions>>>,
) -> impl FnOnce(&SiloOptions) -> Box<dyn ManagedService> + Send + 'static {
    move |options| {
        *seen.lock().unwrap() = Some(options.clone());
        log.push("factory");
        Box::new(ScriptedService::new(script, log)) as Box<dyn ManagedService>
    }
}

/// Flush handle that counts its flushes.
#[derive(Debug, Default)]
pub struct CountingFlush(AtomicUsize);

impl CountingFlush {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl FlushLogs for CountingFlush {
    fn flush(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Host builder isolated from the process environment.
pub fn builder(root: &Path, args: &[&str], env: &[(&str, &str)]) -> HostBuilder {
    HostBuilder::new(root)
        .with_args(args.iter().map(|a| a.to_string()).collect())
        .with_env_vars(
            env.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
}

/// In-memory log sink for asserting on formatted events.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
