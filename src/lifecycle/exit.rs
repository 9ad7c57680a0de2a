//! Top-level handler: log any fatal error, flush once, map to an exit code.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;

use futures_util::FutureExt;

use super::host::HostOutcome;
use super::shutdown::ShutdownOutcome;
use crate::error::HostError;
use crate::observability::logging::{log_fatal, FlushLogs};

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostExit {
    /// Stopped after a shutdown trigger, including a forced stop.
    Clean,
    ConfigurationFailed,
    StartFailed,
    /// Stopped because the service faulted while running.
    RuntimeFault,
    Panicked,
}

impl HostExit {
    pub fn code(self) -> u8 {
        match self {
            HostExit::Clean => 0,
            HostExit::ConfigurationFailed => 1,
            HostExit::StartFailed => 2,
            HostExit::RuntimeFault => 3,
            HostExit::Panicked => 4,
        }
    }

    pub fn is_success(self) -> bool {
        self == HostExit::Clean
    }
}

impl From<&HostError> for HostExit {
    fn from(error: &HostError) -> Self {
        match error {
            HostError::ServiceStart { .. } => HostExit::StartFailed,
            HostError::Configuration(_)
            | HostError::Logging(_)
            | HostError::Signals(_)
            | HostError::Transition(_) => HostExit::ConfigurationFailed,
        }
    }
}

impl From<HostExit> for ExitCode {
    fn from(exit: HostExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// Await the host run, then log, flush `logs` exactly once and pick the exit code.
pub async fn run_and_flush<F, L>(run: F, logs: &L) -> HostExit
where
    F: Future<Output = Result<HostOutcome, HostError>>,
    L: FlushLogs + ?Sized,
{
    let exit = match AssertUnwindSafe(run).catch_unwind().await {
        Ok(Ok(outcome)) => {
            if let ShutdownOutcome::Forced { timeout } = &outcome.shutdown {
                tracing::warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "Service was forced down at the shutdown timeout"
                );
            }
            match &outcome.runtime_fault {
                Some(fault) => {
                    log_fatal(fault);
                    HostExit::RuntimeFault
                }
                None => HostExit::Clean,
            }
        }
        Ok(Err(error)) => {
            log_fatal(&error);
            HostExit::from(&error)
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(fatal = true, panic = %message, "Host panicked");
            HostExit::Panicked
        }
    };

    tracing::info!(exit_code = exit.code(), "Host exiting");
    logs.flush();
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFlush(AtomicUsize);

    impl FlushLogs for CountingFlush {
        fn flush(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_configuration_error_flushes_once() {
        let logs = CountingFlush::default();
        let exit = run_and_flush(
            async {
                Err(HostError::Configuration(ConfigError::MalformedArgument {
                    argument: "-X=1".into(),
                }))
            },
            &logs,
        )
        .await;

        assert_eq!(exit, HostExit::ConfigurationFailed);
        assert_eq!(logs.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_is_caught_and_flushed() {
        let logs = CountingFlush::default();
        let exit = run_and_flush(
            async {
                if logs.0.load(Ordering::SeqCst) == 0 {
                    panic!("service exploded");
                }
                Err(HostError::Signals(std::io::Error::other("unreachable")))
            },
            &logs,
        )
        .await;

        assert_eq!(exit, HostExit::Panicked);
        assert_eq!(logs.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(HostExit::Clean.code(), 0);
        assert!(HostExit::Clean.is_success());
        for exit in [
            HostExit::ConfigurationFailed,
            HostExit::StartFailed,
            HostExit::RuntimeFault,
            HostExit::Panicked,
        ] {
            assert_ne!(exit.code(), 0);
            assert!(!exit.is_success());
        }
    }
}
