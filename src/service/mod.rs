//! Managed service contract.
//!
//! # Data Flow
//! ```text
//! Host (lifecycle/host.rs)
//!     → start(FaultReporter)   suspends until the service is ready
//!     → ... Running ...        service reports faults through FaultReporter
//!     → stop(deadline)         bounded by the host's shutdown timeout
//!     → abort()                only when stop overran the timeout
//! ```
//!
//! # Design Decisions
//! - The host owns the service exclusively; nothing else calls start/stop
//! - Runtime faults travel over a channel instead of unwinding
//! - `abort` is synchronous so it can run after the stop future is dropped

pub mod process;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub use process::ProcessService;

/// Error type for managed service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service has nothing to run.
    #[error("service is not configured: {0}")]
    NotConfigured(String),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The runtime went away before signalling readiness.
    #[error("runtime exited before it was ready ({status})")]
    ExitedDuringStart { status: String },

    /// The runtime went away while the host considered it running.
    #[error("runtime exited unexpectedly ({status})")]
    Exited { status: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Long-running unit of work driven by the host.
#[async_trait]
pub trait ManagedService: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Start the service. Resolves once the service is ready, which may take
    /// arbitrarily long (e.g. while joining a cluster). Faults that occur after
    /// readiness are sent through `faults`.
    async fn start(&mut self, faults: FaultReporter) -> Result<(), ServiceError>;

    /// Stop the service gracefully. The host drops this future at `deadline`.
    async fn stop(&mut self, deadline: Instant) -> Result<(), ServiceError>;

    /// Force termination after `stop` overran its deadline. Must not block.
    fn abort(&mut self) {}
}

/// Handle a running service uses to report a fatal runtime fault to the host.
#[derive(Debug, Clone)]
pub struct FaultReporter {
    tx: mpsc::UnboundedSender<ServiceError>,
}

/// Host side of a [`FaultReporter`].
pub type FaultReceiver = mpsc::UnboundedReceiver<ServiceError>;

impl FaultReporter {
    pub fn channel() -> (Self, FaultReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report a fault. Returns `false` if the host is no longer listening.
    pub fn report(&self, error: ServiceError) -> bool {
        self.tx.send(error).is_ok()
    }

    /// Whether the host has stopped listening for faults.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fault_reporter_delivers_to_host() {
        let (reporter, mut rx) = FaultReporter::channel();
        let clone = reporter.clone();
        assert!(clone.report(ServiceError::Other("boom".into())));

        let fault = rx.recv().await.unwrap();
        assert_eq!(fault.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_fault_reporter_detects_closed_host() {
        let (reporter, rx) = FaultReporter::channel();
        drop(rx);
        assert!(reporter.is_closed());
        assert!(!reporter.report(ServiceError::Other("late".into())));
    }
}
