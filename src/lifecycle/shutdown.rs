//! Shutdown coordination for the host.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::service::{ManagedService, ServiceError};

/// What started the shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS termination signal, by name.
    Signal(&'static str),
    /// The managed service reported a runtime fault.
    ServiceFault,
    /// Programmatic request.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "signal {name}"),
            ShutdownReason::ServiceFault => f.write_str("service fault"),
            ShutdownReason::Requested => f.write_str("requested"),
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// The first trigger wins; later triggers are ignored. Listeners created after
/// the trigger still observe it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown. Returns `true` only for the first trigger.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.tx.borrow().clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Number of live listeners.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShutdownListener {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownListener {
    /// Wait for the shutdown trigger.
    pub async fn recv(&mut self) -> ShutdownReason {
        let result = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map(|reason| (*reason).clone().unwrap_or(ShutdownReason::Requested));
        match result {
            Ok(reason) => reason,
            // Every coordinator is gone, nobody can trigger anymore.
            Err(_) => std::future::pending().await,
        }
    }
}

/// How the bounded stop ended.
#[derive(Debug)]
pub enum ShutdownOutcome {
    /// `stop` returned `Ok` within the timeout.
    Graceful { elapsed: Duration },
    /// `stop` returned an error within the timeout.
    Failed { elapsed: Duration, error: ServiceError },
    /// `stop` overran the timeout and the service was aborted.
    Forced { timeout: Duration },
}

impl ShutdownOutcome {
    pub fn is_forced(&self) -> bool {
        matches!(self, ShutdownOutcome::Forced { .. })
    }
}

/// Deadline handed to `stop` when `started + timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Stop `service`, never waiting longer than `timeout`.
pub async fn stop_service(service: &mut dyn ManagedService, timeout: Duration) -> ShutdownOutcome {
    let started = Instant::now();
    let deadline = started
        .checked_add(timeout)
        .unwrap_or_else(|| started + FAR_FUTURE);

    let result = tokio::time::timeout(timeout, service.stop(deadline)).await;
    let outcome = match result {
        Ok(Ok(())) => ShutdownOutcome::Graceful {
            elapsed: started.elapsed(),
        },
        Ok(Err(error)) => {
            tracing::error!(service = %service.name(), error = %error, "Service stop failed");
            ShutdownOutcome::Failed {
                elapsed: started.elapsed(),
                error,
            }
        }
        Err(_) => {
            tracing::warn!(
                service = %service.name(),
                timeout_secs = timeout.as_secs_f64(),
                "Service did not stop within the shutdown timeout, forcing termination"
            );
            service.abort();
            metrics::record_forced_shutdown();
            ShutdownOutcome::Forced { timeout }
        }
    };

    metrics::record_shutdown_duration(started.elapsed());
    outcome
}
