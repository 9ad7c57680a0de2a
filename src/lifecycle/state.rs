//! Host state machine.
//!
//! ```text
//! Initializing → Configuring → Starting → Running → Stopping → Stopped
//!       └────────────┴────────────┴──────────┴──────────┴──→ Faulted
//! ```

use std::fmt;

use thiserror::Error;
use tokio::sync::watch;

use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostState {
    Initializing,
    Configuring,
    Starting,
    Running,
    Stopping,
    Stopped,
    Faulted,
}

impl HostState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostState::Initializing => "initializing",
            HostState::Configuring => "configuring",
            HostState::Starting => "starting",
            HostState::Running => "running",
            HostState::Stopping => "stopping",
            HostState::Stopped => "stopped",
            HostState::Faulted => "faulted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HostState::Stopped | HostState::Faulted)
    }

    pub fn can_transition_to(&self, next: HostState) -> bool {
        use HostState::*;
        match (*self, next) {
            (from, Faulted) => !from.is_terminal(),
            (Initializing, Configuring)
            | (Configuring, Starting)
            | (Starting, Running)
            | (Running, Stopping)
            | (Stopping, Stopped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal host state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: HostState,
    pub to: HostState,
}

/// Validated state tracker.
///
/// Publishes the current state on a watch channel so observers (tests,
/// readiness probes) can follow the host without sharing it.
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<HostState>,
    history: Vec<HostState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(HostState::Initializing);
        Self {
            tx,
            history: vec![HostState::Initializing],
        }
    }

    pub fn current(&self) -> HostState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HostState> {
        self.tx.subscribe()
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[HostState] {
        &self.history
    }

    pub fn transition(&mut self, next: HostState) -> Result<(), TransitionError> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(TransitionError { from, to: next });
        }

        self.tx.send_replace(next);
        self.history.push(next);
        metrics::record_transition(next);
        tracing::debug!(from = %from, to = %next, "Host state changed");
        Ok(())
    }

    /// Move to `Faulted` from any non-terminal state.
    pub fn fault(&mut self) -> Result<(), TransitionError> {
        self.transition(HostState::Faulted)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
