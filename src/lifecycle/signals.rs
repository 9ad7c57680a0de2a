//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGINT everywhere, SIGTERM on unix)
//! - Translate signals into a [`ShutdownReason`]
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The first signal triggers shutdown; repeats are logged and ignored,
//!   so shutdown is never re-entered and its timeout never restarts

use tokio::task::JoinHandle;

use super::shutdown::{Shutdown, ShutdownReason};

/// Spawn a task forwarding termination signals to `shutdown`.
///
/// Must be called from within a Tokio runtime.
pub fn listen(shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            let received = tokio::select! {
                result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
                Some(()) = terminate.recv() => Ok("SIGTERM"),
            };
            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await.map(|()| "SIGINT");

            match received {
                Ok(name) => {
                    forward(&shutdown, name);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Signal listener failed");
                    return;
                }
            }
        }
    }))
}

/// Forward one received signal. Returns `true` if it started the shutdown.
pub(crate) fn forward(shutdown: &Shutdown, signal: &'static str) -> bool {
    if shutdown.trigger(ShutdownReason::Signal(signal)) {
        tracing::info!(signal, "Termination signal received, shutting down");
        true
    } else {
        tracing::warn!(signal, "Shutdown already in progress, ignoring signal");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_signal_is_ignored() {
        let shutdown = Shutdown::new();
        assert!(forward(&shutdown, "SIGTERM"));
        assert!(!forward(&shutdown, "SIGINT"));
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Signal("SIGTERM")));
    }

    #[tokio::test]
    async fn test_listen_installs_handlers() {
        let shutdown = Shutdown::new();
        let handle = listen(shutdown.clone()).unwrap();
        assert!(!handle.is_finished());
        assert!(!shutdown.is_triggered());
        handle.abort();
    }
}
