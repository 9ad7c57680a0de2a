//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     host config → environment name → app config
//!
//! Host (host.rs):
//!     Initializing → Configuring → Starting → Running → Stopping → Stopped
//!     any failure before Running → Faulted
//!
//! Shutdown (shutdown.rs):
//!     trigger (signal or service fault) → stop(deadline) → abort on timeout
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → first one triggers shutdown, repeats are ignored
//!
//! Exit (exit.rs):
//!     outcome or error → fatal log → flush once → exit code
//! ```
//!
//! # Design Decisions
//! - Ordered startup: configuration strictly before the service starts
//! - Stopping is only entered after Starting completed
//! - Shutdown has a timeout: the service is aborted at the deadline and the
//!   host still reaches Stopped

pub mod exit;
pub mod host;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use exit::{run_and_flush, HostExit};
pub use host::{Host, HostOutcome, ServiceFactory};
pub use shutdown::{Shutdown, ShutdownOutcome, ShutdownReason};
pub use startup::{HostBuilder, HostContext, HostEnvironment};
pub use state::{HostState, Lifecycle, TransitionError};
