//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, per-sink filters)
//!     → context.rs (host span: host_id, environment, application)
//!     → metrics.rs (lifecycle counters and shutdown histogram)
//!
//! Consumers:
//!     → Console (plain or JSON), trace file, debug channel (stderr)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - The subscriber is installed once, at process entry
//! - The log handle is passed to the top-level handler, which flushes it
//!   exactly once, last
//! - Metrics are cheap no-ops when no exporter is installed

pub mod context;
pub mod logging;
pub mod metrics;

pub use logging::{FlushLogs, LogGuard, LoggingError, LoggingOptions};
