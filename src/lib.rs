//! Silo host library.
//!
//! Bootstrap and lifecycle controller for a cluster node: layered
//! configuration, typed option binding, a supervised managed service and a
//! bounded shutdown with a guaranteed log flush.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod service;

pub use config::schema::SiloOptions;
pub use error::HostError;
pub use lifecycle::{Host, HostBuilder, HostExit, Shutdown};
pub use service::{FaultReporter, ManagedService, ServiceError};
