//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! host sources (hostsettings.json, SILO_HOST_*, command line)
//!     → loader.rs (fold in read order)
//!     → MergedConfiguration (host)
//!
//! app sources (appsettings.json, appsettings.{Environment}.json,
//!              SILO_APP_*, command line)
//!     → loader.rs (fold in read order)
//!     → MergedConfiguration (app, immutable, shared via Arc)
//!     → binder.rs (section → option object)
//!     → validation.rs (semantic warnings)
//!     → SiloOptions handed to the service factory
//! ```
//!
//! # Design Decisions
//! - Command-line arguments are always the last source
//! - Optional sources are skipped when absent or unreadable
//! - Keys compare case-insensitively; `:` separates path segments
//! - Binding is lenient: unknown keys and bad values never fail the host

pub mod binder;
pub mod loader;
pub mod merged;
pub mod schema;
pub mod sources;
pub mod validation;

pub use binder::{bind, bind_with_diagnostics, BindDiagnostics};
pub use loader::{ConfigError, ConfigurationBuilder};
pub use merged::{MergedConfiguration, Section};
pub use schema::{
    DashboardOptions, HostOptions, ProviderOptions, SiloConfigOptions, SiloOptions,
};
pub use sources::{CommandLineSource, ConfigurationSource, EnvironmentSource, FileSource};
pub use validation::{validate_options, ValidationWarning};
