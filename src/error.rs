//! Host error taxonomy.
//!
//! Every fatal condition is returned as a [`HostError`] and handled once, in
//! [`crate::lifecycle::run_and_flush`]. Runtime faults and forced shutdowns
//! are outcomes, not errors: see [`crate::lifecycle::HostOutcome`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::TransitionError;
use crate::observability::LoggingError;
use crate::service::ServiceError;

#[derive(Debug, Error)]
pub enum HostError {
    /// A required configuration source failed. Raised before Starting.
    #[error("configuration could not be loaded")]
    Configuration(#[from] ConfigError),

    /// The managed service failed to start. Stop is never attempted.
    #[error("service `{service}` failed to start")]
    ServiceStart {
        service: String,
        #[source]
        source: ServiceError,
    },

    #[error("logging could not be initialized")]
    Logging(#[from] LoggingError),

    #[error("failed to install signal handlers")]
    Signals(#[source] std::io::Error),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}
