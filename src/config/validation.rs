//! Option validation.
//!
//! # Responsibilities
//! - Semantic checks on bound options (serde only handles syntax)
//! - Detect colliding ports between silo, gateway and dashboard
//! - Flag settings that make the host unable to do useful work
//!
//! # Design Decisions
//! - Returns all warnings, not just the first
//! - Validation is a pure function: `&SiloOptions -> Vec<ValidationWarning>`
//! - Never fatal: binding is lenient, so validation only informs

use std::fmt;

use crate::config::schema::{SiloOptions, MAX_SHUTDOWN_TIMEOUT_SECS};

/// A suspicious but non-fatal option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Full key path of the offending setting.
    pub key: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

pub fn validate_options(options: &SiloOptions) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if options.host.shutdown_timeout_secs == 0 {
        warnings.push(ValidationWarning {
            key: "Host:ShutdownTimeoutSecs",
            message: "shutdown timeout is zero; the service will be forced down immediately"
                .to_string(),
        });
    } else if options.host.shutdown_timeout_secs > MAX_SHUTDOWN_TIMEOUT_SECS {
        warnings.push(ValidationWarning {
            key: "Host:ShutdownTimeoutSecs",
            message: format!(
                "shutdown timeout {}s exceeds the maximum; using {}s",
                options.host.shutdown_timeout_secs, MAX_SHUTDOWN_TIMEOUT_SECS
            ),
        });
    }

    if options.host.runtime.program.trim().is_empty() {
        warnings.push(ValidationWarning {
            key: "Host:Runtime:Program",
            message: "no runtime program configured".to_string(),
        });
    }

    let silo = &options.silo;
    if silo.silo_port != 0 && silo.silo_port == silo.gateway_port {
        warnings.push(ValidationWarning {
            key: "Orleans:SiloConfig:GatewayPort",
            message: format!("gateway port {} collides with the silo port", silo.gateway_port),
        });
    }

    let dashboard = &options.dashboard;
    if dashboard.enable {
        if dashboard.port == 0 {
            warnings.push(ValidationWarning {
                key: "Orleans:Dashboard:Port",
                message: "dashboard is enabled but no port is configured".to_string(),
            });
        } else if dashboard.port == silo.silo_port || dashboard.port == silo.gateway_port {
            warnings.push(ValidationWarning {
                key: "Orleans:Dashboard:Port",
                message: format!("dashboard port {} collides with a silo port", dashboard.port),
            });
        }
    }

    warnings
}
