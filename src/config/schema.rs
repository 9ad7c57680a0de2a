//! Option object definitions.
//!
//! Each struct is the typed projection of one configuration section. All of
//! them derive Serde traits and take `#[serde(default)]`, so any key absent from
//! the section leaves the field at its default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::binder::{bind_with_diagnostics, BindDiagnostics};
use crate::config::merged::MergedConfiguration;

/// Section holding the silo/node settings.
pub const SILO_CONFIG_SECTION: &str = "Orleans:SiloConfig";
/// Section holding the storage-provider settings.
pub const PROVIDER_SECTION: &str = "Orleans:Provider";
/// Section holding the monitoring-dashboard settings.
pub const DASHBOARD_SECTION: &str = "Orleans:Dashboard";
/// Section holding the host's own settings.
pub const HOST_SECTION: &str = "Host";

/// Shutdown timeout used when `Host:ShutdownTimeoutSecs` is not configured.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 20;
/// Upper bound applied to `Host:ShutdownTimeoutSecs`.
pub const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Silo (cluster node) configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SiloConfigOptions {
    /// Cluster the silo joins.
    pub cluster_id: String,

    /// Service identity shared by every deployment of the application.
    pub service_id: String,

    /// Address advertised to other silos.
    pub advertised_ip: String,

    /// Listen on all interfaces instead of the advertised address only.
    pub listen_on_any_host_address: bool,

    /// Silo-to-silo port.
    pub silo_port: u16,

    /// Client gateway port.
    pub gateway_port: u16,
}

/// Connection settings for one storage concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ConnectionOptions {
    pub db_conn: String,
    pub db_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct MongoDbOptions {
    /// Membership table storage.
    pub cluster: ConnectionOptions,

    /// Grain state storage.
    pub storage: ConnectionOptions,

    /// Reminder table storage.
    pub reminder: ConnectionOptions,
}

/// Storage provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ProviderOptions {
    /// Provider name, e.g. "MongoDB".
    pub default_provider: String,

    pub mongo_db: MongoDbOptions,
}

/// Monitoring dashboard configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DashboardOptions {
    pub enable: bool,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub counter_update_interval_ms: u64,
}

/// External runtime program driven by the process-backed service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RuntimeOptions {
    /// Executable to launch. Empty means "not configured".
    pub program: String,

    pub args: Vec<String>,

    /// Working directory; empty inherits the host's.
    pub working_directory: String,

    /// Stdout marker signalling the runtime joined the cluster. Empty means
    /// the runtime is ready as soon as it is spawned.
    pub ready_marker: String,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ObservabilityOptions {
    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityOptions {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Host lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct HostOptions {
    /// Upper bound for the service's stop operation, in seconds.
    pub shutdown_timeout_secs: u64,

    /// Skip the "Application started" style status messages.
    pub suppress_status_messages: bool,

    /// Log keys and values the binder had to ignore.
    pub strict_binding: bool,

    pub runtime: RuntimeOptions,

    pub observability: ObservabilityOptions,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            suppress_status_messages: false,
            strict_binding: false,
            runtime: RuntimeOptions::default(),
            observability: ObservabilityOptions::default(),
        }
    }
}

impl HostOptions {
    /// Configured stop budget, clamped to [`MAX_SHUTDOWN_TIMEOUT_SECS`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs.min(MAX_SHUTDOWN_TIMEOUT_SECS))
    }
}

/// Every option object handed to the managed service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiloOptions {
    pub silo: SiloConfigOptions,
    pub provider: ProviderOptions,
    pub dashboard: DashboardOptions,
    pub host: HostOptions,
}

impl SiloOptions {
    /// Bind all sections from the application configuration.
    pub fn bind(config: &MergedConfiguration) -> Self {
        Self::bind_with_diagnostics(config).0
    }

    /// Bind all sections and collect per-section diagnostics.
    pub fn bind_with_diagnostics(
        config: &MergedConfiguration,
    ) -> (Self, Vec<(&'static str, BindDiagnostics)>) {
        let (silo, silo_diag) = bind_with_diagnostics(config, SILO_CONFIG_SECTION);
        let (provider, provider_diag) = bind_with_diagnostics(config, PROVIDER_SECTION);
        let (dashboard, dashboard_diag) = bind_with_diagnostics(config, DASHBOARD_SECTION);
        let (host, host_diag) = bind_with_diagnostics(config, HOST_SECTION);

        let diagnostics = vec![
            (SILO_CONFIG_SECTION, silo_diag),
            (PROVIDER_SECTION, provider_diag),
            (DASHBOARD_SECTION, dashboard_diag),
            (HOST_SECTION, host_diag),
        ];

        (
            Self {
                silo,
                provider,
                dashboard,
                host,
            },
            diagnostics,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::binder::bind;
    use std::sync::Arc;

    fn config(pairs: &[(&str, &str)]) -> MergedConfiguration {
        let mut config = MergedConfiguration::new();
        for (key, value) in pairs {
            config.insert(key, value.to_string());
        }
        config
    }

    #[test]
    fn test_defaults_for_empty_configuration() {
        let options = SiloOptions::bind(&MergedConfiguration::new());
        assert_eq!(options.silo, SiloConfigOptions::default());
        assert_eq!(options.silo.silo_port, 0);
        assert_eq!(options.host.shutdown_timeout(), Duration::from_secs(20));
        assert!(!options.host.observability.metrics_enabled);
    }

    #[test]
    fn test_shutdown_timeout_is_clamped() {
        let options = SiloOptions::bind(&config(&[(
            "Host:ShutdownTimeoutSecs",
            "18446744073709551615",
        )]));
        assert_eq!(options.host.shutdown_timeout_secs, u64::MAX);
        assert_eq!(
            options.host.shutdown_timeout(),
            Duration::from_secs(MAX_SHUTDOWN_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_binds_all_sections() {
        let config = config(&[
            ("Orleans:SiloConfig:ClusterId", "dev"),
            ("Orleans:SiloConfig:SiloPort", "11111"),
            ("Orleans:SiloConfig:GatewayPort", "30000"),
            ("Orleans:SiloConfig:ListenOnAnyHostAddress", "true"),
            ("Orleans:Provider:DefaultProvider", "MongoDB"),
            ("Orleans:Provider:MongoDB:Cluster:DbConn", "mongodb://localhost:27017"),
            ("Orleans:Provider:MongoDB:Cluster:DbName", "silo-cluster"),
            ("Orleans:Dashboard:Enable", "true"),
            ("Orleans:Dashboard:Port", "8080"),
            ("Host:ShutdownTimeoutSecs", "5"),
            ("Host:Runtime:Program", "/usr/bin/silo"),
            ("Host:Runtime:Args:0", "--join"),
        ]);

        let options = SiloOptions::bind(&config);
        assert_eq!(options.silo.cluster_id, "dev");
        assert_eq!(options.silo.silo_port, 11111);
        assert_eq!(options.silo.gateway_port, 30000);
        assert!(options.silo.listen_on_any_host_address);
        assert_eq!(options.provider.default_provider, "MongoDB");
        assert_eq!(options.provider.mongo_db.cluster.db_name, "silo-cluster");
        assert!(options.dashboard.enable);
        assert_eq!(options.dashboard.port, 8080);
        assert_eq!(options.host.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(options.host.runtime.program, "/usr/bin/silo");
        assert_eq!(options.host.runtime.args, vec!["--join"]);
    }

    #[test]
    fn test_sections_bind_concurrently() {
        let config = Arc::new(config(&[
            ("Orleans:SiloConfig:ClusterId", "dev"),
            ("Orleans:Provider:DefaultProvider", "MongoDB"),
            ("Orleans:Dashboard:Port", "8080"),
        ]));

        let (silo, provider, dashboard) = std::thread::scope(|scope| {
            let silo = scope.spawn(|| bind::<SiloConfigOptions>(&config, SILO_CONFIG_SECTION));
            let provider = scope.spawn(|| bind::<ProviderOptions>(&config, PROVIDER_SECTION));
            let dashboard = scope.spawn(|| bind::<DashboardOptions>(&config, DASHBOARD_SECTION));
            (
                silo.join().unwrap(),
                provider.join().unwrap(),
                dashboard.join().unwrap(),
            )
        });

        assert_eq!(silo.cluster_id, "dev");
        assert_eq!(provider.default_provider, "MongoDB");
        assert_eq!(dashboard.port, 8080);
    }

    #[test]
    fn test_diagnostics_are_reported_per_section() {
        let config = config(&[
            ("Orleans:SiloConfig:SiloPrt", "1"),
            ("Host:ShutdownTimeoutSecs", "soon"),
        ]);
        let (options, diagnostics) = SiloOptions::bind_with_diagnostics(&config);
        assert_eq!(options.host.shutdown_timeout_secs, DEFAULT_SHUTDOWN_TIMEOUT_SECS);

        let silo = &diagnostics[0];
        assert_eq!(silo.0, SILO_CONFIG_SECTION);
        assert_eq!(silo.1.unmatched_keys, vec!["Orleans:SiloConfig:SiloPrt"]);

        let host = &diagnostics[3];
        assert_eq!(host.1.rejected_values[0].key, "Host:ShutdownTimeoutSecs");
    }
}
