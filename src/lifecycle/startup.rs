//! Startup configuration assembly.
//!
//! # Responsibilities
//! - Assemble the host configuration (hosting environment itself)
//! - Resolve the environment name, application name and content root
//! - Assemble the application configuration on top of that environment
//!
//! # Design Decisions
//! - Host and app assemblies share merge semantics, not sources
//! - Environment variables are snapshotted once per builder
//! - Command-line arguments are the last source of both assemblies

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::loader::{ConfigError, ConfigurationBuilder};
use crate::config::merged::MergedConfiguration;

pub const HOST_ENV_PREFIX: &str = "SILO_HOST_";
pub const APP_ENV_PREFIX: &str = "SILO_APP_";

pub const HOST_SETTINGS_FILE: &str = "hostsettings.json";
pub const APP_SETTINGS_FILE: &str = "appsettings.json";

/// Host configuration keys.
pub const ENVIRONMENT_KEY: &str = "environment";
pub const APPLICATION_KEY: &str = "applicationName";
pub const CONTENT_ROOT_KEY: &str = "contentRoot";

pub const DEFAULT_ENVIRONMENT: &str = "Production";
pub const DEFAULT_APPLICATION: &str = "silo-host";

/// Where and as what the host runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    pub name: String,
    pub application: String,
    pub content_root: PathBuf,
}

impl HostEnvironment {
    pub fn is_development(&self) -> bool {
        self.name.eq_ignore_ascii_case("Development")
    }
}

/// Result of the configuring phase.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub environment: HostEnvironment,
    pub host_config: Arc<MergedConfiguration>,
    pub app_config: Arc<MergedConfiguration>,
}

/// Builds the host and application configurations.
#[derive(Debug, Clone)]
pub struct HostBuilder {
    content_root: PathBuf,
    args: Vec<String>,
    env_vars: Vec<(String, String)>,
}

impl HostBuilder {
    /// Builder rooted at `content_root`, reading the process environment.
    pub fn new(content_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            args: Vec::new(),
            env_vars: std::env::vars().collect(),
        }
    }

    /// Command-line configuration overrides.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Replace the environment snapshot.
    pub fn with_env_vars(mut self, vars: Vec<(String, String)>) -> Self {
        self.env_vars = vars;
        self
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    pub fn build_host_configuration(&self) -> Result<MergedConfiguration, ConfigError> {
        ConfigurationBuilder::new()
            .add_file(self.content_root.join(HOST_SETTINGS_FILE), true)
            .add_environment(HOST_ENV_PREFIX, self.env_vars.clone())
            .add_command_line(self.args.clone())
            .build()
    }

    /// Resolve the hosting environment from the host configuration.
    pub fn resolve_environment(&self, host_config: &MergedConfiguration) -> HostEnvironment {
        let non_empty = |key| non_empty_value(host_config, key);

        let content_root = match non_empty(CONTENT_ROOT_KEY) {
            Some(root) => self.content_root.join(root),
            None => self.content_root.clone(),
        };

        HostEnvironment {
            name: non_empty(ENVIRONMENT_KEY)
                .unwrap_or(DEFAULT_ENVIRONMENT)
                .to_string(),
            application: non_empty(APPLICATION_KEY)
                .unwrap_or(DEFAULT_APPLICATION)
                .to_string(),
            content_root,
        }
    }

    pub fn build_app_configuration(
        &self,
        environment: &HostEnvironment,
    ) -> Result<MergedConfiguration, ConfigError> {
        let root = &environment.content_root;
        ConfigurationBuilder::new()
            .add_file(root.join(APP_SETTINGS_FILE), true)
            .add_file(root.join(format!("appsettings.{}.json", environment.name)), true)
            .add_environment(APP_ENV_PREFIX, self.env_vars.clone())
            .add_command_line(self.args.clone())
            .build()
    }

    /// Host configuration first, then application configuration.
    pub fn configure(&self) -> Result<HostContext, ConfigError> {
        let host_config = self.build_host_configuration()?;
        let environment = self.resolve_environment(&host_config);
        tracing::debug!(
            environment = %environment.name,
            content_root = %environment.content_root.display(),
            host_keys = host_config.len(),
            "Host configuration assembled"
        );

        let app_config = self.build_app_configuration(&environment)?;
        tracing::debug!(app_keys = app_config.len(), "Application configuration assembled");

        Ok(HostContext {
            environment,
            host_config: Arc::new(host_config),
            app_config: Arc::new(app_config),
        })
    }
}

fn non_empty_value<'a>(config: &'a MergedConfiguration, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
