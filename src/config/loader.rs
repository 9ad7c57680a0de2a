//! Configuration assembly.
//!
//! Folds an ordered list of sources into one [`MergedConfiguration`]. Later
//! sources win on key collisions.

use thiserror::Error;

use crate::config::merged::MergedConfiguration;
use crate::config::sources::{
    CommandLineSource, ConfigurationSource, EnvironmentSource, FileSource,
};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required source does not exist.
    #[error("required configuration source {origin} was not found")]
    Missing { origin: String },

    #[error("failed to read {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {origin} as JSON: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse {origin} as TOML: {source}")]
    Toml {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    /// Settings files must contain an object/table at the top level.
    #[error("{origin} does not contain an object at its root")]
    InvalidRoot { origin: String },

    #[error("malformed command-line argument `{argument}`")]
    MalformedArgument { argument: String },
}

/// Ordered list of configuration sources.
#[derive(Default)]
pub struct ConfigurationBuilder {
    sources: Vec<Box<dyn ConfigurationSource>>,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source; it takes precedence over every source added before it.
    pub fn add_source(mut self, source: impl ConfigurationSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn add_file(self, path: impl Into<std::path::PathBuf>, optional: bool) -> Self {
        self.add_source(FileSource::new(path, optional))
    }

    pub fn add_environment(self, prefix: &str, vars: Vec<(String, String)>) -> Self {
        self.add_source(EnvironmentSource::from_vars(prefix, vars))
    }

    pub fn add_command_line(self, args: Vec<String>) -> Self {
        self.add_source(CommandLineSource::new(args))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Load every source in order and merge the results.
    ///
    /// Optional sources that are missing or fail to load are skipped. Any
    /// failure of a required source aborts the whole assembly.
    pub fn build(&self) -> Result<MergedConfiguration, ConfigError> {
        let mut merged = MergedConfiguration::new();

        for (read_order, source) in self.sources.iter().enumerate() {
            let origin = source.origin();
            match source.load() {
                Ok(Some(settings)) => {
                    tracing::debug!(
                        origin = %origin,
                        read_order,
                        keys = settings.len(),
                        "Configuration source loaded"
                    );
                    for (key, value) in settings {
                        merged.insert(&key, value);
                    }
                }
                Ok(None) if source.is_optional() => {
                    tracing::debug!(origin = %origin, read_order, "Optional configuration source not found, skipping");
                }
                Ok(None) => return Err(ConfigError::Missing { origin }),
                Err(e) if source.is_optional() => {
                    tracing::debug!(origin = %origin, read_order, error = %e, "Optional configuration source failed to load, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(merged)
    }
}
