//! Configuration sources.
//!
//! Each source yields flat `(key path, value)` pairs. A source that is not
//! present returns `Ok(None)`; the builder decides whether that is an error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::loader::ConfigError;
use crate::config::merged::{join_path, KEY_DELIMITER};

/// Flat key/value pairs contributed by one source.
pub type Settings = Vec<(String, String)>;

/// An ordered, named provider of settings.
pub trait ConfigurationSource: Send + Sync {
    /// Identifier used in logs and errors.
    fn origin(&self) -> String;

    /// Whether a missing or unreadable source is skipped instead of failing.
    fn is_optional(&self) -> bool {
        false
    }

    /// Read the source. `Ok(None)` means the source does not exist.
    fn load(&self) -> Result<Option<Settings>, ConfigError>;
}

/// Settings file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    /// Infer the format from the file extension; anything but `.toml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        }
    }
}

/// A JSON or TOML settings file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    optional: bool,
    format: FileFormat,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, optional: bool) -> Self {
        let path = path.into();
        let format = FileFormat::from_path(&path);
        Self {
            path,
            optional,
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigurationSource for FileSource {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn load(&self) -> Result<Option<Settings>, ConfigError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    origin: self.origin(),
                    source,
                })
            }
        };

        let mut settings = Settings::new();
        match self.format {
            FileFormat::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                        origin: self.origin(),
                        source,
                    })?;
                if !value.is_object() {
                    return Err(ConfigError::InvalidRoot {
                        origin: self.origin(),
                    });
                }
                flatten_json("", &value, &mut settings);
            }
            FileFormat::Toml => {
                let table: toml::Table =
                    toml::from_str(&content).map_err(|source| ConfigError::Toml {
                        origin: self.origin(),
                        source,
                    })?;
                for (key, value) in &table {
                    flatten_toml(key, value, &mut settings);
                }
            }
        }
        Ok(Some(settings))
    }
}

fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut Settings) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_json(&join_path(prefix, key), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_json(&join_path(prefix, &index.to_string()), child, out);
            }
        }
        Value::Null => out.push((prefix.to_string(), String::new())),
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Bool(b) => out.push((prefix.to_string(), b.to_string())),
        Value::Number(n) => out.push((prefix.to_string(), n.to_string())),
    }
}

fn flatten_toml(prefix: &str, value: &toml::Value, out: &mut Settings) {
    use toml::Value;

    match value {
        Value::Table(table) => {
            for (key, child) in table {
                flatten_toml(&join_path(prefix, key), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_toml(&join_path(prefix, &index.to_string()), child, out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Integer(i) => out.push((prefix.to_string(), i.to_string())),
        Value::Float(f) => out.push((prefix.to_string(), f.to_string())),
        Value::Boolean(b) => out.push((prefix.to_string(), b.to_string())),
        Value::Datetime(dt) => out.push((prefix.to_string(), dt.to_string())),
    }
}

/// Environment variables carrying a prefix.
///
/// `SILO_APP_Orleans__SiloConfig__SiloPort=11111` with prefix `SILO_APP_`
/// becomes `Orleans:SiloConfig:SiloPort`.
#[derive(Debug, Clone)]
pub struct EnvironmentSource {
    prefix: String,
    vars: Option<Vec<(String, String)>>,
}

impl EnvironmentSource {
    /// Read from the process environment at load time.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read from a fixed snapshot instead of the process environment.
    pub fn from_vars(prefix: impl Into<String>, vars: Vec<(String, String)>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: Some(vars),
        }
    }

    fn strip_prefix<'k>(&self, name: &'k str) -> Option<&'k str> {
        let head = name.get(..self.prefix.len())?;
        if !head.eq_ignore_ascii_case(&self.prefix) {
            return None;
        }
        name.get(self.prefix.len()..).filter(|rest| !rest.is_empty())
    }
}

impl ConfigurationSource for EnvironmentSource {
    fn origin(&self) -> String {
        format!("environment variables ({}*)", self.prefix)
    }

    fn load(&self) -> Result<Option<Settings>, ConfigError> {
        let vars = match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        };
        let settings = vars
            .iter()
            .filter_map(|(name, value)| {
                self.strip_prefix(name)
                    .map(|key| (key.replace("__", KEY_DELIMITER), value.clone()))
            })
            .collect();
        Ok(Some(settings))
    }
}

/// Command-line overrides.
///
/// Accepted forms: `--key=value`, `/key=value`, `--key value`, `/key value`
/// and `key=value`. Single-dash switches and bare words are ignored, a
/// single-dash argument carrying `=` is malformed.
#[derive(Debug, Clone, Default)]
pub struct CommandLineSource {
    args: Vec<String>,
}

impl CommandLineSource {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }
}

impl ConfigurationSource for CommandLineSource {
    fn origin(&self) -> String {
        "command line".to_string()
    }

    fn load(&self) -> Result<Option<Settings>, ConfigError> {
        let mut settings = Settings::new();
        let mut args = self.args.iter();

        while let Some(arg) = args.next() {
            let (body, prefixed) = if let Some(rest) = arg.strip_prefix("--") {
                (rest, true)
            } else if let Some(rest) = arg.strip_prefix('/') {
                (rest, true)
            } else if arg.starts_with('-') {
                if arg.contains('=') {
                    return Err(ConfigError::MalformedArgument {
                        argument: arg.clone(),
                    });
                }
                continue;
            } else {
                (arg.as_str(), false)
            };
            if body.is_empty() {
                continue;
            }

            match body.split_once('=') {
                Some((key, value)) => settings.push((key.to_string(), value.to_string())),
                None if prefixed => {
                    // `--key value`; a dangling `--key` is dropped.
                    if let Some(value) = args.next() {
                        settings.push((body.to_string(), value.clone()));
                    }
                }
                None => continue,
            }
        }

        settings.retain(|(key, _)| !key.is_empty());
        Ok(Some(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_command_line_forms() {
        let source = CommandLineSource::new(args(&[
            "--Orleans:SiloConfig:SiloPort=11112",
            "/Orleans:SiloConfig:GatewayPort=30001",
            "--environment",
            "Staging",
            "/Host:ShutdownTimeoutSecs",
            "5",
            "Orleans:Dashboard:Enable=true",
            "stray-word",
            "-v",
        ]));
        let settings = source.load().unwrap().unwrap();
        assert_eq!(
            settings,
            vec![
                ("Orleans:SiloConfig:SiloPort".to_string(), "11112".to_string()),
                ("Orleans:SiloConfig:GatewayPort".to_string(), "30001".to_string()),
                ("environment".to_string(), "Staging".to_string()),
                ("Host:ShutdownTimeoutSecs".to_string(), "5".to_string()),
                ("Orleans:Dashboard:Enable".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_command_line_value_may_contain_equals() {
        let source = CommandLineSource::new(args(&["--Provider:DbConn=mongodb://h/?a=b"]));
        let settings = source.load().unwrap().unwrap();
        assert_eq!(settings[0].1, "mongodb://h/?a=b");
    }

    #[test]
    fn test_command_line_single_dash_with_equals_is_malformed() {
        let source = CommandLineSource::new(args(&["-x=1"]));
        assert!(matches!(
            source.load(),
            Err(ConfigError::MalformedArgument { .. })
        ));
    }

    #[test]
    fn test_command_line_dangling_switch_is_dropped() {
        let source = CommandLineSource::new(args(&["--environment"]));
        assert!(source.load().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_environment_prefix_and_separator() {
        let source = EnvironmentSource::from_vars(
            "SILO_APP_",
            vec![
                ("SILO_APP_Orleans__SiloConfig__SiloPort".into(), "11111".into()),
                ("silo_app_Host__ShutdownTimeoutSecs".into(), "9".into()),
                ("SILO_HOST_environment".into(), "Staging".into()),
                ("SILO_APP_".into(), "ignored".into()),
                ("PATH".into(), "/usr/bin".into()),
            ],
        );
        let settings = source.load().unwrap().unwrap();
        assert_eq!(
            settings,
            vec![
                ("Orleans:SiloConfig:SiloPort".to_string(), "11111".to_string()),
                ("Host:ShutdownTimeoutSecs".to_string(), "9".to_string()),
            ]
        );
    }

    #[test]
    fn test_json_file_flattening() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"Orleans": {{"SiloConfig": {{"SiloPort": 11111, "ListenOnAnyHostAddress": true}},
                "Endpoints": ["a", "b"], "Note": null}}}}"#
        )
        .unwrap();

        let source = FileSource::new(file.path(), false);
        let mut settings = source.load().unwrap().unwrap();
        settings.sort();
        assert_eq!(
            settings,
            vec![
                ("Orleans:Endpoints:0".to_string(), "a".to_string()),
                ("Orleans:Endpoints:1".to_string(), "b".to_string()),
                ("Orleans:Note".to_string(), String::new()),
                ("Orleans:SiloConfig:ListenOnAnyHostAddress".to_string(), "true".to_string()),
                ("Orleans:SiloConfig:SiloPort".to_string(), "11111".to_string()),
            ]
        );
    }

    #[test]
    fn test_toml_file_flattening() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[Orleans.Dashboard]\nEnable = true\nPort = 8080").unwrap();

        let source = FileSource::new(file.path(), false);
        let mut settings = source.load().unwrap().unwrap();
        settings.sort();
        assert_eq!(
            settings,
            vec![
                ("Orleans:Dashboard:Enable".to_string(), "true".to_string()),
                ("Orleans:Dashboard:Port".to_string(), "8080".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_file_is_absent_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("appsettings.json"), true);
        assert!(source.load().unwrap().is_none());
    }

    #[test]
    fn test_json_root_must_be_object() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "[1, 2]").unwrap();
        let source = FileSource::new(file.path(), false);
        assert!(matches!(source.load(), Err(ConfigError::InvalidRoot { .. })));
    }
}
