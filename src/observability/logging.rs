//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide `tracing` subscriber, exactly once
//! - Fan events out to the configured sinks (console, trace file, debug channel)
//! - Flush every sink on every exit path
//!
//! # Design Decisions
//! - Each sink carries its own filter; the debug channel sees everything
//! - JSON console output for production, plain text for development
//! - `RUST_LOG`, when set, replaces the configured directives
//! - The handle returned by [`init`] is threaded to the top-level handler,
//!   which flushes it once; `Drop` flushes as a backstop

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// A type-erased sink layer.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Error type for logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("a global logger is already installed")]
    AlreadyInitialized,

    #[error("invalid log directive `{directive}`: {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("failed to open trace file {path}")]
    TraceFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Default minimum level for every target.
    pub level: String,

    /// Per-target minimum levels, applied on top of `level`.
    pub overrides: Vec<(String, String)>,

    /// Emit console lines as JSON.
    pub json: bool,

    /// Also append plain-text lines to this file.
    pub trace_file: Option<PathBuf>,

    /// Mirror every event at `debug` and above to stderr.
    pub debug_output: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            overrides: vec![
                ("tokio".to_string(), "warn".to_string()),
                ("mio".to_string(), "warn".to_string()),
            ],
            json: false,
            trace_file: None,
            debug_output: false,
        }
    }
}

impl LoggingOptions {
    /// Add or replace a per-target override given as `target=level`.
    pub fn push_override(&mut self, directive: &str) -> Result<(), LoggingError> {
        let invalid = |reason: String| LoggingError::InvalidDirective {
            directive: directive.to_string(),
            reason,
        };
        let (target, level) = directive
            .split_once('=')
            .ok_or_else(|| invalid("expected `target=level`".to_string()))?;
        level
            .parse::<LevelFilter>()
            .map_err(|e| invalid(e.to_string()))?;

        self.overrides.retain(|(existing, _)| existing != target);
        self.overrides.push((target.to_string(), level.to_string()));
        Ok(())
    }

    /// Filter directives, e.g. `info,tokio=warn,mio=warn`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (target, level) in &self.overrides {
            directives.push_str(&format!(",{target}={level}"));
        }
        directives
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        let directives = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(from_env) if !from_env.trim().is_empty() => from_env,
            _ => self.directives(),
        };
        EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidDirective {
            reason: e.to_string(),
            directive: directives,
        })
    }
}

/// Something that can flush the process logger.
pub trait FlushLogs {
    fn flush(&self);
}

/// Handle to the installed sinks.
#[derive(Debug)]
pub struct LogGuard {
    trace_file: Option<SharedFile>,
    flushed: AtomicBool,
}

impl LogGuard {
    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }
}

impl FlushLogs for LogGuard {
    fn flush(&self) {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        if let Some(file) = &self.trace_file {
            if let Err(e) = file.flush_to_disk() {
                eprintln!("failed to flush trace file: {e}");
            }
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Buffered trace file shared by every writer the fmt layer makes.
#[derive(Debug, Clone)]
struct SharedFile(Arc<Mutex<BufWriter<File>>>);

impl SharedFile {
    fn open(path: &Path) -> Result<Self, LoggingError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LoggingError::TraceFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self(Arc::new(Mutex::new(BufWriter::new(file)))))
    }

    fn flush_to_disk(&self) -> io::Result<()> {
        let mut writer = self
            .0
            .lock()
            .map_err(|_| io::Error::other("trace file lock poisoned"))?;
        writer.flush()?;
        writer.get_ref().sync_data()
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("trace file lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("trace file lock poisoned"))?
            .flush()
    }
}

/// Build the sink layers without installing them.
pub fn build_layers(options: &LoggingOptions) -> Result<(Vec<BoxedLayer>, LogGuard), LoggingError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console = if options.json {
        fmt::layer()
            .json()
            .with_writer(io::stdout)
            .with_filter(options.env_filter()?)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(io::stdout)
            .with_filter(options.env_filter()?)
            .boxed()
    };
    layers.push(console);

    let trace_file = match &options.trace_file {
        Some(path) => {
            let file = SharedFile::open(path)?;
            let writer = file.clone();
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || writer.clone())
                    .with_filter(options.env_filter()?)
                    .boxed(),
            );
            Some(file)
        }
        None => None,
    };

    if options.debug_output {
        layers.push(
            fmt::layer()
                .with_writer(io::stderr)
                .with_filter(LevelFilter::DEBUG)
                .boxed(),
        );
    }

    let guard = LogGuard {
        trace_file,
        flushed: AtomicBool::new(false),
    };
    Ok((layers, guard))
}

/// Install the process-wide subscriber.
///
/// Fails with [`LoggingError::AlreadyInitialized`] on a second call.
pub fn init(options: &LoggingOptions) -> Result<LogGuard, LoggingError> {
    let (layers, guard) = build_layers(options)?;
    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;
    Ok(guard)
}

/// Log a fatal error with its full source chain.
pub fn log_fatal(error: &(dyn std::error::Error + 'static)) {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    tracing::error!(fatal = true, error = %chain, "Host terminated unexpectedly");
}
