//! Silo host.
//!
//! Bootstraps a cluster node: assembles configuration, starts the silo runtime
//! as a supervised child process and shuts it down within the configured
//! timeout when a termination signal arrives.
//!
//! # Architecture Overview
//!
//! ```text
//!   hostsettings.json ─┐                    appsettings.json ───────────┐
//!   SILO_HOST_*  ──────┼─▶ host config ──▶ appsettings.{Env}.json ──────┼─▶ app config
//!   command line ──────┘   (environment)    SILO_APP_* / command line ──┘      │
//!                                                                              ▼
//!                                                                   binder ─▶ SiloOptions
//!                                                                              │
//!   SIGINT/SIGTERM ─▶ Shutdown ─┐                                              ▼
//!                               ├─▶ Host: Starting → Running → Stopping ─▶ ProcessService
//!   runtime fault ──────────────┘        (bounded by ShutdownTimeoutSecs)   (child process)
//!                                                                              │
//!                                       run_and_flush: fatal log, flush, exit code
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::Instrument;
use uuid::Uuid;

use silo_host::lifecycle::{run_and_flush, signals, Host, HostBuilder, HostExit, HostOutcome};
use silo_host::observability::{context, logging, LoggingOptions};
use silo_host::service::{ManagedService, ProcessService};
use silo_host::HostError;

#[derive(Parser, Debug)]
#[command(name = "silo-host", version, about = "Bootstrap and lifecycle host for a silo")]
struct Cli {
    /// Directory holding hostsettings.json and appsettings*.json
    #[arg(long, default_value = ".")]
    content_root: PathBuf,

    /// Default minimum log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Per-target log level, e.g. `silo_runtime::stdout=warn` (repeatable)
    #[arg(long = "log-override", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Emit console logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Also write logs to this file
    #[arg(long)]
    trace_file: Option<PathBuf>,

    /// Mirror debug-level logs of every target to stderr
    #[arg(long)]
    debug_output: bool,

    /// Configuration overrides: `Key=Value`, or any form after `--`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    overrides: Vec<String>,
}

impl Cli {
    fn logging_options(&self) -> Result<LoggingOptions, logging::LoggingError> {
        let mut options = LoggingOptions {
            level: self.log_level.clone(),
            json: self.log_json,
            trace_file: self.trace_file.clone(),
            debug_output: self.debug_output,
            ..LoggingOptions::default()
        };
        for directive in &self.log_overrides {
            options.push_override(directive)?;
        }
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logs = match cli.logging_options().and_then(|options| logging::init(&options)) {
        Ok(logs) => logs,
        Err(e) => {
            eprintln!("silo-host: {e}");
            return HostExit::ConfigurationFailed.into();
        }
    };

    let host_id = Uuid::new_v4();
    let span = context::host_span(host_id, env!("CARGO_PKG_NAME"));
    tracing::info!(parent: &span, "silo-host v{} starting", env!("CARGO_PKG_VERSION"));

    run_and_flush(run(cli).instrument(span), &logs).await.into()
}

async fn run(cli: Cli) -> Result<HostOutcome, HostError> {
    let builder = HostBuilder::new(cli.content_root).with_args(cli.overrides);
    let host = Host::new(builder, |options| {
        Box::new(ProcessService::new(options.clone())) as Box<dyn ManagedService>
    });

    let signals = signals::listen(host.shutdown_handle()).map_err(HostError::Signals)?;
    let outcome = host.run().await;
    signals.abort();
    outcome
}
