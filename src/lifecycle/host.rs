//! Host lifecycle controller.
//!
//! Drives one process run:
//! configure → bind options → start service → wait for a trigger → bounded
//! stop. Every fatal condition is returned as a [`HostError`]; runtime faults
//! and forced shutdowns are reported in the [`HostOutcome`].

use std::net::SocketAddr;

use tokio::sync::watch;

use super::shutdown::{stop_service, Shutdown, ShutdownOutcome, ShutdownReason};
use super::startup::{HostBuilder, HostEnvironment};
use super::state::{HostState, Lifecycle};
use crate::config::schema::SiloOptions;
use crate::config::validation::validate_options;
use crate::error::HostError;
use crate::observability::{context, metrics};
use crate::service::{FaultReporter, ManagedService, ServiceError};

/// Constructs the managed service from the bound options.
pub type ServiceFactory = Box<dyn FnOnce(&SiloOptions) -> Box<dyn ManagedService> + Send>;

/// How a run that reached Running ended.
#[derive(Debug)]
pub struct HostOutcome {
    pub final_state: HostState,
    pub history: Vec<HostState>,
    pub environment: HostEnvironment,
    pub trigger: ShutdownReason,
    pub shutdown: ShutdownOutcome,
    /// The fault that triggered the shutdown, if the service failed while running.
    pub runtime_fault: Option<ServiceError>,
}

pub struct Host {
    builder: HostBuilder,
    factory: ServiceFactory,
    shutdown: Shutdown,
    lifecycle: Lifecycle,
}

impl Host {
    pub fn new<F>(builder: HostBuilder, factory: F) -> Self
    where
        F: FnOnce(&SiloOptions) -> Box<dyn ManagedService> + Send + 'static,
    {
        Self {
            builder,
            factory: Box::new(factory),
            shutdown: Shutdown::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Handle used to request shutdown (signal listener, tests).
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> watch::Receiver<HostState> {
        self.lifecycle.subscribe()
    }

    /// Run the host until the service has stopped.
    pub async fn run(mut self) -> Result<HostOutcome, HostError> {
        // Subscribe first so a trigger during configuring or starting is kept.
        let mut listener = self.shutdown.subscribe();

        self.lifecycle.transition(HostState::Configuring)?;
        let context = match self.builder.configure() {
            Ok(context) => context,
            Err(e) => {
                self.lifecycle.fault()?;
                return Err(HostError::Configuration(e));
            }
        };
        context::record_environment(&tracing::Span::current(), &context.environment.name);

        self.lifecycle.transition(HostState::Starting)?;
        let options = bind_options(&context.app_config);
        let timeout = options.host.shutdown_timeout();
        let suppress_status = options.host.suppress_status_messages;
        if options.host.observability.metrics_enabled {
            match options.host.observability.metrics_address.parse::<SocketAddr>() {
                Ok(addr) => {
                    metrics::init_metrics(addr);
                }
                Err(_) => tracing::error!(
                    metrics_address = %options.host.observability.metrics_address,
                    "Failed to parse metrics address"
                ),
            }
        }

        let mut service = (self.factory)(&options);
        let name = service.name().to_string();
        tracing::info!(
            service = %name,
            cluster_id = %options.silo.cluster_id,
            shutdown_timeout_secs = timeout.as_secs(),
            "Starting managed service"
        );

        let (reporter, mut faults) = FaultReporter::channel();
        if let Err(source) = service.start(reporter).await {
            metrics::record_service_fault("start");
            self.lifecycle.fault()?;
            return Err(HostError::ServiceStart {
                service: name,
                source,
            });
        }
        self.lifecycle.transition(HostState::Running)?;

        if !suppress_status {
            tracing::info!("Application started. Press Ctrl+C to shut down.");
            tracing::info!("Hosting environment: {}", context.environment.name);
            tracing::info!(
                "Content root path: {}",
                context.environment.content_root.display()
            );
        }

        let mut runtime_fault = None;
        let trigger = tokio::select! {
            reason = listener.recv() => reason,
            Some(fault) = faults.recv() => {
                tracing::error!(service = %name, error = %fault, "Managed service faulted while running");
                metrics::record_service_fault("runtime");
                runtime_fault = Some(fault);
                self.shutdown.trigger(ShutdownReason::ServiceFault);
                self.shutdown.reason().unwrap_or(ShutdownReason::ServiceFault)
            }
        };

        if !suppress_status {
            tracing::info!("Application is shutting down...");
        }
        tracing::info!(trigger = %trigger, "Stopping managed service");
        self.lifecycle.transition(HostState::Stopping)?;
        let shutdown = stop_service(service.as_mut(), timeout).await;
        self.lifecycle.transition(HostState::Stopped)?;
        tracing::info!(outcome = ?shutdown, "Managed service stopped");

        Ok(HostOutcome {
            final_state: self.lifecycle.current(),
            history: self.lifecycle.history().to_vec(),
            environment: context.environment,
            trigger,
            shutdown,
            runtime_fault,
        })
    }
}

/// Bind every option section, reporting diagnostics when strict binding is on.
fn bind_options(config: &crate::config::MergedConfiguration) -> SiloOptions {
    let (options, diagnostics) = SiloOptions::bind_with_diagnostics(config);

    if options.host.strict_binding {
        for (section, diagnostics) in &diagnostics {
            for key in &diagnostics.unmatched_keys {
                tracing::warn!(section, key = %key, "Configuration key matches no option field");
            }
            for rejected in &diagnostics.rejected_values {
                tracing::warn!(
                    section,
                    key = %rejected.key,
                    reason = %rejected.reason,
                    "Configuration value ignored"
                );
            }
        }
    }

    for warning in validate_options(&options) {
        tracing::warn!(key = warning.key, "{}", warning.message);
    }

    options
}
