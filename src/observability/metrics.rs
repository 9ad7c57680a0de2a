//! Lifecycle metrics and their Prometheus exposition.
//!
//! # Metrics
//! - `silo_host_state_transitions_total` (counter): transitions by target state
//! - `silo_host_service_faults_total` (counter): service faults by kind
//! - `silo_host_forced_shutdowns_total` (counter): stops that overran the timeout
//! - `silo_host_shutdown_duration_seconds` (histogram): time spent stopping
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Installing the exporter is optional and never fatal

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use crate::lifecycle::HostState;

pub const STATE_TRANSITIONS: &str = "silo_host_state_transitions_total";
pub const SERVICE_FAULTS: &str = "silo_host_service_faults_total";
pub const FORCED_SHUTDOWNS: &str = "silo_host_forced_shutdowns_total";
pub const SHUTDOWN_DURATION: &str = "silo_host_shutdown_duration_seconds";

/// Buckets sized around the default 20s shutdown timeout.
const SHUTDOWN_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0];

/// Install the Prometheus exporter listening on `addr`.
///
/// Returns `false` (after logging) if the exporter could not be installed.
pub fn init_metrics(addr: SocketAddr) -> bool {
    let installed = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(SHUTDOWN_DURATION.to_string()), SHUTDOWN_BUCKETS)
        .and_then(|builder| builder.install());

    match installed {
        Ok(()) => {
            tracing::info!(address = %addr, "Metrics endpoint listening");
            true
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
            false
        }
    }
}

pub fn record_transition(state: HostState) {
    metrics::counter!(STATE_TRANSITIONS, "state" => state.as_str()).increment(1);
}

pub fn record_service_fault(kind: &'static str) {
    metrics::counter!(SERVICE_FAULTS, "kind" => kind).increment(1);
}

pub fn record_forced_shutdown() {
    metrics::counter!(FORCED_SHUTDOWNS).increment(1);
}

pub fn record_shutdown_duration(elapsed: Duration) {
    metrics::histogram!(SHUTDOWN_DURATION).record(elapsed.as_secs_f64());
}
