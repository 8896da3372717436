use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use metrics::{Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::aggregator::Outcome;

pub const OPERATIONS_TOTAL_METRIC: &str = "noesis_operations_total";
pub const ACTIVE_OPERATIONS_METRIC: &str = "noesis_active_operations";
pub const OPERATION_DURATION_METRIC: &str = "noesis_operation_duration_ms";
pub const FORENSIC_WRITE_FAILURES_METRIC: &str = "noesis_forensic_write_failures_total";

const DEFAULT_METRICS_PORT: u16 = 9464;

#[derive(Debug, Clone, Copy)]
pub struct MetricsRuntime {
    pub listen_addr: SocketAddr,
}

impl MetricsRuntime {
    pub fn default_listen_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_METRICS_PORT)
    }
}

/// Installs the global recorder. Must run inside a Tokio runtime.
pub fn start_prometheus_exporter(listen_addr: SocketAddr) -> Result<MetricsRuntime, BuildError> {
    describe_counter!(
        OPERATIONS_TOTAL_METRIC,
        Unit::Count,
        "Terminal orchestrator operations, labelled by outcome."
    );
    describe_gauge!(
        ACTIVE_OPERATIONS_METRIC,
        Unit::Count,
        "Operations currently held by the operation tracker."
    );
    describe_histogram!(
        OPERATION_DURATION_METRIC,
        Unit::Milliseconds,
        "Wall time from submission to terminal status."
    );
    describe_counter!(
        FORENSIC_WRITE_FAILURES_METRIC,
        Unit::Count,
        "Forensic entries that could not be queued or persisted."
    );

    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()?;

    Ok(MetricsRuntime { listen_addr })
}

pub fn record_operation(outcome: Outcome, duration: Duration) {
    counter!(OPERATIONS_TOTAL_METRIC, "outcome" => outcome.as_str()).increment(1);
    histogram!(OPERATION_DURATION_METRIC).record(duration.as_secs_f64() * 1_000.0);
}

pub fn record_active_operations(count: usize) {
    gauge!(ACTIVE_OPERATIONS_METRIC).set(count as f64);
}

pub fn record_forensic_write_failure() {
    counter!(FORENSIC_WRITE_FAILURES_METRIC).increment(1);
}
