//! Metrics collection and export for Posecast.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format. Without an installed recorder every
//! call here is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use posecast_core::{TickOutcome, TickTiming};
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "posecast_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "posecast_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "posecast_connections_rejected_total";
    pub const TICKS_TOTAL: &str = "posecast_ticks_total";
    pub const TICK_DURATION_SECONDS: &str = "posecast_tick_duration_seconds";
    pub const TICK_OVERRUNS_TOTAL: &str = "posecast_tick_overruns_total";
    pub const MESSAGES_TOTAL: &str = "posecast_messages_total";
    pub const MESSAGES_BYTES: &str = "posecast_messages_bytes";
    pub const SESSIONS_DROPPED_TOTAL: &str = "posecast_sessions_dropped_total";
    pub const RELAYED_TOTAL: &str = "posecast_relayed_total";
    pub const MALFORMED_TOTAL: &str = "posecast_malformed_messages_total";
    pub const ERRORS_TOTAL: &str = "posecast_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused at the connection limit"
    );
    metrics::describe_counter!(names::TICKS_TOTAL, "Total number of stream ticks");
    metrics::describe_histogram!(
        names::TICK_DURATION_SECONDS,
        "Time spent sampling, encoding and broadcasting one tick"
    );
    metrics::describe_counter!(
        names::TICK_OVERRUNS_TOTAL,
        "Ticks whose work took longer than the interval"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of messages processed");
    metrics::describe_counter!(
        names::SESSIONS_DROPPED_TOTAL,
        "Sessions removed after a failed send"
    );
    metrics::describe_counter!(names::RELAYED_TOTAL, "Client messages relayed");
    metrics::describe_counter!(
        names::MALFORMED_TOTAL,
        "Client messages dropped as malformed"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a connection refused at the limit.
pub fn record_rejected() {
    counter!(names::CONNECTIONS_REJECTED).increment(1);
}

/// Record a message.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record sessions dropped after failed sends.
pub fn record_sessions_dropped(count: usize) {
    if count > 0 {
        counter!(names::SESSIONS_DROPPED_TOTAL).increment(count as u64);
    }
}

/// Record one completed stream tick with the ticker's timing for it.
pub fn record_tick(outcome: &TickOutcome, timing: TickTiming) {
    counter!(names::TICKS_TOTAL).increment(1);
    histogram!(names::TICK_DURATION_SECONDS).record(timing.elapsed.as_secs_f64());
    if timing.overrun {
        counter!(names::TICK_OVERRUNS_TOTAL).increment(1);
    }
    record_sessions_dropped(outcome.report.dropped());
}

/// Record a relayed client message.
pub fn record_relayed(delivered: usize, dropped: usize) {
    counter!(names::RELAYED_TOTAL).increment(1);
    counter!(names::MESSAGES_TOTAL, "direction" => "relayed").increment(delivered as u64);
    record_sessions_dropped(dropped);
}

/// Record a malformed client message.
pub fn record_malformed() {
    counter!(names::MALFORMED_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
