use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

use crate::error::{AppError, Result};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the payment pipeline.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_pipeline_event(&self, component: &str, state: &str, elapsed_ms: f64) {
        counter!("payment_guard_pipeline_events_total", "component" => component.to_string(), "state" => state.to_string()).increment(1);
        if elapsed_ms > 0.0 {
            histogram!("payment_guard_pipeline_elapsed_ms", "component" => component.to_string()).record(elapsed_ms);
        }
    }

    pub fn record_payment_outcome(&self, outcome: &str, already_in_flight: bool) {
        counter!("payment_guard_payments_total", "outcome" => outcome.to_string(), "already_in_flight" => already_in_flight.to_string()).increment(1);
    }

    pub fn record_submit_attempts(&self, attempts: u32) {
        histogram!("payment_guard_submit_attempts").record(attempts as f64);
    }

    pub fn record_duplicate_check(&self, result: &str, duration_ms: f64) {
        counter!("payment_guard_duplicate_checks_total", "result" => result.to_string()).increment(1);
        histogram!("payment_guard_duplicate_check_duration_ms").record(duration_ms);
    }

    pub fn record_persist(&self, created: bool, duration_ms: f64) {
        counter!("payment_guard_persist_total", "created" => created.to_string()).increment(1);
        histogram!("payment_guard_persist_duration_ms").record(duration_ms);
    }

    pub fn set_in_flight_entries(&self, count: usize) {
        gauge!("payment_guard_in_flight_entries").set(count as f64);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }

    pub fn record_db_query(&self, query_type: &str, duration_ms: f64, success: bool) {
        counter!("db_queries_total", "type" => query_type.to_string(), "success" => success.to_string()).increment(1);
        histogram!("db_query_duration_ms", "type" => query_type.to_string()).record(duration_ms);
    }

    pub fn record_redis_operation(&self, operation: &str, duration_ms: f64, success: bool) {
        counter!("redis_operations_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("redis_operation_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder once and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e)))?;
    describe_metrics();

    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();
    METRICS.get_or_init(Metrics::new);
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!("payment_guard_pipeline_events_total", Unit::Count, "Pipeline state transitions and registry/guard hits");
    describe_histogram!("payment_guard_pipeline_elapsed_ms", Unit::Milliseconds, "Elapsed time at each pipeline event");
    describe_counter!("payment_guard_payments_total", Unit::Count, "Payments by terminal outcome");
    describe_histogram!("payment_guard_submit_attempts", Unit::Count, "Submission attempts per payment");

    describe_counter!("payment_guard_duplicate_checks_total", Unit::Count, "Boundary duplicate checks by result");
    describe_histogram!("payment_guard_duplicate_check_duration_ms", Unit::Milliseconds, "Boundary duplicate check latency");

    describe_counter!("payment_guard_persist_total", Unit::Count, "Post-commit persist calls");
    describe_histogram!("payment_guard_persist_duration_ms", Unit::Milliseconds, "Post-commit persist latency");
    describe_gauge!("payment_guard_in_flight_entries", Unit::Count, "Entries held by the in-flight registry");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");

    describe_counter!("db_queries_total", Unit::Count, "Total database queries");
    describe_histogram!("db_query_duration_ms", Unit::Milliseconds, "Database query latency in milliseconds");

    describe_counter!("redis_operations_total", Unit::Count, "Total Redis operations");
    describe_histogram!("redis_operation_duration_ms", Unit::Milliseconds, "Redis operation latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
