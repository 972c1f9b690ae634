//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "dubpipe_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "dubpipe_job_duration_seconds";
    pub const JOBS_REJECTED_TOTAL: &str = "dubpipe_jobs_rejected_total";
    pub const LOOP_ERRORS_TOTAL: &str = "dubpipe_consumer_loop_errors_total";
}

/// Record a finished job.
pub fn record_job(stage: &'static str, outcome: &'static str, duration_secs: f64) {
    let labels = [("stage", stage), ("outcome", outcome)];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

/// Record a payload that failed to parse.
pub fn record_rejected(stage: &'static str) {
    counter!(names::JOBS_REJECTED_TOTAL, "stage" => stage).increment(1);
}

/// Record an error in the consumer loop itself.
pub fn record_loop_error(stage: &'static str, kind: &'static str) {
    counter!(names::LOOP_ERRORS_TOTAL, "stage" => stage, "kind" => kind).increment(1);
}
