//! Pipeline metrics.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub mod names {
    /// Finished runs by outcome.
    pub const JOBS_TOTAL: &str = "reel_worker_jobs_total";

    /// Wall time of a whole run.
    pub const JOB_DURATION_SECONDS: &str = "reel_worker_job_duration_seconds";

    /// Wall time of each stage.
    pub const STAGE_DURATION_SECONDS: &str = "reel_worker_stage_duration_seconds";

    /// Segments skipped after exhausting their retries.
    pub const SEGMENT_FAILURES_TOTAL: &str = "reel_worker_segment_failures_total";
}

/// Serve `/metrics` on `addr` for Prometheus to scrape.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_job(outcome: &str, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome.to_string()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(duration_secs);
}

pub fn record_stage(stage: &str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage.to_string()).record(duration_secs);
}

pub fn record_segment_failure(stage: &str) {
    counter!(names::SEGMENT_FAILURES_TOTAL, "stage" => stage.to_string()).increment(1);
}
