//! Provider call metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Provider calls by provider and outcome.
    pub const REQUESTS_TOTAL: &str = "reel_provider_requests_total";

    /// Provider call latency in seconds.
    pub const LATENCY_SECONDS: &str = "reel_provider_latency_seconds";

    /// Retried provider calls.
    pub const RETRIES_TOTAL: &str = "reel_provider_retries_total";
}

pub fn record_request(provider: &str, success: bool, latency_secs: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "provider" => provider.to_string(),
        "outcome" => if success { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "provider" => provider.to_string()).record(latency_secs);
}

pub fn record_retry(provider: &str) {
    counter!(names::RETRIES_TOTAL, "provider" => provider.to_string()).increment(1);
}
