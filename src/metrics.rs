//! Metrics helpers for Portico.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is embedded;
//! the application installs any compatible recorder. Metric families:
//! * `portico_requests_total` (counter; method, status)
//! * `portico_request_duration_seconds` (histogram)
//! * `portico_auth_success_total` / `portico_auth_failure_total` (counter; method)
//! * `portico_body_limit_rejections_total` (counter)
use std::time::Instant;

use metrics::{Unit, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const PORTICO_REQUESTS_TOTAL: &str = "portico_requests_total";
pub const PORTICO_REQUEST_DURATION_SECONDS: &str = "portico_request_duration_seconds";
pub const PORTICO_AUTH_SUCCESS_TOTAL: &str = "portico_auth_success_total";
pub const PORTICO_AUTH_FAILURE_TOTAL: &str = "portico_auth_failure_total";
pub const PORTICO_BODY_LIMIT_REJECTIONS_TOTAL: &str = "portico_body_limit_rejections_total";

static DESCRIBE: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        PORTICO_REQUESTS_TOTAL,
        Unit::Count,
        "Total HTTP requests served by the gateway."
    );
    describe_histogram!(
        PORTICO_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests served by the gateway."
    );
    describe_counter!(
        PORTICO_AUTH_SUCCESS_TOTAL,
        Unit::Count,
        "Successful authentications, labelled by scheme."
    );
    describe_counter!(
        PORTICO_AUTH_FAILURE_TOTAL,
        Unit::Count,
        "Failed authentications, labelled by scheme."
    );
    describe_counter!(
        PORTICO_BODY_LIMIT_REJECTIONS_TOTAL,
        Unit::Count,
        "Requests rejected for exceeding the configured body size."
    );
});

/// Register metric descriptions (idempotent).
pub fn init_metrics() {
    Lazy::force(&DESCRIBE);
    tracing::debug!("metrics descriptions registered");
}

/// RAII timer for the request duration histogram.
pub struct RequestTimer {
    start: Instant,
    method: String,
}

impl RequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        histogram!(
            PORTICO_REQUEST_DURATION_SECONDS,
            "method" => self.method.clone()
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}
