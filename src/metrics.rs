//! Lightweight metrics helpers for Gatehouse.
//!
//! Convenience functions and an RAII timer wrapping the `metrics` crate
//! macros. No exporter is embedded; the application can install any
//! compatible recorder and these calls become live.
//!
//! Provided metrics:
//! * `gatehouse_requests_received_total` (counter)
//! * `gatehouse_responses_sent_total` (counter, label `status`)
//! * `gatehouse_request_processing_seconds` (histogram)
//! * `gatehouse_rate_limited_total` (counter)
//! * `gatehouse_authentication_failures_total` (counter)
//! * `gatehouse_server_errors_total` (counter)
//! * `gatehouse_panics_recovered_total` (counter)
//! * `gatehouse_background_tasks_active` (gauge)
use std::time::{Duration, Instant};

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const GATEHOUSE_REQUESTS_RECEIVED_TOTAL: &str = "gatehouse_requests_received_total";
pub const GATEHOUSE_RESPONSES_SENT_TOTAL: &str = "gatehouse_responses_sent_total"; // labels: status
pub const GATEHOUSE_REQUEST_PROCESSING_SECONDS: &str = "gatehouse_request_processing_seconds";
pub const GATEHOUSE_RATE_LIMITED_TOTAL: &str = "gatehouse_rate_limited_total";
pub const GATEHOUSE_AUTHENTICATION_FAILURES_TOTAL: &str =
    "gatehouse_authentication_failures_total";
pub const GATEHOUSE_SERVER_ERRORS_TOTAL: &str = "gatehouse_server_errors_total";
pub const GATEHOUSE_PANICS_RECOVERED_TOTAL: &str = "gatehouse_panics_recovered_total";
pub const GATEHOUSE_BACKGROUND_TASKS_ACTIVE: &str = "gatehouse_background_tasks_active";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        GATEHOUSE_REQUESTS_RECEIVED_TOTAL,
        Unit::Count,
        "Total number of HTTP requests received."
    );
    describe_counter!(
        GATEHOUSE_RESPONSES_SENT_TOTAL,
        Unit::Count,
        "Total number of HTTP responses sent, by status code."
    );
    describe_histogram!(
        GATEHOUSE_REQUEST_PROCESSING_SECONDS,
        Unit::Seconds,
        "Time spent processing HTTP requests."
    );
    describe_counter!(
        GATEHOUSE_RATE_LIMITED_TOTAL,
        Unit::Count,
        "Requests rejected by per-client admission control."
    );
    describe_counter!(
        GATEHOUSE_AUTHENTICATION_FAILURES_TOTAL,
        Unit::Count,
        "Requests rejected because of an invalid authentication token."
    );
    describe_counter!(
        GATEHOUSE_SERVER_ERRORS_TOTAL,
        Unit::Count,
        "Responses answered with a generic server error."
    );
    describe_counter!(
        GATEHOUSE_PANICS_RECOVERED_TOTAL,
        Unit::Count,
        "Panics contained while handling a request."
    );
    describe_gauge!(
        GATEHOUSE_BACKGROUND_TASKS_ACTIVE,
        "Number of background tasks that have not finished yet."
    );
});

pub fn increment_requests_received() {
    counter!(GATEHOUSE_REQUESTS_RECEIVED_TOTAL).increment(1);
}

pub fn increment_responses_sent(status: u16) {
    counter!(GATEHOUSE_RESPONSES_SENT_TOTAL, "status" => status.to_string()).increment(1);
}

pub fn record_processing_time(duration: Duration) {
    histogram!(GATEHOUSE_REQUEST_PROCESSING_SECONDS).record(duration.as_secs_f64());
}

pub fn increment_rate_limited() {
    counter!(GATEHOUSE_RATE_LIMITED_TOTAL).increment(1);
}

pub fn increment_authentication_failures() {
    counter!(GATEHOUSE_AUTHENTICATION_FAILURES_TOTAL).increment(1);
}

pub fn increment_server_errors() {
    counter!(GATEHOUSE_SERVER_ERRORS_TOTAL).increment(1);
}

pub fn increment_panics_recovered() {
    counter!(GATEHOUSE_PANICS_RECOVERED_TOTAL).increment(1);
}

pub fn background_task_started() {
    gauge!(GATEHOUSE_BACKGROUND_TASKS_ACTIVE).increment(1.0);
}

pub fn background_task_finished() {
    gauge!(GATEHOUSE_BACKGROUND_TASKS_ACTIVE).decrement(1.0);
}

/// RAII helper measuring request processing time.
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for RequestTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_processing_time(self.start.elapsed());
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing Gatehouse metrics");
    Lazy::force(&DESCRIPTIONS);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());
        // Second call is a no-op.
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_request_timer() {
        let timer = RequestTimer::new();
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.elapsed() >= Duration::from_millis(2));
        drop(timer);
    }
}
