//! Client-side request metrics.
//!
//! Metrics are emitted through the `metrics` facade.  The library never
//! installs a recorder; applications that want the numbers install one
//! (Prometheus, statsd, ...) before creating clients.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

// -- Metric name constants ----------------------------------------------------

/// Total HTTP attempts sent by clients (counter). Labels: method, status.
pub const CLIENT_REQUESTS_TOTAL: &str = "azsdk_client_requests_total";

/// Attempt duration in seconds (histogram). Labels: method.
pub const CLIENT_REQUEST_DURATION_SECONDS: &str = "azsdk_client_request_duration_seconds";

/// Retried attempts (counter). Labels: reason.
pub const CLIENT_RETRIES_TOTAL: &str = "azsdk_client_retries_total";

/// Long-running-operation status polls (counter). Labels: status.
pub const LRO_POLLS_TOTAL: &str = "azsdk_lro_polls_total";

/// Events delivered by the buffered producer (counter). Labels: partition.
pub const EVENTS_SENT_TOTAL: &str = "azsdk_events_sent_total";

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(CLIENT_REQUESTS_TOTAL, "Total HTTP attempts sent by clients");
    describe_histogram!(
        CLIENT_REQUEST_DURATION_SECONDS,
        "HTTP attempt duration in seconds"
    );
    describe_counter!(CLIENT_RETRIES_TOTAL, "Total retried HTTP attempts");
    describe_counter!(LRO_POLLS_TOTAL, "Total long-running operation polls");
    describe_counter!(EVENTS_SENT_TOTAL, "Total events delivered to Event Hubs");
}

/// Record one finished attempt. `status` is `None` when the transport failed.
pub fn record_request(method: &str, status: Option<u16>, elapsed: Duration) {
    let status = status.map_or_else(|| "error".to_string(), |s| s.to_string());
    counter!(CLIENT_REQUESTS_TOTAL, "method" => method.to_string(), "status" => status)
        .increment(1);
    histogram!(CLIENT_REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_retry(reason: &str) {
    counter!(CLIENT_RETRIES_TOTAL, "reason" => reason.to_string()).increment(1);
}

pub fn record_poll(status: &str) {
    counter!(LRO_POLLS_TOTAL, "status" => status.to_string()).increment(1);
}

pub fn record_events_sent(partition_id: &str, count: usize) {
    counter!(EVENTS_SENT_TOTAL, "partition" => partition_id.to_string()).increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            CLIENT_REQUESTS_TOTAL,
            CLIENT_REQUEST_DURATION_SECONDS,
            CLIENT_RETRIES_TOTAL,
            LRO_POLLS_TOTAL,
            EVENTS_SENT_TOTAL,
        ] {
            assert!(name.starts_with("azsdk_"), "{}", name);
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_request("GET", Some(200), Duration::from_millis(5));
        record_request("PUT", None, Duration::from_millis(5));
        record_retry("503");
        record_poll("running");
        record_events_sent("0", 3);
    }
}
