//! Metric names and recording helpers for store operations.

/// Metric names.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "store_requests_total";
    pub const REQUEST_LATENCY_MS: &str = "store_request_latency_ms";
    pub const RETRIES_TOTAL: &str = "store_retries_total";
    pub const STATUS_WRITES_TOTAL: &str = "store_status_writes_total";
}

/// Record a completed request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    metrics::counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        names::REQUEST_LATENCY_MS,
        "operation" => operation.to_string()
    )
    .record(latency_ms);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    metrics::counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Record a status mutation on an entity collection.
pub fn record_status_write(collection: &str, status: &str) {
    metrics::counter!(
        names::STATUS_WRITES_TOTAL,
        "collection" => collection.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
