//! Metric names and descriptions.
//!
//! Components record through the `metrics` macros using these constants;
//! the daemon installs the Prometheus recorder and calls [`describe_all`].
//!
//! Naming: `logrelay_` prefix, `_total` for counters, `_seconds` for
//! latency histograms, no suffix for gauges.

// ─── label keys ────────────────────────────────────────────────────

/// Source name label key
pub const LABEL_SOURCE: &str = "source";

/// Event kind label key (join, leave, chat, unmatched)
pub const LABEL_KIND: &str = "kind";

/// Delivery result label key (delivered, rate_limited, failed)
pub const LABEL_RESULT: &str = "result";

/// Reopen reason label key (rotated, truncated, error)
pub const LABEL_REASON: &str = "reason";

// ─── tail follower ─────────────────────────────────────────────────

/// Lines read from log files (counter)
pub const TAIL_LINES_READ_TOTAL: &str = "logrelay_tail_lines_read_total";

/// File reopens (counter, label: reason)
pub const TAIL_REOPENS_TOTAL: &str = "logrelay_tail_reopens_total";

/// I/O errors that put a tailer into backoff (counter)
pub const TAIL_ERRORS_TOTAL: &str = "logrelay_tail_errors_total";

// ─── classifier ────────────────────────────────────────────────────

/// Classified lines (counter, label: kind)
pub const EVENTS_CLASSIFIED_TOTAL: &str = "logrelay_events_classified_total";

/// Events dropped by the ignore list (counter)
pub const EVENTS_IGNORED_TOTAL: &str = "logrelay_events_ignored_total";

// ─── sink ──────────────────────────────────────────────────────────

/// Delivery attempts by outcome (counter, label: result)
pub const DELIVERIES_TOTAL: &str = "logrelay_deliveries_total";

/// HTTP 429 responses (counter)
pub const RATE_LIMIT_HITS_TOTAL: &str = "logrelay_rate_limit_hits_total";

/// Time from first POST to outcome (histogram, seconds)
pub const DELIVERY_DURATION_SECONDS: &str = "logrelay_delivery_duration_seconds";

// ─── daemon ────────────────────────────────────────────────────────

/// Running source pipelines (gauge)
pub const ACTIVE_SOURCES: &str = "logrelay_active_sources";

/// Daemon uptime (gauge, seconds)
pub const DAEMON_UPTIME_SECONDS: &str = "logrelay_daemon_uptime_seconds";

/// Delivery latency buckets (seconds). Covers the rate-limit wait range.
pub const DELIVERY_DURATION_BUCKETS: [f64; 10] =
    [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Registers HELP text for every metric.
///
/// Call once after the recorder is installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(TAIL_LINES_READ_TOTAL, "Complete lines read from log files");
    describe_counter!(
        TAIL_REOPENS_TOTAL,
        "Log file reopens after rotation, truncation or error"
    );
    describe_counter!(TAIL_ERRORS_TOTAL, "I/O errors while following log files");

    describe_counter!(EVENTS_CLASSIFIED_TOTAL, "Lines classified, by event kind");
    describe_counter!(
        EVENTS_IGNORED_TOTAL,
        "Events dropped because the player name is on the ignore list"
    );

    describe_counter!(DELIVERIES_TOTAL, "Webhook deliveries, by outcome");
    describe_counter!(RATE_LIMIT_HITS_TOTAL, "HTTP 429 responses from webhooks");
    describe_histogram!(
        DELIVERY_DURATION_SECONDS,
        "Time to deliver one event including rate-limit waits"
    );

    describe_gauge!(ACTIVE_SOURCES, "Number of running source pipelines");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "logrelay daemon uptime in seconds");
}
