//! Dispatch metrics.
//!
//! Counters and histograms complementing the structured logs. Without an
//! installed recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Files processed, by action and outcome.
pub const FILES_TOTAL: &str = "dispatch_files_total";

/// Tickets delivered, by action.
pub const TICKETS_DELIVERED: &str = "dispatch_tickets_delivered_total";

/// Messages acknowledged by the broker, by topic.
pub const BROKER_MESSAGES: &str = "dispatch_broker_messages_total";

/// Time spent on one file, by action.
pub const FILE_DURATION: &str = "dispatch_file_duration_seconds";

/// Registers all dispatch metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(FILES_TOTAL, "Total ticket files processed");
    describe_counter!(TICKETS_DELIVERED, "Total tickets delivered");
    describe_counter!(BROKER_MESSAGES, "Total messages acknowledged by the broker");
    describe_histogram!(FILE_DURATION, "Time spent processing one file in seconds");
}

/// Records the outcome of one file.
pub fn record_file(action: &str, outcome: &str, duration_secs: f64) {
    counter!(FILES_TOTAL, "action" => action.to_string(), "outcome" => outcome.to_string())
        .increment(1);
    histogram!(FILE_DURATION, "action" => action.to_string()).record(duration_secs);
}

/// Records delivered tickets.
pub fn record_tickets(action: &str, tickets: u64) {
    counter!(TICKETS_DELIVERED, "action" => action.to_string()).increment(tickets);
}

/// Records one acknowledged broker message.
pub fn record_broker_message(topic: &str) {
    counter!(BROKER_MESSAGES, "topic" => topic.to_string()).increment(1);
}
