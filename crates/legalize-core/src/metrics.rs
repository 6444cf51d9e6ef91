//! Metrics instrumentation for the channel manager.
//!
//! Uses the `metrics` facade; nothing is recorded unless the application
//! installs a recorder (the CLI can install a Prometheus exporter).

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "legalize_realtime_connections_total";
    pub const CONNECTED: &str = "legalize_realtime_connected";
    pub const RECONNECTS_TOTAL: &str = "legalize_realtime_reconnects_total";
    pub const RECONNECTS_EXHAUSTED_TOTAL: &str = "legalize_realtime_reconnects_exhausted_total";
    pub const MESSAGES_TOTAL: &str = "legalize_realtime_messages_total";
    pub const DECODE_ERRORS_TOTAL: &str = "legalize_realtime_decode_errors_total";
    pub const SENDS_TOTAL: &str = "legalize_realtime_sends_total";
}

/// Describe all metrics.
pub fn describe() {
    metrics::describe_counter!(names::CONNECTIONS_TOTAL, "Connections opened");
    metrics::describe_gauge!(names::CONNECTED, "1 while the channel is open, else 0");
    metrics::describe_counter!(names::RECONNECTS_TOTAL, "Reconnection timers armed");
    metrics::describe_counter!(
        names::RECONNECTS_EXHAUSTED_TOTAL,
        "Times automatic reconnection gave up"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Inbound messages decoded, by kind");
    metrics::describe_counter!(names::DECODE_ERRORS_TOTAL, "Inbound frames dropped as malformed");
    metrics::describe_counter!(names::SENDS_TOTAL, "Outbound sends, by outcome");
}

/// Record a successful open.
pub fn record_open() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTED).set(1.0);
}

/// Record that the connection is no longer open.
pub fn record_closed() {
    gauge!(names::CONNECTED).set(0.0);
}

/// Record an armed reconnection timer.
pub fn record_reconnect_scheduled() {
    counter!(names::RECONNECTS_TOTAL).increment(1);
}

/// Record reconnection exhaustion.
pub fn record_exhausted() {
    counter!(names::RECONNECTS_EXHAUSTED_TOTAL).increment(1);
}

/// Record a decoded inbound message.
pub fn record_message(kind: &str) {
    counter!(names::MESSAGES_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Record a dropped malformed frame.
pub fn record_decode_error() {
    counter!(names::DECODE_ERRORS_TOTAL).increment(1);
}

/// Record a send attempt.
pub fn record_send(sent: bool) {
    let outcome = if sent { "sent" } else { "dropped" };
    counter!(names::SENDS_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        // Just test that it doesn't panic
        describe();
        record_open();
        record_message("notification");
        record_send(false);
        record_closed();
    }
}
