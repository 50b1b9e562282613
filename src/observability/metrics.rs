//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (sessions, messages, bytes, dispatch outcomes)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `ws_sessions_opened_total` (counter)
//! - `ws_sessions_closed_total` (counter, label: reason)
//! - `ws_sessions_active` (gauge)
//! - `ws_messages_received_total` (counter, label: kind)
//! - `ws_packets_sent_total` / `ws_packets_failed_total` (counter, label: kind)
//! - `ws_bytes_read_total` / `ws_bytes_written_total` (counter)
//! - `ws_protocol_errors_total` (counter)
//! - `ws_dispatch_submitted_total` / `ws_dispatch_rejected_total` / `ws_dispatch_errors_total` (counter)
//! - `ws_dispatch_queue_length` (gauge)
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Kind labels come from a closed set, so cardinality stays fixed

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::protocol::MessageKind;

pub const SESSIONS_OPENED_TOTAL: &str = "ws_sessions_opened_total";
pub const SESSIONS_CLOSED_TOTAL: &str = "ws_sessions_closed_total";
pub const SESSIONS_ACTIVE: &str = "ws_sessions_active";
pub const MESSAGES_RECEIVED_TOTAL: &str = "ws_messages_received_total";
pub const PACKETS_SENT_TOTAL: &str = "ws_packets_sent_total";
pub const PACKETS_FAILED_TOTAL: &str = "ws_packets_failed_total";
pub const BYTES_READ_TOTAL: &str = "ws_bytes_read_total";
pub const BYTES_WRITTEN_TOTAL: &str = "ws_bytes_written_total";
pub const PROTOCOL_ERRORS_TOTAL: &str = "ws_protocol_errors_total";
pub const DISPATCH_SUBMITTED_TOTAL: &str = "ws_dispatch_submitted_total";
pub const DISPATCH_REJECTED_TOTAL: &str = "ws_dispatch_rejected_total";
pub const DISPATCH_ERRORS_TOTAL: &str = "ws_dispatch_errors_total";
pub const DISPATCH_QUEUE_LENGTH: &str = "ws_dispatch_queue_length";

/// Install the global Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_session_opened(active: u64) {
    counter!(SESSIONS_OPENED_TOTAL).increment(1);
    gauge!(SESSIONS_ACTIVE).set(active as f64);
}

pub fn record_session_closed(reason: &'static str, active: u64) {
    counter!(SESSIONS_CLOSED_TOTAL, "reason" => reason).increment(1);
    gauge!(SESSIONS_ACTIVE).set(active as f64);
}

pub fn record_message_received(kind: MessageKind) {
    counter!(MESSAGES_RECEIVED_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_packet_sent(kind: MessageKind, bytes: usize) {
    counter!(PACKETS_SENT_TOTAL, "kind" => kind.as_str()).increment(1);
    counter!(BYTES_WRITTEN_TOTAL).increment(bytes as u64);
}

pub fn record_packet_failed(kind: MessageKind) {
    counter!(PACKETS_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_bytes_read(bytes: usize) {
    counter!(BYTES_READ_TOTAL).increment(bytes as u64);
}

pub fn record_protocol_error() {
    counter!(PROTOCOL_ERRORS_TOTAL).increment(1);
}

pub fn record_dispatch_submitted(queue_len: usize) {
    counter!(DISPATCH_SUBMITTED_TOTAL).increment(1);
    gauge!(DISPATCH_QUEUE_LENGTH).set(queue_len as f64);
}

pub fn record_dispatch_rejected() {
    counter!(DISPATCH_REJECTED_TOTAL).increment(1);
}

pub fn record_dispatch_error() {
    counter!(DISPATCH_ERRORS_TOTAL).increment(1);
}
