//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, capacities > 0, addresses parse)
//! - Check cross-field limits (buffer size vs. packet size)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// Smallest packet limit that still fits a masked frame header.
pub const MIN_PACKET_SIZE: usize = 14;

/// One failed check, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    require_positive(&mut errors, "listener.backlog", config.listener.backlog as u64);
    require_positive(&mut errors, "listener.poll_timeout_ms", config.listener.poll_timeout_ms);

    require_positive(&mut errors, "multiplexer.poll_timeout_ms", config.multiplexer.poll_timeout_ms);
    require_positive(
        &mut errors,
        "multiplexer.heartbeat_interval_ms",
        config.multiplexer.heartbeat_interval_ms,
    );

    let session = &config.session;
    require_positive(
        &mut errors,
        "session.outbound_queue_capacity",
        session.outbound_queue_capacity as u64,
    );
    require_positive(&mut errors, "session.default_buffer_size", session.default_buffer_size as u64);
    if session.max_packet_size < MIN_PACKET_SIZE {
        errors.push(ValidationError::new(
            "session.max_packet_size",
            format!("must be at least {MIN_PACKET_SIZE} bytes"),
        ));
    }
    if session.default_buffer_size > session.max_packet_size {
        errors.push(ValidationError::new(
            "session.default_buffer_size",
            "must not exceed session.max_packet_size",
        ));
    }
    if session.forwarded_header.trim().is_empty() {
        errors.push(ValidationError::new("session.forwarded_header", "must not be empty"));
    }

    require_positive(&mut errors, "dispatch.workers", config.dispatch.workers as u64);
    require_positive(&mut errors, "dispatch.queue_capacity", config.dispatch.queue_capacity as u64);
    require_positive(&mut errors, "dispatch.enqueue_timeout_ms", config.dispatch.enqueue_timeout_ms);
    require_positive(&mut errors, "dispatch.max_idle_backoff_ms", config.dispatch.max_idle_backoff_ms);

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn require_positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than zero"));
    }
}
