//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::CodecConfig;

/// Root configuration for the WebSocket server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Accepting socket settings.
    pub listener: ListenerConfig,

    /// Event loop that services established sessions.
    pub multiplexer: MultiplexerConfig,

    /// Per-connection buffers, queues and protocol options.
    pub session: SessionConfig,

    /// Worker pool delivering messages to the application handler.
    pub dispatch: DispatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8888"). Port 0 picks a free port.
    pub bind_address: String,

    /// Accept backlog handed to `listen(2)`.
    pub backlog: u32,

    /// Upper bound on one acceptor poll, in milliseconds.
    pub poll_timeout_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8888".to_string(),
            backlog: 100,
            poll_timeout_ms: 100,
        }
    }
}

impl ListenerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Multiplexer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// Upper bound on one readiness poll, in milliseconds. Also the time
    /// budget for registering newly accepted sessions per iteration.
    pub poll_timeout_ms: u64,

    /// Interval between heartbeats of every session, in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 5,
            heartbeat_interval_ms: 5,
        }
    }
}

impl MultiplexerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum queued outbound packets per session.
    pub outbound_queue_capacity: usize,

    /// Initial receive buffer size; buffers shrink back to it when idle.
    pub default_buffer_size: usize,

    /// Largest frame sequence or HTTP request accepted, in bytes.
    pub max_packet_size: usize,

    /// Trusted header carrying the real client address.
    pub forwarded_header: String,

    /// Reject unmasked client frames.
    pub require_mask: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 3000,
            default_buffer_size: 1024,
            max_packet_size: 10 * 1024 * 1024,
            forwarded_header: "X-Forwarded-For".to_string(),
            require_mask: true,
        }
    }
}

impl SessionConfig {
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            max_packet_size: self.max_packet_size,
            require_mask: self.require_mask,
            forwarded_header: self.forwarded_header.clone(),
        }
    }
}

/// Dispatch worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of worker threads.
    pub workers: usize,

    /// Queue length at which `submit` starts waiting.
    pub queue_capacity: usize,

    /// How long `submit` waits for space before rejecting, in milliseconds.
    pub enqueue_timeout_ms: u64,

    /// Cap on the idle worker backoff, in milliseconds.
    pub max_idle_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 10_000,
            enqueue_timeout_ms: 100,
            max_idle_backoff_ms: 100,
        }
    }
}

impl DispatchConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn max_idle_backoff(&self) -> Duration {
        Duration::from_millis(self.max_idle_backoff_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
