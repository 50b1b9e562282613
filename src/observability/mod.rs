//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Acceptor / multiplexer / sessions / dispatch produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty, compact or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Session id and peer address ride along as structured fields
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
