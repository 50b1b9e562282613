//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → acceptor.rs (own poll, accept until WouldBlock, socket options)
//!     → Handoff (lock-free queue)
//!     → multiplexer.rs (register, readiness, heartbeats)
//!     → session (reader / writer / codec)
//!
//! Session States:
//!     Handed off → Registered → Close requested → Finalized
//! ```
//!
//! # Design Decisions
//! - Two threads, two polls: accepting never stalls session I/O
//! - Every session tracked for `active_sessions` and orderly shutdown
//! - One failing session never affects the others

pub mod acceptor;
pub mod connection;
pub mod multiplexer;

pub use acceptor::{Acceptor, Handoff};
pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use multiplexer::Multiplexer;
