//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (server.rs):
//!     dispatch pool → multiplexer LoopThread → acceptor LoopThread
//!
//! Shutdown (shutdown.rs + event_loop.rs):
//!     Shutdown::trigger → loop observes flag within ≤10 ms → on_stop → join
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls WsServer::stop
//! ```
//!
//! # Design Decisions
//! - Ordered startup: workers first, then the multiplexer, listeners last
//! - Ordered shutdown: stop accept, close sessions, drain workers
//! - Every wait is bounded, so stop never hangs on an idle socket

pub mod event_loop;
pub mod shutdown;
pub mod signals;

pub use event_loop::{ErrorHook, LoopTask, LoopThread};
pub use shutdown::Shutdown;
