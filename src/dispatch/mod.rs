//! Message dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! multiplexer thread: MessageSink::deliver
//!     → WorkerPool::submit (wait ≤ enqueue timeout while full)
//!         full after timeout → MessageHandler::on_reject
//!     → SegQueue
//!     → N workers (idle backoff) → MessageHandler::handle
//!         Err / panic → MessageHandler::on_error
//! ```
//!
//! # Design Decisions
//! - Backpressure is explicit: a rejected task is handed back, never dropped
//! - A failing task never takes its worker down
//! - The pool is generic over the task type; the server uses `InboundMessage`

pub mod backoff;
pub mod handler;
pub mod pool;

pub use handler::{BoxError, HandlerError, MessageHandler};
pub use pool::{DispatchStats, WorkerPool};

/// Errors from submitting to or starting the pool.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch queue full ({capacity} tasks), task rejected")]
    Rejected { capacity: usize },

    #[error("worker pool is not running")]
    NotRunning,

    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}
