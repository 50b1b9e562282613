//! Per-connection state.
//!
//! # Data Flow
//! ```text
//! readable socket
//!     → reader.rs (read until WouldBlock, GrowableBuffer)
//!     → codec boundary check → decode → control side effects
//!     → data messages → MessageSink (dispatch pool)
//!
//! any thread: SessionHandle::queue_message
//!     → writer.rs OutboundQueue (lock-free, bounded)
//!     → multiplexer thread: SessionWriter::flush on writable / heartbeat
//! ```
//!
//! # Design Decisions
//! - Buffers are owned by the multiplexer thread; no per-session locks
//! - Worker threads only see `SessionHandle` (atomics, lock-free queue, DashMap)
//! - Outbound overflow is an error returned to the caller, never a silent drop

pub mod buffer;
pub mod driver;
pub mod handle;
pub mod reader;
pub mod writer;

pub use buffer::{BufferError, GrowableBuffer};
pub use driver::{HeartbeatOutcome, Session};
pub use handle::SessionHandle;
pub use reader::SessionReader;
pub use writer::{OutboundPacket, OutboundQueue, PacketToken, SessionWriter};

use crate::protocol::{Message, ProtocolError};

/// Errors that end (or refuse work on) one session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("outbound queue is full ({capacity} packets)")]
    OutboundQueueFull { capacity: usize },

    #[error("socket accepted zero bytes")]
    WriteZero,

    #[error("session is closed")]
    Closed,

    #[error("session handling panicked: {0}")]
    Panicked(String),
}

impl SessionError {
    /// Short label for logs and the `reason` metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::WriteZero => "io_error",
            Self::PeerClosed => "peer_closed",
            Self::Protocol(_) | Self::Buffer(_) => "protocol_error",
            Self::OutboundQueueFull { .. } => "outbound_overflow",
            Self::Closed => "closed",
            Self::Panicked(_) => "panic",
        }
    }
}

/// A decoded data message together with the session it arrived on.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub session: SessionHandle,
    pub message: Message,
}

impl std::fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} from {}", self.message, self.session)
    }
}

/// Receives data messages as they complete on the multiplexer thread.
///
/// Implementations must not block for long; the multiplexer waits on them.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, message: InboundMessage);
}
