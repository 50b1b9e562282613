//! WebSocket protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Session receive buffer
//!     → codec.rs (boundary check: HTTP request or frame sequence?)
//!         → http.rs  (CRLFCRLF + Content-Length)
//!         → frame.rs (frame headers, FIN / control stop rules)
//!     → codec.rs (decode exactly one unit)
//!         → handshake.rs (101 response for the upgrade GET)
//!         → message.rs   (assemble + unmask data frames, collect controls)
//!     → control side effects (handshake reply, close reply, pong)
//!     → data messages handed to the dispatch layer
//!
//! Outbound:
//!     Message → message.rs (marshal) → session writer queue
//! ```
//!
//! # Design Decisions
//! - All functions are stateless over a byte slice; the session owns the bytes
//! - Handshake detection is a literal `GET` prefix check
//! - Unknown opcodes are hard errors, never a default branch
//! - Server frames are never masked

pub mod codec;
pub mod frame;
pub mod handshake;
pub mod http;
pub mod message;

pub use codec::{Boundary, CodecConfig, ControlPeer, WsProtocol};
pub use frame::{Frame, FrameKind};
pub use handshake::{compute_accept_key, Handshake};
pub use http::{HttpRequest, HttpResponse};
pub use message::{ControlKind, ControlMessage, Message, MessageKind};

/// Errors raised while parsing or decoding wire data.
///
/// Every variant is a connection-level failure: the session that produced
/// the bytes is closed.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown opcode 0x{0:X}")]
    UnknownOpcode(u8),

    #[error("{len} bytes exceed the {max} byte packet limit")]
    FrameTooLarge { len: u64, max: usize },

    #[error("control frame must not be fragmented")]
    FragmentedControl,

    #[error("client frame is not masked")]
    UnmaskedFrame,

    #[error("continuation frame without a preceding text or binary frame")]
    UnexpectedContinuation,

    #[error("new data frame while a fragmented message is still open")]
    ExpectedContinuation,

    #[error("text payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("malformed HTTP request: {0}")]
    MalformedHttp(String),

    #[error("handshake is missing the Sec-WebSocket-Key header")]
    MissingWebSocketKey,

    #[error("buffer does not contain a complete unit")]
    Incomplete,
}
