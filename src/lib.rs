//! Non-blocking WebSocket server library.
//!
//! One acceptor thread, one multiplexer thread driving every session over
//! `mio`, and a bounded worker pool delivering messages to the application.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::schema::ServerConfig;
pub use dispatch::{BoxError, DispatchError, DispatchStats, HandlerError, MessageHandler};
pub use error::ServerError;
pub use protocol::{Message, MessageKind, ProtocolError};
pub use server::WsServer;
pub use session::{InboundMessage, SessionError, SessionHandle};
