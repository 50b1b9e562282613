//! Multiplexer-owned side of a session: socket, reader, writer and interest.

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;

use mio::net::TcpStream;
use mio::{Interest, Registry};

use crate::config::schema::SessionConfig;
use crate::net::connection::{ConnectionGuard, ConnectionId};
use crate::observability::metrics;
use crate::protocol::WsProtocol;

use super::handle::SessionHandle;
use super::reader::SessionReader;
use super::writer::SessionWriter;
use super::{InboundMessage, MessageSink, SessionError};

/// What the multiplexer should do with a session after its heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Alive,
    /// Close was requested; finalize the session.
    Closed,
}

/// One registered connection.
///
/// Only the multiplexer thread touches a `Session`; everything other
/// threads need goes through its [`SessionHandle`].
pub struct Session {
    handle: SessionHandle,
    stream: TcpStream,
    reader: SessionReader,
    writer: SessionWriter,
    protocol: Arc<WsProtocol>,
    interest: Option<Interest>,
    _guard: ConnectionGuard,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        guard: ConnectionGuard,
        protocol: Arc<WsProtocol>,
        config: &SessionConfig,
    ) -> Self {
        let id = guard.id();
        Self {
            handle: SessionHandle::new(id, peer_addr, config.outbound_queue_capacity),
            stream,
            reader: SessionReader::new(config.default_buffer_size, config.max_packet_size),
            writer: SessionWriter::new(id),
            protocol,
            interest: None,
            _guard: guard,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Always readable; writable only while output is pending.
    pub fn desired_interest(&self) -> Interest {
        if self.writer.has_pending(self.handle.outbound()) {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        let interest = self.desired_interest();
        let token = self.id().token();
        registry.register(&mut self.stream, token, interest)?;
        self.interest = Some(interest);
        Ok(())
    }

    /// Reregister only when the desired interest changed.
    pub fn update_interest(&mut self, registry: &Registry) -> io::Result<()> {
        let desired = self.desired_interest();
        if self.interest != Some(desired) {
            let token = self.id().token();
            registry.reregister(&mut self.stream, token, desired)?;
            self.interest = Some(desired);
        }
        Ok(())
    }

    /// Read everything available and deliver complete messages.
    pub fn on_readable(&mut self, sink: &dyn MessageSink) -> Result<(), SessionError> {
        let handle = &self.handle;
        let protocol = self.protocol.as_ref();
        let result = self
            .reader
            .on_readable(&mut self.stream, protocol, |unit| deliver(handle, protocol, sink, unit));
        if let Ok(bytes) = result {
            metrics::record_bytes_read(bytes);
        }
        result.map(|_| ())
    }

    /// Flush queued packets until the socket would block.
    pub fn on_writable(&mut self) -> Result<(), SessionError> {
        self.writer.flush(&mut self.stream, self.handle.outbound())?;
        Ok(())
    }

    /// Periodic maintenance independent of readiness.
    ///
    /// Re-drives boundary detection on buffered bytes and flushes packets
    /// queued by other threads. A pending close gets one best-effort flush
    /// so a queued close reply can still leave.
    pub fn on_heartbeat(&mut self, sink: &dyn MessageSink) -> Result<HeartbeatOutcome, SessionError> {
        if self.handle.is_close_requested() {
            if let Err(e) = self.writer.flush(&mut self.stream, self.handle.outbound()) {
                tracing::trace!(session_id = %self.id(), error = %e, "Final flush failed");
            }
            return Ok(HeartbeatOutcome::Closed);
        }

        let handle = &self.handle;
        let protocol = self.protocol.as_ref();
        self.reader
            .on_heartbeat(protocol, |unit| deliver(handle, protocol, sink, unit))?;
        self.writer.flush(&mut self.stream, self.handle.outbound())?;
        Ok(HeartbeatOutcome::Alive)
    }

    /// Deregister and release the socket. Pending output is discarded.
    pub fn finalize(mut self, registry: &Registry) {
        if self.interest.is_some() {
            if let Err(e) = registry.deregister(&mut self.stream) {
                tracing::trace!(session_id = %self.id(), error = %e, "Deregister failed");
            }
        }
        let dropped = self.writer.abort(self.handle.outbound());
        if dropped > 0 {
            tracing::debug!(session_id = %self.id(), dropped, "Discarded unsent packets");
        }
        self.handle.mark_closed();
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Decode one complete unit, apply control side effects and hand data
/// messages to the sink.
fn deliver(
    handle: &SessionHandle,
    protocol: &WsProtocol,
    sink: &dyn MessageSink,
    unit: &[u8],
) -> Result<(), SessionError> {
    let message = protocol.decode(unit)?;
    metrics::record_message_received(message.kind());
    tracing::trace!(session_id = %handle.id(), message = %message, "Message received");

    protocol.apply_control(&message, handle)?;
    if !message.is_control() {
        sink.deliver(InboundMessage {
            session: handle.clone(),
            message,
        });
    }
    Ok(())
}
