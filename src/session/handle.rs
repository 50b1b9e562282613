//! Thread-safe view of a session, shared with worker threads.

use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;

use crate::net::connection::ConnectionId;
use crate::protocol::{ControlPeer, Message};

use super::writer::OutboundQueue;
use super::SessionError;

type ScratchValue = Arc<dyn Any + Send + Sync>;

struct Shared {
    id: ConnectionId,
    peer_addr: SocketAddr,
    outbound: OutboundQueue,
    close_requested: AtomicBool,
    closed: AtomicBool,
    forwarded_ip: ArcSwapOption<String>,
    scratch: DashMap<String, ScratchValue>,
}

/// Cloneable handle to one connection.
///
/// Handles never touch the socket: `queue_message` only enqueues bytes and
/// `close` only raises a flag. The multiplexer thread acts on both at the
/// next readiness event or heartbeat.
#[derive(Clone)]
pub struct SessionHandle(Arc<Shared>);

impl SessionHandle {
    pub(crate) fn new(id: ConnectionId, peer_addr: SocketAddr, outbound_capacity: usize) -> Self {
        Self(Arc::new(Shared {
            id,
            peer_addr,
            outbound: OutboundQueue::new(outbound_capacity),
            close_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            forwarded_ip: ArcSwapOption::empty(),
            scratch: DashMap::new(),
        }))
    }

    pub fn id(&self) -> ConnectionId {
        self.0.id
    }

    /// Address of the directly connected peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.0.peer_addr
    }

    /// Client address reported by the trusted forwarded header, if any.
    pub fn forwarded_ip(&self) -> Option<String> {
        self.0.forwarded_ip.load_full().map(|ip| ip.as_ref().clone())
    }

    /// Forwarded client address when a proxy supplied one, otherwise the peer IP.
    pub fn remote_address(&self) -> String {
        self.forwarded_ip()
            .unwrap_or_else(|| self.0.peer_addr.ip().to_string())
    }

    /// Marshal `message` and queue it for the multiplexer to write.
    ///
    /// Fails with [`SessionError::OutboundQueueFull`] instead of dropping.
    pub fn queue_message(&self, message: &Message) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.0.outbound.push(message.marshal(), message.kind())?;
        Ok(())
    }

    /// Request the session be closed at the next heartbeat.
    pub fn close(&self) {
        if !self.0.close_requested.swap(true, Ordering::AcqRel) {
            tracing::debug!(session_id = %self.0.id, "Session close requested");
        }
    }

    pub fn is_close_requested(&self) -> bool {
        self.0.close_requested.load(Ordering::Acquire)
    }

    /// The socket has been released.
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        self.0.close_requested.store(true, Ordering::Release);
        self.0.closed.store(true, Ordering::Release);
    }

    /// Store a typed value in the per-session scratch map.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.0.scratch.insert(key.into(), Arc::new(value));
    }

    /// Fetch a typed value. `None` when absent or stored under another type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.0.scratch.get(key)?.value().clone();
        value.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.0.scratch.remove(key).is_some()
    }

    /// Queued plus in-flight outbound packets.
    pub fn outbound_queue_len(&self) -> usize {
        self.0.outbound.len()
    }

    pub fn max_outbound_queue_len(&self) -> usize {
        self.0.outbound.max_len()
    }

    /// Outbound queue fill ratio in `[0, 1]`.
    pub fn load_factor(&self) -> f64 {
        self.0.outbound.load_factor()
    }

    pub(crate) fn outbound(&self) -> &OutboundQueue {
        &self.0.outbound
    }
}

impl ControlPeer for SessionHandle {
    type Error = SessionError;

    fn reply(&self, message: Message) -> Result<(), SessionError> {
        self.queue_message(&message)
    }

    fn bind_forwarded_ip(&self, ip: String) {
        tracing::debug!(session_id = %self.0.id, forwarded_ip = %ip, "Bound forwarded client address");
        self.0.forwarded_ip.store(Some(Arc::new(ip)));
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SessionHandle {}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.0.id)
            .field("peer_addr", &self.0.peer_addr)
            .field("outbound", &self.0.outbound.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0.id, self.0.peer_addr)
    }
}
