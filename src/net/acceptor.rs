//! TCP accept loop.
//!
//! # Responsibilities
//! - Bind the listening socket (backlog, `SO_REUSEADDR`) synchronously at start
//! - Accept every pending connection on readiness
//! - Configure clients (non-blocking, keep-alive, no-delay) and hand them off
//!
//! # Design Decisions
//! - Own `mio::Poll`, separate from the multiplexer, so a burst of accepts
//!   never delays session I/O
//! - Per-client setup failures drop that client only
//! - Accept errors other than `WouldBlock` end the current burst; the next
//!   readiness event retries

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, SockRef, Socket, Type};

use crate::config::schema::ListenerConfig;
use crate::error::ServerError;
use crate::lifecycle::{LoopTask, Shutdown};

/// Accepted sockets waiting for the multiplexer to register them.
pub type Handoff = Arc<SegQueue<(TcpStream, SocketAddr)>>;

const LISTENER: Token = Token(0);

/// Accept loop state, run on its own [`LoopThread`](crate::lifecycle::LoopThread).
pub struct Acceptor {
    listener: TcpListener,
    poll: Poll,
    events: Events,
    handoff: Handoff,
    poll_timeout: Duration,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Bind to the configured address. Errors surface here, not in the loop.
    pub fn bind(config: &ListenerConfig, handoff: Handoff) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(config.bind_address.clone()))?;

        let std_listener = bind_listener(addr, config.backlog).map_err(|source| ServerError::Bind {
            addr: config.bind_address.clone(),
            source,
        })?;
        let mut listener = TcpListener::from_std(std_listener);
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        tracing::info!(
            address = %local_addr,
            backlog = config.backlog,
            "Listener bound"
        );

        Ok(Self {
            listener,
            poll,
            events: Events::with_capacity(64),
            handoff,
            poll_timeout: config.poll_timeout(),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept until the listener would block.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    if let Err(e) = configure_client(&stream) {
                        tracing::warn!(peer_addr = %peer_addr, error = %e, "Dropping client, socket setup failed");
                        continue;
                    }
                    tracing::debug!(peer_addr = %peer_addr, "Connection accepted");
                    self.handoff.push((stream, peer_addr));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    return;
                }
            }
        }
    }
}

impl LoopTask for Acceptor {
    fn iterate(&mut self, _shutdown: &Shutdown) -> Result<(), ServerError> {
        match self.poll.poll(&mut self.events, Some(self.poll_timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        if self.events.iter().any(|event| event.token() == LISTENER) {
            self.accept_pending();
        }
        Ok(())
    }

    fn on_stop(&mut self) {
        if let Err(e) = self.poll.registry().deregister(&mut self.listener) {
            tracing::trace!(error = %e, "Listener deregister failed");
        }
        tracing::info!(address = %self.local_addr, "Listener closed");
    }
}

fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;
    Ok(socket.into())
}

fn configure_client(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    SockRef::from(stream).set_keepalive(true)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn config(bind_address: &str) -> ListenerConfig {
        ListenerConfig {
            bind_address: bind_address.to_string(),
            backlog: 16,
            poll_timeout_ms: 10,
        }
    }

    #[test]
    fn accepted_clients_reach_the_handoff() {
        let handoff: Handoff = Arc::new(SegQueue::new());
        let mut acceptor = Acceptor::bind(&config("127.0.0.1:0"), Arc::clone(&handoff)).unwrap();
        let addr = acceptor.local_addr();
        assert_ne!(addr.port(), 0);

        let _a = std::net::TcpStream::connect(addr).unwrap();
        let _b = std::net::TcpStream::connect(addr).unwrap();

        let shutdown = Shutdown::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handoff.len() < 2 && Instant::now() < deadline {
            acceptor.iterate(&shutdown).unwrap();
        }
        assert_eq!(handoff.len(), 2);
    }

    #[test]
    fn invalid_address_is_reported() {
        let handoff: Handoff = Arc::new(SegQueue::new());
        assert!(matches!(
            Acceptor::bind(&config("nope"), handoff),
            Err(ServerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn address_in_use_is_a_bind_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let handoff: Handoff = Arc::new(SegQueue::new());

        // SO_REUSEADDR does not allow two listeners on one port.
        assert!(matches!(
            Acceptor::bind(&config(&addr), handoff),
            Err(ServerError::Bind { .. })
        ));
    }
}
