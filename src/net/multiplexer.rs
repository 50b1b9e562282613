//! Session event loop.
//!
//! # Responsibilities
//! - Register sockets handed off by the acceptor, within a time budget
//! - Drive session reads and writes on readiness
//! - Heartbeat every session on a fixed interval, independent of readiness
//! - Tear down exactly the session that failed (or panicked), leaving others untouched
//!
//! # Data Flow
//! ```text
//! iterate():
//!     handoff queue → register (≤ poll timeout) → Session
//!     poll(≤ poll timeout)
//!         readable → Session::on_readable → MessageSink
//!         writable → Session::on_writable
//!     heartbeat due → Session::on_heartbeat for all → update interest
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::{Events, Poll, Token};

use crate::config::schema::{ServerConfig, SessionConfig};
use crate::dispatch::handler::panic_message;
use crate::error::ServerError;
use crate::lifecycle::{LoopTask, Shutdown};
use crate::observability::metrics;
use crate::protocol::WsProtocol;
use crate::session::{HeartbeatOutcome, MessageSink, Session, SessionError};

use super::acceptor::Handoff;
use super::connection::ConnectionTracker;

/// Why a session is being removed.
#[derive(Debug)]
enum CloseCause {
    Requested,
    Shutdown,
    Failed(SessionError),
}

impl CloseCause {
    fn reason(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Shutdown => "shutdown",
            Self::Failed(e) => e.reason(),
        }
    }
}

/// Readiness collected from one poll.
#[derive(Debug, Clone, Copy)]
struct Readiness {
    token: Token,
    readable: bool,
    writable: bool,
}

pub struct Multiplexer {
    poll: Poll,
    events: Events,
    ready: Vec<Readiness>,
    sessions: HashMap<Token, Session>,
    handoff: Handoff,
    sink: Arc<dyn MessageSink>,
    protocol: Arc<WsProtocol>,
    session_config: SessionConfig,
    tracker: ConnectionTracker,
    poll_timeout: Duration,
    heartbeat_interval: Duration,
    last_heartbeat: Instant,
}

impl Multiplexer {
    pub fn new(
        config: &ServerConfig,
        handoff: Handoff,
        sink: Arc<dyn MessageSink>,
        tracker: ConnectionTracker,
    ) -> Result<Self, ServerError> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(1024),
            ready: Vec::new(),
            sessions: HashMap::new(),
            handoff,
            sink,
            protocol: Arc::new(WsProtocol::new(config.session.codec_config())),
            session_config: config.session.clone(),
            tracker,
            poll_timeout: config.multiplexer.poll_timeout(),
            heartbeat_interval: config.multiplexer.heartbeat_interval(),
            last_heartbeat: Instant::now(),
        })
    }

    /// Register handed-off sockets until the queue is empty or the budget is spent.
    fn register_new(&mut self) {
        let deadline = Instant::now() + self.poll_timeout;
        while let Some((stream, peer_addr)) = self.handoff.pop() {
            let guard = self.tracker.track();
            let mut session = Session::new(
                stream,
                peer_addr,
                guard,
                Arc::clone(&self.protocol),
                &self.session_config,
            );

            match session.register(self.poll.registry()) {
                Ok(()) => {
                    tracing::debug!(session_id = %session.id(), peer_addr = %peer_addr, "Session opened");
                    metrics::record_session_opened(self.tracker.active_count());
                    self.sessions.insert(session.id().token(), session);
                }
                Err(e) => {
                    tracing::warn!(peer_addr = %peer_addr, error = %e, "Failed to register session");
                }
            }

            if Instant::now() >= deadline {
                break;
            }
        }
    }

    fn service(&mut self, readiness: Readiness) {
        let Some(session) = self.sessions.get_mut(&readiness.token) else {
            return;
        };
        let sink = self.sink.as_ref();
        let registry = self.poll.registry();

        let result = isolate(|| {
            if readiness.readable {
                session.on_readable(sink)?;
            }
            // Replies queued while reading go out without waiting for a heartbeat.
            session.on_writable()?;
            session.update_interest(registry).map_err(SessionError::Io)
        });

        if let Err(e) = result {
            self.close_session(readiness.token, CloseCause::Failed(e));
        }
    }

    fn heartbeat(&mut self) {
        let registry = self.poll.registry();
        let sink = self.sink.as_ref();
        let mut closing = Vec::new();

        for (token, session) in self.sessions.iter_mut() {
            let outcome = isolate(|| {
                let outcome = session.on_heartbeat(sink)?;
                if outcome == HeartbeatOutcome::Alive {
                    session.update_interest(registry)?;
                }
                Ok(outcome)
            });
            match outcome {
                Ok(HeartbeatOutcome::Alive) => {}
                Ok(HeartbeatOutcome::Closed) => closing.push((*token, CloseCause::Requested)),
                Err(e) => closing.push((*token, CloseCause::Failed(e))),
            }
        }

        for (token, cause) in closing {
            self.close_session(token, cause);
        }
    }

    fn close_session(&mut self, token: Token, cause: CloseCause) {
        let Some(session) = self.sessions.remove(&token) else {
            return;
        };
        let session_id = session.id();
        let peer_addr = session.handle().peer_addr();

        match &cause {
            CloseCause::Failed(e @ SessionError::Panicked(_)) => {
                tracing::error!(session_id = %session_id, peer_addr = %peer_addr, error = %e, "Session handling panicked, closing session");
            }
            CloseCause::Failed(e @ (SessionError::Protocol(_) | SessionError::Buffer(_))) => {
                metrics::record_protocol_error();
                tracing::warn!(session_id = %session_id, peer_addr = %peer_addr, error = %e, "Protocol violation, closing session");
            }
            CloseCause::Failed(e) => {
                tracing::debug!(session_id = %session_id, peer_addr = %peer_addr, error = %e, "Session failed");
            }
            CloseCause::Requested | CloseCause::Shutdown => {
                tracing::debug!(session_id = %session_id, peer_addr = %peer_addr, reason = cause.reason(), "Session closed");
            }
        }

        session.finalize(self.poll.registry());
        metrics::record_session_closed(cause.reason(), self.tracker.active_count());
    }
}

/// Run one session's work, turning a panic into an error for that session.
fn isolate<T>(work: impl FnOnce() -> Result<T, SessionError>) -> Result<T, SessionError> {
    catch_unwind(AssertUnwindSafe(work))
        .unwrap_or_else(|payload| Err(SessionError::Panicked(panic_message(payload.as_ref()))))
}

impl LoopTask for Multiplexer {
    fn iterate(&mut self, _shutdown: &Shutdown) -> Result<(), ServerError> {
        self.register_new();

        match self.poll.poll(&mut self.events, Some(self.poll_timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }

        let mut ready = std::mem::take(&mut self.ready);
        ready.extend(self.events.iter().map(|event| Readiness {
            token: event.token(),
            readable: event.is_readable() || event.is_read_closed() || event.is_error(),
            writable: event.is_writable() || event.is_write_closed(),
        }));
        for readiness in ready.drain(..) {
            self.service(readiness);
        }
        self.ready = ready;

        if self.last_heartbeat.elapsed() >= self.heartbeat_interval {
            self.heartbeat();
            self.last_heartbeat = Instant::now();
        }
        Ok(())
    }

    fn on_stop(&mut self) {
        let tokens: Vec<Token> = self.sessions.keys().copied().collect();
        let open = tokens.len();
        for token in tokens {
            self.close_session(token, CloseCause::Shutdown);
        }

        let mut pending = 0;
        while self.handoff.pop().is_some() {
            pending += 1;
        }
        tracing::info!(sessions = open, pending_handoffs = pending, "Multiplexer stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener as StdListener, TcpStream as StdStream};
    use std::sync::Mutex;

    use crossbeam_queue::SegQueue;

    use super::*;
    use crate::lifecycle::LoopThread;
    use crate::protocol::frame::{encode_frame, FrameKind};
    use crate::session::InboundMessage;

    /// Records text messages; panics on `boom`.
    #[derive(Default)]
    struct FussySink {
        seen: Mutex<Vec<String>>,
    }

    impl MessageSink for FussySink {
        fn deliver(&self, inbound: InboundMessage) {
            let text = inbound.message.as_text().unwrap_or_default().to_string();
            if text == "boom" {
                panic!("sink refused '{text}'");
            }
            self.seen.lock().unwrap().push(text);
        }
    }

    fn masked_text(text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        encode_frame(FrameKind::Text, true, text.as_bytes(), Some([1, 2, 3, 4]), &mut out);
        out
    }

    /// Connect a blocking client and hand the server side to the multiplexer.
    fn connect(listener: &StdListener, handoff: &Handoff) -> StdStream {
        let client = StdStream::connect(listener.local_addr().unwrap()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let (server_side, peer_addr) = listener.accept().unwrap();
        server_side.set_nonblocking(true).unwrap();
        handoff.push((mio::net::TcpStream::from_std(server_side), peer_addr));
        client
    }

    fn upgrade(client: &mut StdStream) {
        client
            .write_all(b"GET / HTTP/1.1\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n")
            .unwrap();
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            client.read_exact(&mut byte).unwrap();
            head.push(byte[0]);
        }
        assert!(head.starts_with(b"HTTP/1.1 101"));
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn panicking_session_is_closed_alone() {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let handoff: Handoff = Arc::new(SegQueue::new());
        let sink = Arc::new(FussySink::default());
        let tracker = ConnectionTracker::new();
        let multiplexer = Multiplexer::new(
            &ServerConfig::default(),
            Arc::clone(&handoff),
            sink.clone(),
            tracker.clone(),
        )
        .unwrap();
        let mut thread = LoopThread::spawn("test-multiplexer", multiplexer, Arc::new(|_| {})).unwrap();

        let mut doomed = connect(&listener, &handoff);
        let mut healthy = connect(&listener, &handoff);
        upgrade(&mut doomed);
        upgrade(&mut healthy);
        assert_eq!(tracker.active_count(), 2);

        doomed.write_all(&masked_text("boom")).unwrap();
        assert!(wait_until(|| tracker.active_count() == 1));
        let mut rest = Vec::new();
        assert!(matches!(doomed.read_to_end(&mut rest), Ok(0) | Err(_)));

        healthy.write_all(&masked_text("still here")).unwrap();
        assert!(wait_until(|| !sink.seen.lock().unwrap().is_empty()));
        assert_eq!(*sink.seen.lock().unwrap(), ["still here"]);
        assert!(thread.is_running());
        thread.stop();
    }
}
