//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ws_reactor::{BoxError, InboundMessage, Message, MessageHandler, ServerConfig, WsServer};

/// Loopback config on a free port with fast loops.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.poll_timeout_ms = 10;
    config.dispatch.workers = 2;
    config.dispatch.max_idle_backoff_ms = 5;
    config
}

/// Start a server, returning it with its bound address.
pub fn start_server(config: ServerConfig, handler: Arc<dyn MessageHandler<InboundMessage>>) -> (WsServer, SocketAddr) {
    let server = WsServer::new(config, handler);
    let addr = server.start().expect("server failed to start");
    (server, addr)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Echo handler with a few commands, recording what it saw.
///
/// - `whoami` → the session's remote address
/// - `count`  → per-session counter kept in the scratch store
/// - `bye`    → closes the session
/// - anything else is echoed back unchanged
#[derive(Default)]
pub struct RecordingHandler {
    pub received: Mutex<Vec<Message>>,
    pub rejected: AtomicUsize,
    pub errors: AtomicUsize,
    /// While set, `handle` waits before doing anything.
    pub hold: AtomicBool,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl MessageHandler<InboundMessage> for RecordingHandler {
    fn handle(&self, task: &InboundMessage) -> Result<(), BoxError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.hold.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }

        self.received.lock().unwrap().push(task.message.clone());
        let session = &task.session;
        match task.message.as_text() {
            Some("whoami") => session.queue_message(&Message::text(session.remote_address()))?,
            Some("count") => {
                let count = session.get::<u32>("count").map_or(1, |n| *n + 1);
                session.set("count", count);
                session.queue_message(&Message::text(count.to_string()))?;
            }
            Some("bye") => session.close(),
            _ => session.queue_message(&task.message)?,
        }
        Ok(())
    }

    fn on_reject(&self, _task: InboundMessage) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _task: &InboundMessage, _error: &ws_reactor::HandlerError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}
