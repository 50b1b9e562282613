//! Server composition root.
//!
//! # Data Flow
//! ```text
//! start():  WorkerPool → Multiplexer LoopThread → Acceptor LoopThread
//! stop():   Acceptor → Multiplexer → WorkerPool   (each joined before the next)
//!
//! Acceptor ──Handoff──▶ Multiplexer ──DispatchSink──▶ WorkerPool ──▶ MessageHandler
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_queue::SegQueue;

use crate::config::schema::ServerConfig;
use crate::dispatch::{DispatchStats, MessageHandler, WorkerPool};
use crate::error::ServerError;
use crate::lifecycle::{ErrorHook, LoopThread};
use crate::net::{Acceptor, ConnectionTracker, Handoff, Multiplexer};
use crate::session::{InboundMessage, MessageSink};

/// Feeds completed messages from the multiplexer into the worker pool.
struct DispatchSink {
    pool: Arc<WorkerPool<InboundMessage>>,
}

impl MessageSink for DispatchSink {
    fn deliver(&self, message: InboundMessage) {
        let session_id = message.session.id();
        if let Err(e) = self.pool.submit(message) {
            tracing::debug!(session_id = %session_id, error = %e, "Message not dispatched");
        }
    }
}

struct Running {
    acceptor: LoopThread,
    multiplexer: LoopThread,
    local_addr: SocketAddr,
}

impl Running {
    fn stop(mut self) {
        self.acceptor.stop();
        self.multiplexer.stop();
    }
}

/// Non-blocking WebSocket server.
///
/// ```no_run
/// use std::sync::Arc;
/// use ws_reactor::{BoxError, InboundMessage, Message, MessageHandler, ServerConfig, WsServer};
///
/// struct Echo;
///
/// impl MessageHandler<InboundMessage> for Echo {
///     fn handle(&self, task: &InboundMessage) -> Result<(), BoxError> {
///         task.session.queue_message(&task.message)?;
///         Ok(())
///     }
/// }
///
/// let server = WsServer::new(ServerConfig::default(), Arc::new(Echo));
/// let addr = server.start()?;
/// println!("listening on {addr}");
/// server.stop();
/// # Ok::<(), ws_reactor::ServerError>(())
/// ```
pub struct WsServer {
    config: ServerConfig,
    handler: Arc<dyn MessageHandler<InboundMessage>>,
    pool: Arc<WorkerPool<InboundMessage>>,
    tracker: ConnectionTracker,
    state: Mutex<Option<Running>>,
}

impl WsServer {
    pub fn new(config: ServerConfig, handler: Arc<dyn MessageHandler<InboundMessage>>) -> Self {
        let pool = Arc::new(WorkerPool::new("ws-worker", &config.dispatch, Arc::clone(&handler)));
        Self {
            config,
            handler,
            pool,
            tracker: ConnectionTracker::new(),
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start (or restart) every stage and return the bound address.
    ///
    /// If a later stage fails, the stages already started are stopped again.
    pub fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = state.take() {
            tracing::info!("Restarting server");
            previous.stop();
        }

        self.pool.start()?;

        let handler = Arc::clone(&self.handler);
        let on_error: ErrorHook = Arc::new(move |e| handler.on_failure(e));
        let handoff: Handoff = Arc::new(SegQueue::new());
        let sink: Arc<dyn MessageSink> = Arc::new(DispatchSink {
            pool: Arc::clone(&self.pool),
        });

        let multiplexer = Multiplexer::new(&self.config, Arc::clone(&handoff), sink, self.tracker.clone())
            .and_then(|task| LoopThread::spawn("ws-multiplexer", task, Arc::clone(&on_error)));
        let mut multiplexer = match multiplexer {
            Ok(thread) => thread,
            Err(e) => {
                self.pool.stop();
                return Err(e);
            }
        };

        let acceptor = Acceptor::bind(&self.config.listener, handoff).and_then(|task| {
            let local_addr = task.local_addr();
            LoopThread::spawn("ws-acceptor", task, on_error).map(|thread| (thread, local_addr))
        });
        let (acceptor, local_addr) = match acceptor {
            Ok(started) => started,
            Err(e) => {
                multiplexer.stop();
                self.pool.stop();
                return Err(e);
            }
        };

        tracing::info!(
            address = %local_addr,
            workers = self.config.dispatch.workers,
            "WebSocket server started"
        );
        *state = Some(Running {
            acceptor,
            multiplexer,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close every session, then drain the workers.
    pub fn stop(&self) {
        let running = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.stop();
            self.pool.stop();
            tracing::info!("WebSocket server stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| running.acceptor.is_running() && running.multiplexer.is_running())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|running| running.local_addr)
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.pool.stats()
    }

    /// Sessions currently registered with the multiplexer.
    pub fn active_sessions(&self) -> u64 {
        self.tracker.active_count()
    }
}

impl Drop for WsServer {
    fn drop(&mut self) {
        self.stop();
    }
}
