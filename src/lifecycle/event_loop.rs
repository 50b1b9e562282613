//! Dedicated-thread loop shared by the acceptor and the multiplexer.
//!
//! # Responsibilities
//! - Run a [`LoopTask`] on a named thread until stopped
//! - Log iteration errors and panics, forward them to an error hook, then keep going
//! - Join on stop and expose whether the thread is still alive
//!
//! # Design Decisions
//! - The task owns its sockets and poll; dropping it on exit (or during a
//!   panic unwind) releases them
//! - The running flag is cleared by a drop guard, so a panicking loop still
//!   reports as stopped

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::dispatch::handler::panic_message;
use crate::error::ServerError;

use super::shutdown::{Shutdown, STOP_CHECK_INTERVAL};

/// Callback for errors a loop survives.
pub type ErrorHook = Arc<dyn Fn(&ServerError) + Send + Sync>;

/// One bounded unit of loop work.
pub trait LoopTask: Send + 'static {
    /// Do one iteration. Must return within a bounded time so the stop flag
    /// is observed promptly.
    fn iterate(&mut self, shutdown: &Shutdown) -> Result<(), ServerError>;

    /// Release resources once the loop has stopped.
    fn on_stop(&mut self) {}
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to a running loop thread.
pub struct LoopThread {
    name: String,
    shutdown: Shutdown,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LoopThread {
    /// Spawn `task` on a new thread called `name`.
    pub fn spawn<T: LoopTask>(name: &str, mut task: T, on_error: ErrorHook) -> Result<Self, ServerError> {
        let shutdown = Shutdown::new();
        let running = Arc::new(AtomicBool::new(true));

        let thread_shutdown = shutdown.clone();
        let thread_running = Arc::clone(&running);
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _running = RunningGuard(thread_running);
                tracing::debug!(thread = %thread_name, "Loop started");

                while !thread_shutdown.is_triggered() {
                    let outcome = catch_unwind(AssertUnwindSafe(|| task.iterate(&thread_shutdown)));
                    let result = outcome.unwrap_or_else(|payload| {
                        Err(ServerError::LoopPanicked {
                            name: thread_name.clone(),
                            message: panic_message(payload.as_ref()),
                        })
                    });
                    if let Err(e) = result {
                        tracing::error!(thread = %thread_name, error = %e, "Loop iteration failed");
                        on_error(&e);
                        thread_shutdown.sleep(STOP_CHECK_INTERVAL);
                    }
                }

                task.on_stop();
                tracing::debug!(thread = %thread_name, "Loop stopped");
            })
            .map_err(|source| {
                running.store(false, Ordering::Release);
                ServerError::Spawn {
                    name: name.to_string(),
                    source,
                }
            })?;

        Ok(Self {
            name: name.to_string(),
            shutdown,
            running,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signal the loop and block until its thread exits. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(thread = %self.name, "Loop thread panicked");
            }
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        self.stop();
    }
}
