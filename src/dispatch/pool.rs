//! Bounded worker pool.
//!
//! Producers call [`WorkerPool::submit`]; when the queue is at capacity they
//! wait up to the enqueue timeout for space and are then rejected through
//! [`MessageHandler::on_reject`]. Workers poll the lock-free queue and back
//! off linearly while it is empty.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;

use crate::config::schema::DispatchConfig;
use crate::lifecycle::shutdown::{Shutdown, STOP_CHECK_INTERVAL};
use crate::observability::metrics;

use super::backoff::IdleBackoff;
use super::handler::{panic_message, HandlerError, MessageHandler};
use super::DispatchError;

/// Point-in-time pool counters. Reset by [`WorkerPool::stop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub submitted: u64,
    pub queue_len: usize,
    pub rejected: u64,
    pub max_queue_len: usize,
    pub errors: u64,
}

struct Inner<T> {
    queue: SegQueue<T>,
    handler: Arc<dyn MessageHandler<T>>,
    shutdown: Shutdown,
    running: AtomicBool,
    queue_len: AtomicUsize,
    max_queue_len: AtomicUsize,
    submitted: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
    capacity: usize,
    enqueue_timeout: Duration,
    max_idle_backoff: Duration,
}

impl<T: 'static> Inner<T> {
    fn reject(&self, task: T) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::record_dispatch_rejected();
        if catch_unwind(AssertUnwindSafe(|| self.handler.on_reject(task))).is_err() {
            tracing::error!("Reject callback panicked");
        }
    }

    fn process(&self, task: T) {
        let error = match catch_unwind(AssertUnwindSafe(|| self.handler.handle(&task))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => HandlerError::Failed(e),
            Err(payload) => HandlerError::Panicked(panic_message(payload.as_ref())),
        };

        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_dispatch_error();
        if catch_unwind(AssertUnwindSafe(|| self.handler.on_error(&task, &error))).is_err() {
            tracing::error!(error = %error, "Error callback panicked");
        }
    }

    /// A task left the queue. Saturates at zero: a submit racing `stop`
    /// can push a task the counter reset no longer accounts for.
    fn release_slot(&self) {
        let _ = self
            .queue_len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn reset_counters(&self) {
        self.queue_len.store(0, Ordering::Release);
        self.max_queue_len.store(0, Ordering::Relaxed);
        self.submitted.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

fn run_worker<T: 'static>(inner: Arc<Inner<T>>) {
    let mut backoff = IdleBackoff::new(inner.max_idle_backoff);
    while !inner.shutdown.is_triggered() {
        match inner.queue.pop() {
            Some(task) => {
                inner.release_slot();
                backoff.reset();
                inner.process(task);
            }
            None => {
                inner.shutdown.sleep(backoff.next_delay());
            }
        }
    }
}

/// Fixed set of named worker threads draining a bounded queue.
pub struct WorkerPool<T> {
    name: String,
    workers: usize,
    inner: Arc<Inner<T>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(name: &str, config: &DispatchConfig, handler: Arc<dyn MessageHandler<T>>) -> Self {
        Self {
            name: name.to_string(),
            workers: config.workers,
            inner: Arc::new(Inner {
                queue: SegQueue::new(),
                handler,
                shutdown: Shutdown::new(),
                running: AtomicBool::new(false),
                queue_len: AtomicUsize::new(0),
                max_queue_len: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                errors: AtomicU64::new(0),
                capacity: config.queue_capacity,
                enqueue_timeout: config.enqueue_timeout(),
                max_idle_backoff: config.max_idle_backoff(),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Stop any previous run, then spawn the workers.
    pub fn start(&self) -> Result<(), DispatchError> {
        self.stop();

        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.shutdown.reset();
        self.inner.running.store(true, Ordering::Release);

        for index in 0..self.workers {
            let inner = Arc::clone(&self.inner);
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", self.name))
                .spawn(move || run_worker(inner));
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(source) => {
                    drop(threads);
                    self.stop();
                    return Err(DispatchError::Spawn { index, source });
                }
            }
        }

        tracing::info!(pool = %self.name, workers = self.workers, capacity = self.inner.capacity, "Worker pool started");
        Ok(())
    }

    /// Stop and join every worker, rejecting tasks still queued. Idempotent.
    pub fn stop(&self) {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        let was_running = self.inner.running.swap(false, Ordering::AcqRel);
        self.inner.shutdown.trigger();

        for handle in threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!(pool = %self.name, "Worker thread panicked");
            }
        }

        let mut leftover = 0;
        while let Some(task) = self.inner.queue.pop() {
            self.inner.reject(task);
            leftover += 1;
        }
        self.inner.reset_counters();

        if was_running {
            tracing::info!(pool = %self.name, rejected_on_stop = leftover, "Worker pool stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Queue a task, waiting up to the enqueue timeout for space.
    ///
    /// The bound is soft: producers that pass the capacity check together
    /// may overshoot it by their number.
    pub fn submit(&self, task: T) -> Result<(), DispatchError> {
        let inner = &self.inner;
        if !self.is_running() {
            inner.reject(task);
            return Err(DispatchError::NotRunning);
        }

        let deadline = Instant::now() + inner.enqueue_timeout;
        while inner.queue_len.load(Ordering::Acquire) >= inner.capacity {
            let now = Instant::now();
            if now >= deadline || inner.shutdown.is_triggered() {
                inner.reject(task);
                return Err(DispatchError::Rejected {
                    capacity: inner.capacity,
                });
            }
            inner.shutdown.sleep((deadline - now).min(STOP_CHECK_INTERVAL));
        }

        let len = inner.queue_len.fetch_add(1, Ordering::AcqRel) + 1;
        inner.max_queue_len.fetch_max(len, Ordering::Relaxed);
        inner.submitted.fetch_add(1, Ordering::Relaxed);
        inner.queue.push(task);
        metrics::record_dispatch_submitted(len);
        Ok(())
    }

    pub fn stats(&self) -> DispatchStats {
        let inner = &self.inner;
        DispatchStats {
            submitted: inner.submitted.load(Ordering::Relaxed),
            queue_len: inner.queue_len.load(Ordering::Acquire),
            rejected: inner.rejected.load(Ordering::Relaxed),
            max_queue_len: inner.max_queue_len.load(Ordering::Relaxed),
            errors: inner.errors.load(Ordering::Relaxed),
        }
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.shutdown.trigger();
        let threads = self.threads.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }
}
