//! Shutdown coordination for the server threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep; every wait re-checks the flag this often.
pub const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Cloneable stop flag shared by a loop thread and its owner.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every holder of this flag to stop.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Clear the flag before a restart.
    pub fn reset(&self) {
        self.triggered.store(false, Ordering::Release);
    }

    /// Sleep for `duration` in short slices, returning early on trigger.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_runs_to_completion_when_untriggered() {
        let shutdown = Shutdown::new();
        let start = Instant::now();
        assert!(shutdown.sleep(Duration::from_millis(25)));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn trigger_interrupts_sleep() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.trigger();
        });

        let start = Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
        waker.join().unwrap();

        shutdown.reset();
        assert!(!shutdown.is_triggered());
    }
}
