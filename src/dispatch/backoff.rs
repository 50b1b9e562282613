//! Linear backoff for idle workers.

use std::time::Duration;

/// Calculate the sleep after `idle_polls` consecutive empty polls.
///
/// Grows by `step_ms` per poll and saturates at `max_ms`.
pub fn calculate_idle_backoff(idle_polls: u32, step_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = step_ms.saturating_mul(u64::from(idle_polls));
    Duration::from_millis(delay_ms.min(max_ms))
}

/// Per-worker idle state.
#[derive(Debug, Clone)]
pub struct IdleBackoff {
    idle_polls: u32,
    max_ms: u64,
}

impl IdleBackoff {
    const STEP_MS: u64 = 1;

    pub fn new(max: Duration) -> Self {
        Self {
            idle_polls: 0,
            max_ms: u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(Self::STEP_MS),
        }
    }

    /// Record an empty poll and return how long to sleep.
    pub fn next_delay(&mut self) -> Duration {
        self.idle_polls = self.idle_polls.saturating_add(1);
        calculate_idle_backoff(self.idle_polls, Self::STEP_MS, self.max_ms)
    }

    /// Work arrived; start over.
    pub fn reset(&mut self) {
        self.idle_polls = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_idle_backoff(0, 1, 100), Duration::ZERO);
        assert_eq!(calculate_idle_backoff(7, 1, 100), Duration::from_millis(7));
        assert_eq!(calculate_idle_backoff(500, 1, 100), Duration::from_millis(100));
        assert_eq!(calculate_idle_backoff(u32::MAX, u64::MAX, 100), Duration::from_millis(100));
    }

    #[test]
    fn grows_per_idle_poll_and_resets() {
        let mut backoff = IdleBackoff::new(Duration::from_millis(3));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2));
        assert_eq!(backoff.next_delay(), Duration::from_millis(3));
        assert_eq!(backoff.next_delay(), Duration::from_millis(3));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
    }
}
