//! # Fibonacci Backoff
//!
//! Requeue delays for AzureClusters whose reconcile failed terminally or
//! could not reach the Kubernetes API. Delays grow along the Fibonacci
//! sequence in whole minutes: 1m, 1m, 2m, 3m, 5m, 8m, then 10m (max).

use std::time::Duration;

/// Fibonacci backoff calculator, stepped once per consecutive failure
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min_minutes` and capped at `max_minutes`
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Current delay; advances the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = Duration::from_secs(self.current_minutes * 60);
        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = std::cmp::min(next_minutes, self.max_minutes);
        delay
    }

    /// Start over after a success
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(backoff: &mut FibonacciBackoff) -> u64 {
        backoff.next_backoff().as_secs() / 60
    }

    #[test]
    fn test_sequence_is_capped() {
        let mut backoff = FibonacciBackoff::default();
        let seq: Vec<u64> = (0..9).map(|_| minutes(&mut backoff)).collect();
        assert_eq!(seq, vec![1, 1, 2, 3, 5, 8, 10, 10, 10]);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::default();
        for _ in 0..4 {
            backoff.next_backoff();
        }

        backoff.reset();

        assert_eq!(minutes(&mut backoff), 1);
        assert_eq!(minutes(&mut backoff), 1);
        assert_eq!(minutes(&mut backoff), 2);
    }
}
