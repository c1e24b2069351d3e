use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// Backoff between re-attempts of a pipeline stage. Zero backoff means
/// re-attempts happen immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
        }
    }

    pub fn immediate() -> Self {
        Self::new(0, 0)
    }

    /// Delay before re-attempt number `attempt` (1-based): doubles each time,
    /// capped at the max backoff.
    pub fn backoff(&self, attempt: usize) -> Duration {
        if attempt == 0 || self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(16) as u32;
        std::cmp::min(self.initial_backoff * 2u32.pow(exponent), self.max_backoff)
    }

    pub async fn wait(&self, stage: &str, attempt: usize) {
        let delay = self.backoff(attempt);
        if delay.is_zero() {
            return;
        }
        debug!(
            stage,
            attempt,
            backoff_ms = delay.as_millis() as u64,
            "waiting before stage retry"
        );
        sleep(delay).await;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_with_cap() {
        let policy = RetryPolicy::new(100, 350);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn immediate_never_waits() {
        let policy = RetryPolicy::immediate();
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(5), Duration::ZERO);
    }
}
