use std::time::Duration;

use crate::error::DispatchError;

/// Retry schedule for primary delivery, independent of the transport so it
/// can be unit-tested without a network. Three attempts with doubling
/// backoff by default; permanent errors stop the schedule immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt should follow `attempt` (1-based) failing
    /// with `err`.
    pub fn should_retry(&self, attempt: u32, err: &DispatchError) -> bool {
        attempt < self.attempts && !err.is_permanent()
    }

    /// Delay before the attempt after `attempt` (1-based) fails.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
