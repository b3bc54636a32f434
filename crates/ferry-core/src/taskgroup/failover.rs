//! Fail-over policy: decides whether a failed task goes back to the queue.

use std::time::Duration;

/// Retry policy for failed task attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPolicy {
    /// Attempts allowed after the first one.
    pub retry_max_count: u32,

    /// Pause between shutting a failed attempt down and requeueing it.
    pub retry_interval: Duration,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            retry_max_count: 1,
            retry_interval: Duration::from_millis(1000),
        }
    }
}

impl FailoverPolicy {
    /// Should a failed task be retried?
    ///
    /// # Arguments
    /// * `support_fail_over` - whether the writer tolerates a replayed attempt.
    /// * `attempt_count` - attempts already made (1 after the first failure).
    ///
    /// With `retry_max_count = 2` a task runs at most 3 times.
    pub fn should_retry(&self, support_fail_over: bool, attempt_count: u32) -> bool {
        support_fail_over && attempt_count <= self.retry_max_count
    }
}
