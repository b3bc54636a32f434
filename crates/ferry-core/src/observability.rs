use serde::{Deserialize, Serialize};

/// Point-in-time view of one task group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroupCounts {
    pub remaining: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Attempts sent back to remaining by fail-over.
    pub retried: usize,
}

impl TaskGroupCounts {
    /// Tasks not yet finished either way.
    pub fn unfinished(&self) -> usize {
        self.remaining + self.running
    }
}
