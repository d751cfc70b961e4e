//! Polling cadence for long-running video operations.

use std::time::Duration;

/// Delay grows linearly from `initial_delay` by `step` per poll, capped at
/// `max_delay`. Polling stops once `timeout` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub initial_delay: Duration,
    pub step: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            step: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollSchedule {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Delay before the given 1-based poll.
    pub fn delay_for(&self, poll: u32) -> Duration {
        let grown = self.initial_delay + self.step * poll.saturating_sub(1);
        grown.min(self.max_delay)
    }
}
