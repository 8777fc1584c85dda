//! Doubling wait schedule used while polling for a synchronous result.

use crate::config::SyncConfig;
use std::time::Duration;

/// Wait schedule: `min`, `2 * min`, ... up to `max`, then `max` forever.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(SyncConfig::MIN_WAIT, SyncConfig::MAX_WAIT)
    }
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            current: min.min(max),
            max,
        }
    }

    /// The wait to use now; advances the schedule.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        wait
    }

    /// Longest single wait this schedule produces.
    pub fn max_wait(&self) -> Duration {
        self.max
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_wait())
    }
}
