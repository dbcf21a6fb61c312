//! Point-in-time copy of a connection's counters
//!
//! Taken under the connection's stats lock and inspected without it, so
//! checkers and callers never hold a connection lock while doing their work.

use std::time::{Duration, Instant};

/// Immutable copy of [`ConnectionStats`](super::ConnectionStats) counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub created_at: Instant,
    pub total_read: u64,
    pub total_write: u64,
    pub last_read_at: Option<Instant>,
    pub last_write_at: Option<Instant>,
    pub last_read_size: usize,
    pub last_write_size: usize,
    /// Names of collectors holding state for the connection, sorted
    pub metric_names: Vec<String>,
}

impl StatsSnapshot {
    /// Most recent read, write, or the creation time if there was neither
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        [self.last_read_at, self.last_write_at]
            .into_iter()
            .flatten()
            .fold(self.created_at, Instant::max)
    }

    /// Time since the last activity, saturating at zero
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    /// Time since the connection was created, saturating at zero
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Bytes moved in both directions
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_read + self.total_write
    }
}
