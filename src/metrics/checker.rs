//! Connection checkers evaluated by the background sweep
//!
//! A checker that rejects a connection causes the sweep to invalidate it.

use super::snapshot::StatsSnapshot;
use std::time::{Duration, Instant};

/// Predicate deciding whether a live connection may keep running
pub trait ConnectionChecker: Send + Sync {
    /// Name used in logs when this checker rejects a connection
    fn name(&self) -> &str;

    /// Return false to have the connection invalidated
    fn check(&self, stats: &StatsSnapshot, now: Instant) -> bool;
}

impl std::fmt::Debug for dyn ConnectionChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionChecker")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Rejects connections with no read or write for longer than `max_idle`
#[derive(Debug, Clone)]
pub struct InactivityChecker {
    max_idle: Duration,
}

impl InactivityChecker {
    #[must_use]
    pub const fn new(max_idle: Duration) -> Self {
        Self { max_idle }
    }

    #[must_use]
    pub const fn max_idle(&self) -> Duration {
        self.max_idle
    }
}

impl ConnectionChecker for InactivityChecker {
    fn name(&self) -> &str {
        "inactivity"
    }

    fn check(&self, stats: &StatsSnapshot, now: Instant) -> bool {
        stats.idle_for(now) <= self.max_idle
    }
}

/// Rejects connections older than `max_age`, regardless of activity
#[derive(Debug, Clone)]
pub struct MaxAgeChecker {
    max_age: Duration,
}

impl MaxAgeChecker {
    #[must_use]
    pub const fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    #[must_use]
    pub const fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl ConnectionChecker for MaxAgeChecker {
    fn name(&self) -> &str {
        "max-age"
    }

    fn check(&self, stats: &StatsSnapshot, now: Instant) -> bool {
        stats.age(now) <= self.max_age
    }
}
