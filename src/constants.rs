//! Constants used throughout the connection monitor
//!
//! Centralizes tunables and environment variable names.

use std::time::Duration;

/// Background sweep tunables
pub mod sweep {
    use super::Duration;

    /// Default pause between sweep passes in milliseconds
    pub const DEFAULT_INTERVAL_MS: u64 = 1000;

    /// Default pause between sweep passes
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(DEFAULT_INTERVAL_MS);

    /// Sweep passes that reclaim or invalidate at least this many connections
    /// are logged at info level instead of debug
    pub const NOISY_PASS_THRESHOLD: usize = 64;
}

/// Connection provider tunables
pub mod provider {
    use super::Duration;

    /// Upper bound on a single TCP dial
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Environment variables that override file configuration
pub mod env {
    /// Sweep interval in milliseconds
    pub const SWEEP_INTERVAL_MS: &str = "CONNMON_SWEEP_INTERVAL_MS";

    /// Invalidate connections idle for longer than this many seconds
    pub const INACTIVITY_TIMEOUT_SECS: &str = "CONNMON_INACTIVITY_TIMEOUT_SECS";

    /// Invalidate connections older than this many seconds
    pub const MAX_AGE_SECS: &str = "CONNMON_MAX_AGE_SECS";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval_matches_millis() {
        assert_eq!(
            sweep::DEFAULT_INTERVAL.as_millis() as u64,
            sweep::DEFAULT_INTERVAL_MS
        );
    }

    #[test]
    fn test_env_names_are_prefixed() {
        for name in [
            env::SWEEP_INTERVAL_MS,
            env::INACTIVITY_TIMEOUT_SECS,
            env::MAX_AGE_SECS,
        ] {
            assert!(name.starts_with("CONNMON_"));
        }
    }
}
