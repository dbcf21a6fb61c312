//! Identifier and validated value types shared across the crate

pub mod config;
pub mod validated;

pub use config::{Port, SweepInterval, millis_serde, option_duration_serde};
pub use validated::{ConfigPath, HostName, ProviderName, ValidationError};

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity under which an instrumented connection is registered with its monitor
///
/// IDs are allocated from a process-wide counter, so two live connections never
/// share one. The registry still tolerates reuse of an ID whose previous owner died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next unused connection ID
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value (tests and diagnostics)
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the underlying value
    #[must_use]
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}
