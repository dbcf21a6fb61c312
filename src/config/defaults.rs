//! Default values for configuration fields
//!
//! Used by serde when a field is missing from the file.

use crate::constants;
use crate::types::SweepInterval;
use std::time::Duration;

/// Default pause between sweep passes
#[inline]
pub fn sweep_interval() -> SweepInterval {
    SweepInterval::DEFAULT
}

/// Default upper bound on a single TCP dial
#[inline]
pub fn connect_timeout() -> Duration {
    constants::provider::CONNECT_TIMEOUT
}
