//! Configuration validation
//!
//! Zero sweep intervals, empty hosts and zero ports are already rejected by
//! the value types. This checks what remains.

use anyhow::Result;
use std::time::Duration;

use super::types::MonitorConfig;

impl MonitorConfig {
    /// Validate configuration for correctness
    ///
    /// - Enabled checks must have a non-zero limit
    /// - A provider connect timeout must be non-zero
    ///
    /// An inactivity timeout shorter than the sweep interval is allowed but
    /// logged, since it is only ever enforced once per pass.
    pub fn validate(&self) -> Result<()> {
        if self.checks.inactivity_timeout == Some(Duration::ZERO) {
            return Err(anyhow::anyhow!(
                "checks.inactivity_timeout_secs must be greater than 0 (omit it to disable the check)"
            ));
        }

        if self.checks.max_age == Some(Duration::ZERO) {
            return Err(anyhow::anyhow!(
                "checks.max_age_secs must be greater than 0 (omit it to disable the check)"
            ));
        }

        if let Some(provider) = &self.provider {
            if provider.connect_timeout.is_zero() {
                return Err(anyhow::anyhow!(
                    "provider.connect_timeout_ms must be greater than 0"
                ));
            }
        }

        if let Some(timeout) = self.checks.inactivity_timeout {
            if timeout < self.sweep_interval.as_duration() {
                tracing::warn!(
                    "Inactivity timeout {:?} is shorter than the sweep interval {}; \
                     idle connections are only detected once per sweep pass",
                    timeout,
                    self.sweep_interval
                );
            }
        }

        Ok(())
    }
}
