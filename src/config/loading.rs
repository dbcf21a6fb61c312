//! Configuration loading from files and environment variables
//!
//! Environment variables take precedence over the file, so container
//! deployments can tune the monitor without editing it.

use anyhow::{Context, Result};
use std::time::Duration;

use super::types::MonitorConfig;
use crate::constants::env;
use crate::types::{SweepInterval, ValidationError};

/// Read an environment variable as an unsigned integer
///
/// Unset means None; set but unparsable is an error naming the variable.
fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("Invalid value '{}' for {}", value, key)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(anyhow::anyhow!("Cannot read {}: {}", key, e)),
    }
}

/// Apply `CONNMON_*` environment overrides to `config`
///
/// - `CONNMON_SWEEP_INTERVAL_MS` - sweep interval in milliseconds (must be > 0)
/// - `CONNMON_INACTIVITY_TIMEOUT_SECS` - enable the inactivity check
/// - `CONNMON_MAX_AGE_SECS` - enable the max-age check
pub fn apply_env_overrides(config: &mut MonitorConfig) -> Result<()> {
    if let Some(millis) = env_u64(env::SWEEP_INTERVAL_MS)? {
        config.sweep_interval = SweepInterval::from_millis(millis)
            .ok_or(ValidationError::ZeroSweepInterval)
            .with_context(|| format!("Invalid {}", env::SWEEP_INTERVAL_MS))?;
        tracing::info!(
            interval = %config.sweep_interval,
            "Using sweep interval from {}",
            env::SWEEP_INTERVAL_MS
        );
    }

    if let Some(secs) = env_u64(env::INACTIVITY_TIMEOUT_SECS)? {
        config.checks.inactivity_timeout = Some(Duration::from_secs(secs));
    }

    if let Some(secs) = env_u64(env::MAX_AGE_SECS)? {
        config.checks.max_age = Some(Duration::from_secs(secs));
    }

    Ok(())
}

/// Load configuration from a TOML file, with environment variable overrides
pub fn load_config(config_path: &str) -> Result<MonitorConfig> {
    let config_content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file '{}'", config_path))?;

    let mut config: MonitorConfig = toml::from_str(&config_content)
        .with_context(|| format!("Failed to parse config file '{}'", config_path))?;

    apply_env_overrides(&mut config)?;
    config.validate()?;

    Ok(config)
}

/// Build a configuration from defaults and environment variables only
pub fn load_config_from_env() -> Result<MonitorConfig> {
    let mut config = create_default_config();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Create a default configuration for demos and tests
#[must_use]
pub fn create_default_config() -> MonitorConfig {
    MonitorConfig::default()
}
