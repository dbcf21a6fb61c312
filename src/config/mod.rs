//! Configuration module
//!
//! Monitor settings are read from a TOML file, overridden by `CONNMON_*`
//! environment variables, and validated before use.

mod defaults;
mod loading;
mod types;
mod validation;

pub use loading::{apply_env_overrides, create_default_config, load_config, load_config_from_env};
pub use types::{ChecksConfig, MonitorConfig, ProviderConfig};

pub use defaults::{connect_timeout, sweep_interval};
