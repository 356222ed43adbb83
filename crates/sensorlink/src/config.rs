//! CLI configuration: thin wrapper around `sensorlink_config`.
//!
//! Loads the config file named by `--config` (or the platform default)
//! and applies `GlobalOpts` overrides such as `--server` and `--timeout`.

use std::path::PathBuf;
use std::time::Duration;

use sensorlink_api::TransportConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use sensorlink_config::{Config, config_path};

/// Config file in effect: `--config` or the platform default.
pub fn effective_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load config from file + env, then apply CLI flag overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = sensorlink_config::load_config_from(&effective_path(global))?;
    if let Some(ref url) = global.server {
        cfg.server.url.clone_from(url);
    }
    if let Some(timeout) = global.timeout {
        cfg.server.timeout_secs = timeout;
    }
    Ok(cfg)
}

/// Transport settings with the token resolved through the credential chain.
pub fn transport(cfg: &Config) -> Result<TransportConfig, CliError> {
    if cfg.server.timeout_secs == 0 {
        return Err(CliError::Validation {
            field: "timeout".into(),
            reason: "must be at least 1 second".into(),
        });
    }
    let token = sensorlink_config::resolve_token(&cfg.server);
    let mut transport = sensorlink_config::to_transport_config(cfg, token);
    transport.timeout = Duration::from_secs(cfg.server.timeout_secs);
    Ok(transport)
}
