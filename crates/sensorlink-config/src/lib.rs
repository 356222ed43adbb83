//! Shared configuration for the sensorlink agent.
//!
//! TOML config, token resolution (env + keyring + plaintext), per-worker
//! preferences, and translation to `sensorlink_core::AgentConfig` and
//! `sensorlink_api::TransportConfig`. Also home to the file-backed
//! sensor registry.

mod registry;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use sensorlink_api::{RetryPolicy, TlsMode, TransportConfig};
use sensorlink_core::{AgentConfig, DEFAULT_CHANNEL_CAPACITY, ExternalIpConfig, WorkerPrefs};

pub use registry::FileRegistry;

const KEYRING_SERVICE: &str = "sensorlink";
const KEYRING_USER: &str = "api-token";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub agent: AgentSection,

    /// Per-worker preferences, keyed by worker ID.
    #[serde(default)]
    pub workers: HashMap<String, WorkerConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Endpoint that receives registrations and updates.
    #[serde(default = "default_url")]
    pub url: String,

    /// Bearer token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable holding the bearer token.
    pub token_env: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_wait")]
    pub retry_wait_ms: u64,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub insecure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            token_env: None,
            timeout_secs: default_timeout(),
            retry_count: default_retry_count(),
            retry_wait_ms: default_retry_wait(),
            ca_cert: None,
            insecure: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AgentSection {
    /// Script sensor directory. Defaults to `<config dir>/scripts`.
    pub scripts_dir: Option<PathBuf>,

    /// Sensor registry file. Defaults to `<data dir>/registry.toml`.
    pub registry_path: Option<PathBuf>,

    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,

    /// Run the external IP lookup.
    #[serde(default = "default_true")]
    pub external_ip: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            scripts_dir: None,
            registry_path: None,
            channel_capacity: default_capacity(),
            external_ip: true,
        }
    }
}

/// `[workers.<id>]` block.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub disabled: bool,

    /// Polling interval override, e.g. `"30s"`.
    pub interval: Option<String>,

    /// Jitter override, e.g. `"5s"`.
    pub jitter: Option<String>,
}

fn default_url() -> String {
    "http://localhost:8123/api/webhook/sensorlink".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_retry_count() -> u32 {
    5
}
fn default_retry_wait() -> u64 {
    5000
}
fn default_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_true() -> bool {
    true
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "sensorlink", "sensorlink")
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("sensorlink");
    p
}

/// Platform config directory.
pub fn config_dir() -> PathBuf {
    project_dirs().map_or_else(dirs_fallback, |d| d.config_dir().to_path_buf())
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default script sensor directory.
pub fn default_scripts_dir() -> PathBuf {
    config_dir().join("scripts")
}

/// Default registry file.
pub fn default_registry_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("registry.toml"),
        |d| d.data_dir().join("registry.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from `path` + environment.
///
/// `SENSORLINK_SERVER__URL=...` overrides `server.url`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SENSORLINK_").split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Write a default config to `path` unless one exists. Returns whether a
/// file was written.
pub fn init_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    save_config_to(&Config::default(), path)?;
    Ok(true)
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token: `token_env` variable, then the system
/// keyring, then plaintext config. `None` when nothing is configured.
pub fn resolve_token(server: &ServerConfig) -> Option<SecretString> {
    // 1. Env var named by token_env
    if let Some(ref env_name) = server.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    server.token.clone().map(SecretString::from)
}

/// Store the bearer token in the system keyring.
pub fn store_token(token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: "server.url".into(),
        reason: format!("invalid URL {raw:?}: {e}"),
    })
}

fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid duration {raw:?}: {e}"),
    })
}

/// Build the HTTP transport settings. `token` usually comes from
/// [`resolve_token`].
pub fn to_transport_config(cfg: &Config, token: Option<SecretString>) -> TransportConfig {
    let server = &cfg.server;

    let tls = if server.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = server.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    TransportConfig {
        tls,
        timeout: Duration::from_secs(server.timeout_secs),
        retry: RetryPolicy {
            count: server.retry_count,
            wait: Duration::from_millis(server.retry_wait_ms),
            ..RetryPolicy::default()
        },
        token,
    }
}

/// Build the core agent settings.
pub fn to_agent_config(cfg: &Config) -> Result<AgentConfig, ConfigError> {
    if cfg.agent.channel_capacity == 0 {
        return Err(ConfigError::Validation {
            field: "agent.channel_capacity".into(),
            reason: "must be at least 1".into(),
        });
    }

    let mut agent = AgentConfig::new(parse_url(&cfg.server.url)?);
    agent.channel_capacity = cfg.agent.channel_capacity;
    agent.scripts_dir = Some(
        cfg.agent
            .scripts_dir
            .clone()
            .unwrap_or_else(default_scripts_dir),
    );
    agent.external_ip = cfg.agent.external_ip.then(ExternalIpConfig::default);
    Ok(agent)
}

/// Translate a `[workers.<id>]` block.
pub fn worker_prefs(id: &str, worker: &WorkerConfig) -> Result<WorkerPrefs, ConfigError> {
    let interval = worker
        .interval
        .as_deref()
        .map(|raw| parse_duration(&format!("workers.{id}.interval"), raw))
        .transpose()?;
    let jitter = worker
        .jitter
        .as_deref()
        .map(|raw| parse_duration(&format!("workers.{id}.jitter"), raw))
        .transpose()?;

    Ok(WorkerPrefs {
        disabled: worker.disabled,
        interval,
        jitter,
    })
}

/// Translate every `[workers.*]` block.
pub fn all_worker_prefs(cfg: &Config) -> Result<HashMap<String, WorkerPrefs>, ConfigError> {
    cfg.workers
        .iter()
        .map(|(id, w)| Ok((id.clone(), worker_prefs(id, w)?)))
        .collect()
}

/// Registry file path from config, or the default.
pub fn registry_path(cfg: &Config) -> PathBuf {
    cfg.agent
        .registry_path
        .clone()
        .unwrap_or_else(default_registry_path)
}
