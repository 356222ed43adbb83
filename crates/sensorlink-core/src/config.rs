// ── Runtime agent configuration ──
//
// Describes where to send sensor data and which built-in workers to run.
// Core never reads config files; the binary resolves its settings into an
// `AgentConfig` and hands it in.

use std::path::PathBuf;

use url::Url;

use crate::sensors::ExternalIpConfig;

/// Default capacity of the merged worker stream.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Endpoint every registration and update is posted to.
    pub server_url: Url,
    /// Buffer between the fan-in stage and the dispatcher.
    pub channel_capacity: usize,
    /// Directory scanned for script sensors. `None` disables the script worker.
    pub scripts_dir: Option<PathBuf>,
    /// External address lookup. `None` disables it.
    pub external_ip: Option<ExternalIpConfig>,
}

impl AgentConfig {
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            scripts_dir: None,
            external_ip: None,
        }
    }
}
