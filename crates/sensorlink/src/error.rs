//! CLI error types with miette diagnostics.
//!
//! Maps library errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use sensorlink_config::ConfigError;
use sensorlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the server")]
    #[diagnostic(
        code(sensorlink::connection_failed),
        help(
            "Check that the server is running and the URL is right.\n\
             Show the configured URL with: sensorlink config show"
        )
    )]
    ConnectionFailed {
        #[source]
        source: sensorlink_api::Error,
    },

    #[error("Server rejected the token (HTTP {status})")]
    #[diagnostic(
        code(sensorlink::auth_failed),
        help(
            "Store a valid token with: sensorlink config set-token <TOKEN>\n\
             Or point server.token_env at a variable holding it."
        )
    )]
    AuthFailed { status: u16 },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(sensorlink::timeout),
        help("Increase timeout with --timeout or check server responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error(transparent)]
    #[diagnostic(code(sensorlink::api))]
    Api(sensorlink_api::Error),

    // ── Scripts ──────────────────────────────────────────────────────
    #[error("Script directory {path} does not exist")]
    #[diagnostic(
        code(sensorlink::no_scripts_dir),
        help("Create it, or pass another directory with --dir.")
    )]
    NoScriptsDir { path: String },

    #[error("Script '{path}' not found")]
    #[diagnostic(
        code(sensorlink::unknown_script),
        help("Run: sensorlink scripts list to see discovered scripts")
    )]
    UnknownScript { path: String },

    #[error("Script '{path}' failed: {reason}")]
    #[diagnostic(
        code(sensorlink::script_failed),
        help(
            "A script must exit 0 and print JSON, YAML or TOML with a\n\
             `schedule` and a list of `sensors`."
        )
    )]
    ScriptFailed { path: String, reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sensorlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(sensorlink::config),
        help("Create a default config with: sensorlink config init")
    )]
    Config(Box<ConfigError>),

    #[error(transparent)]
    #[diagnostic(code(sensorlink::core))]
    Core(CoreError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render config: {0}")]
    #[diagnostic(code(sensorlink::serialize))]
    Serialize(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NoScriptsDir { .. } | Self::UnknownScript { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Library error mapping ────────────────────────────────────────────

impl From<sensorlink_api::Error> for CliError {
    fn from(err: sensorlink_api::Error) -> Self {
        if err.is_unauthorized() {
            return Self::AuthFailed {
                status: err.status().unwrap_or(401),
            };
        }
        match err {
            sensorlink_api::Error::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            e @ sensorlink_api::Error::Transport(_) => Self::ConnectionFailed { source: e },
            other => Self::Api(other),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownScript { path } => Self::UnknownScript {
                path: path.display().to_string(),
            },
            CoreError::ScriptExecution { path, reason } => Self::ScriptFailed {
                path: path.display().to_string(),
                reason,
            },
            CoreError::ParseSchedule { expr, reason } => Self::Validation {
                field: "schedule".into(),
                reason: format!("{expr:?}: {reason}"),
            },
            other => Self::Core(other),
        }
    }
}
