//! Clap derive structures for the `sensorlink` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sensorlink -- ship sensor readings to a remote state sink
#[derive(Debug, Parser)]
#[command(
    name = "sensorlink",
    version,
    about = "Collect sensor readings and ship them to a remote state sink",
    long_about = "Runs sensor workers and user scripts, merges their readings, and\n\
        registers or updates each sensor on a remote REST endpoint.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SENSORLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Server endpoint URL (overrides config)
    #[arg(long, short = 's', env = "SENSORLINK_URL", global = true)]
    pub server: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SENSORLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides config)
    #[arg(long, env = "SENSORLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the agent until interrupted
    Run(RunArgs),

    /// Inspect and test script sensors
    #[command(alias = "script")]
    Scripts(ScriptsArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Collect and send one snapshot from every worker, then exit
    #[arg(long)]
    pub once: bool,

    /// Do not run script sensors
    #[arg(long)]
    pub no_scripts: bool,

    /// Do not run the external IP lookup
    #[arg(long)]
    pub no_external_ip: bool,

    /// Script directory (overrides config)
    #[arg(long)]
    pub scripts_dir: Option<PathBuf>,
}

// ── Scripts ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScriptsArgs {
    #[command(subcommand)]
    pub command: ScriptsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ScriptsCommand {
    /// List discovered scripts and their schedules
    #[command(alias = "ls")]
    List {
        /// Script directory (overrides config)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Run one script now and show the sensors it reports
    Run {
        /// Script path
        path: PathBuf,

        /// Arguments passed to the script
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a default config file if none exists
    Init,

    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Store the server token in the system keyring
    SetToken {
        /// Token value
        token: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
