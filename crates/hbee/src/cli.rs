//! Clap derive structures for the `hbee` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hbee -- talk to HBEE refrigeration controllers over MQTT
#[derive(Debug, Parser)]
#[command(
    name = "hbee",
    version,
    about = "Monitor and command HBEE refrigeration controllers",
    long_about = "Connects to the HBEE message broker, streams validated device\n\
        telemetry, and sends controller commands to the canonical\n\
        HBEE/{user}/TC/{device}/SER topic.",
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
    /// Broker profile to use
    #[arg(long, short = 'p', env = "HBEE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Broker URL (overrides profile)
    #[arg(long, short = 'b', env = "HBEE_BROKER", global = true)]
    pub broker: Option<String>,

    /// Account id to act for (overrides profile)
    #[arg(long, short = 'u', env = "HBEE_USER", global = true)]
    pub user: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HBEE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Broker connect timeout in seconds (overrides profile)
    #[arg(long, env = "HBEE_TIMEOUT", global = true)]
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream validated device messages
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Send a command to one controller
    #[command(alias = "s")]
    Send(SendArgs),

    /// Validate topics and payloads offline
    Check(CheckArgs),

    /// Controller parameter table and tenths conversion
    Param(ParamArgs),

    /// Query backend readiness
    Status(StatusArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Device to watch (repeatable; defaults to the profile's devices)
    #[arg(long, short = 'd')]
    pub device: Vec<String>,

    /// Owner of the watched device when it isn't the profile user
    #[arg(long, requires = "device")]
    pub owner: Option<String>,

    /// Skip the settings/status requests sent after connecting
    #[arg(long)]
    pub no_sync: bool,

    /// Skip the backend readiness probe before connecting
    #[arg(long)]
    pub no_probe: bool,

    /// Exit after this many messages
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Exit after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Print validation statistics on exit
    #[arg(long)]
    pub stats: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SEND
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Target device id (UUID or 12-digit hardware address)
    pub device: String,

    /// Owner of the device when it isn't the profile user
    #[arg(long)]
    pub owner: Option<String>,

    /// Wait up to this many seconds for the device's reply
    #[arg(long, short = 'w', value_name = "SECS")]
    pub wait: Option<u64>,

    #[command(subcommand)]
    pub command: SendCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum SendCommand {
    /// Request the parameter dump (GET&type=1)
    Settings,

    /// Request live status (GET&type=2)
    Status,

    /// Start or stop a forced defrost
    Defrost { state: Switch },

    /// Drive a relay output
    Output {
        /// Output type, 1-99
        #[arg(value_parser = clap::value_parser!(u8).range(1..=99))]
        kind: u8,
        /// Output channel, 1-99
        #[arg(value_parser = clap::value_parser!(u8).range(1..=99))]
        channel: u8,
        state: Switch,
    },

    /// Send a raw command string, e.g. "ACT&name=forcedef&value=1"
    Raw { command: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CHECK
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(subcommand)]
    pub command: CheckCommand,
}

#[derive(Debug, Subcommand)]
pub enum CheckCommand {
    /// Parse a topic against the HBEE grammar
    Topic { topic: String },

    /// Validate a message body ("-" reads stdin)
    Payload { payload: String },

    /// Check whether a subscription filter matches a topic
    Match { filter: String, topic: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PARAM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ParamArgs {
    #[command(subcommand)]
    pub command: ParamCommand,
}

#[derive(Debug, Subcommand)]
pub enum ParamCommand {
    /// List parameters p01-p16 with their accepted ranges
    #[command(alias = "ls")]
    List,

    /// Convert a tenths wire value to display form (235 -> 23.5)
    Decode {
        #[arg(allow_hyphen_values = true)]
        raw: String,
    },

    /// Convert a display value to tenths (23.5 -> 235)
    Encode {
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  STATUS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Readiness endpoint (overrides profile status_url)
    #[arg(long)]
    pub url: Option<String>,

    /// Keep probing until ready or retries run out
    #[arg(long)]
    pub wait: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key, e.g. "broker" or "devices"
        key: String,

        /// Value to set (comma-separated for lists)
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the broker password in the system keyring
    SetPassword,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
