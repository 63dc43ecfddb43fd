//! Clap derive structures for the `hearth` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

use hearth_core::{AwayState, HvacMode};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hearth -- control cloud thermostats from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "hearth",
    version,
    about = "Control cloud thermostats from the command line",
    long_about = "Sign in once, then read and change thermostat setpoints, HVAC mode,\n\
        and home/away state. Live updates stream over a persistent feed.",
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
    /// Profile to use
    #[arg(long, short = 'p', env = "HEARTH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HEARTH_OUTPUT",
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

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "HEARTH_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides the profile)
    #[arg(long, env = "HEARTH_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON, one document per line
    JsonCompact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authorize this profile and store the credential
    Login(LoginArgs),

    /// Forget the stored credential
    Logout,

    /// Show thermostats and their current state
    #[command(alias = "st")]
    Status,

    /// Stream state changes until interrupted
    Watch(WatchArgs),

    /// Change a setpoint or HVAC mode
    Set(SetArgs),

    /// Show or change home/away
    Away(AwayArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Login / Watch ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Authorization code or full redirect URL (skips the prompt)
    #[arg(long)]
    pub code: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Exit after the first full state
    #[arg(long)]
    pub once: bool,
}

// ── Set ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Thermostat id or name (defaults to the first thermostat)
    #[arg(long, short = 'd', global = true)]
    pub device: Option<String>,

    #[command(subcommand)]
    pub command: SetCommand,
}

#[derive(Debug, Subcommand)]
pub enum SetCommand {
    /// Set the single target temperature (°F)
    #[command(alias = "temperature")]
    Temp { value: i32 },

    /// Set the heat-cool range (°F)
    Range { low: i32, high: i32 },

    /// Set the HVAC mode
    Mode { mode: ModeArg },

    /// Nudge a setpoint by a number of degrees
    Step {
        #[arg(allow_negative_numbers = true)]
        delta: i32,

        /// Which setpoint to move
        #[arg(long, short = 'b', default_value = "target")]
        bound: BoundArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Heat,
    Cool,
    HeatCool,
    Off,
}

impl From<ModeArg> for HvacMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Heat => Self::Heat,
            ModeArg::Cool => Self::Cool,
            ModeArg::HeatCool => Self::HeatCool,
            ModeArg::Off => Self::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BoundArg {
    /// Single setpoint (heat or cool)
    Target,
    /// Low bound of the heat-cool range
    Low,
    /// High bound of the heat-cool range
    High,
}

// ── Away ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AwayArgs {
    /// New state; toggles when omitted
    pub state: Option<AwayArg>,

    /// Structure id or name (defaults to the first thermostat's)
    #[arg(long, short = 's')]
    pub structure: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AwayArg {
    Home,
    Away,
}

impl From<AwayArg> for AwayState {
    fn from(state: AwayArg) -> Self {
        match state {
            AwayArg::Home => Self::Home,
            AwayArg::Away => Self::Away,
        }
    }
}

// ── Config / Completions ─────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive profile setup
    Init,
    /// Print the configuration with secrets masked
    Show,
    /// Print the config file path
    Path,
    /// List profile names
    Profiles,
    /// Store a profile's client secret in the system keyring
    SetSecret,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
