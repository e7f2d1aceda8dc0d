//! Clap derive structures for the `riftlink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// riftlink -- watch a locally running game client
#[derive(Debug, Parser)]
#[command(
    name = "riftlink",
    version,
    about = "Monitor a locally running game client's control API",
    long_about = "Discovers the launcher and game client on this machine, tracks who is\n\
        logged in, and keeps the account snapshot in sync with the account backend.",
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
    #[arg(long, env = "RIFTLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the monitor and print every event until Ctrl-C
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Discover local API credentials of a running client
    #[command(alias = "creds")]
    Credentials(CredentialsArgs),

    /// Sample processes and auth once and print the derived state
    Status,

    /// Manage the configuration file
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Print events as JSON lines instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Target {
    /// The launcher (Riot Client)
    #[default]
    Riot,
    /// The game client (League Client)
    League,
}

#[derive(Debug, Args)]
pub struct CredentialsArgs {
    /// Which client to inspect
    #[arg(long, short = 't', default_value = "riot")]
    pub target: Target,

    /// Print the auth token instead of redacting it
    #[arg(long)]
    pub show_token: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (secrets masked)
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
