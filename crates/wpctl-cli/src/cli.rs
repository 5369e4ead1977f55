//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Parser)]
#[command(name = "wpctl")]
#[command(author, version, about = "CLI for heat-pump controllers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Controller API base URL (overrides the config file)
    #[arg(long, global = true, env = "WPCTL_URL")]
    pub url: Option<String>,

    /// Path to the config file
    #[arg(long, global = true, env = "WPCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the current controller status
    Status(StatusArgs),

    /// Show recorded temperature history
    History(HistoryArgs),

    /// Poll the controller and print every status change
    Watch(WatchArgs),

    /// Send a control command
    Control {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        #[command(subcommand)]
        action: ControlAction,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Only print temperatures and compressor state
    #[arg(short, long)]
    pub brief: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Hours to look back (defaults to the config value)
    #[arg(long)]
    pub hours: Option<u32>,

    /// Maximum number of samples (defaults to the config value)
    #[arg(short = 'n', long)]
    pub limit: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Omit header row in CSV output
    #[arg(long)]
    pub no_header: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll interval in seconds (defaults to the config value)
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Stop after this many status updates (0 for unlimited)
    #[arg(short, long, default_value = "0")]
    pub count: u32,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ControlAction {
    /// Turn bath mode on or off
    Bath {
        /// on/off, true/false, yes/no, 1/0
        #[arg(value_parser = parse_bool_arg, action = clap::ArgAction::Set)]
        state: bool,
    },

    /// Turn holiday mode on or off
    Holiday {
        /// on/off, true/false, yes/no, 1/0
        #[arg(value_parser = parse_bool_arg, action = clap::ArgAction::Set)]
        state: bool,

        /// Duration in hours
        #[arg(long)]
        hours: Option<u32>,
    },

    /// Force the compressor on
    ForceOn,

    /// Force the compressor off
    ForceOff,

    /// Send a command by name (for commands added to the controller later)
    Raw {
        /// Command name as the controller expects it
        name: String,

        /// Value for the `active` parameter
        #[arg(long, value_parser = parse_bool_arg)]
        active: Option<bool>,

        /// Value for the `duration_hours` parameter
        #[arg(long)]
        hours: Option<u32>,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Show the current configuration
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

/// Parse a boolean from the usual on/off spellings.
pub fn parse_bool_arg(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(format!("invalid value '{}': expected on/off", s)),
    }
}
