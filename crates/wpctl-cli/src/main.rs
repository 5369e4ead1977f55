mod cli;
mod commands;
mod config;
mod format;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{cmd_config, cmd_control, cmd_history, cmd_status, cmd_watch};
use config::{Config, default_config_path};
use format::FormatOptions;
use util::connect;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Quiet mode suppresses info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    if let Commands::Config { action } = &cli.command {
        return cmd_config(action, &config_path);
    }

    let config = Config::load_or_default(&config_path)?;
    config.validate()?;

    let opts = FormatOptions::new(cli.no_color || config.no_color);
    let output = cli.output.as_ref();
    let interval = match &cli.command {
        Commands::Watch(args) => args.interval,
        _ => None,
    };
    let sync = connect(&config, cli.url.as_deref(), interval)?;

    match &cli.command {
        Commands::Status(args) => cmd_status(&sync, args, output, &opts).await,
        Commands::History(args) => cmd_history(&sync, &config, args, output, &opts).await,
        Commands::Watch(args) => cmd_watch(&sync, args, output, &opts).await,
        Commands::Control { format, action } => {
            cmd_control(&sync, action, *format, output, &opts).await
        }
        Commands::Config { .. } => Ok(()),
    }
}
