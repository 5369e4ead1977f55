//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: &ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(path)?;
            let content =
                toml::to_string_pretty(&config).context("Failed to serialize config")?;
            if !path.exists() {
                eprintln!("# {} does not exist; showing defaults", path.display());
            }
            print!("{}", content);
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                );
            }
            Config::default().save(path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
