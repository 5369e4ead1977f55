//! Utility functions for CLI operations.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use wpctl_core::{DeviceSync, HttpDeviceApi};

use crate::config::Config;

/// Build a synchronizer for the configured controller.
///
/// `url` overrides `api.base_url`, `interval_secs` overrides the poll
/// interval.
pub fn connect(config: &Config, url: Option<&str>, interval_secs: Option<u64>) -> Result<DeviceSync> {
    let base_url = url.unwrap_or(&config.api.base_url);
    let api = HttpDeviceApi::with_timeout(base_url, config.api.timeout())
        .with_context(|| format!("Invalid controller URL '{}'", base_url))?;
    tracing::debug!(url = api.base_url(), "Using controller");
    DeviceSync::new(Arc::new(api), config.sync_options(interval_secs))
        .context("Invalid synchronization options")
}

/// Write output to file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Append a line to file or stdout. Used by streaming commands.
pub fn append_output(output: Option<&PathBuf>, line: &str) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            writeln!(file, "{}", line)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            println!("{}", line);
            io::stdout().flush()?;
        }
    }
    Ok(())
}
