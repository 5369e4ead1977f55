//! Status command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use wpctl_core::DeviceSync;

use crate::cli::{OutputFormat, StatusArgs};
use crate::format::{FormatOptions, format_status_json, format_status_line, format_status_text};
use crate::util::write_output;

pub async fn cmd_status(
    sync: &DeviceSync,
    args: &StatusArgs,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    if args.format == OutputFormat::Csv {
        bail!("CSV output is only available for history");
    }

    let outcome = sync.refresh_now().await;
    let status = outcome
        .status
        .context("Failed to read controller status")?;

    let content = match (args.format, args.brief) {
        (OutputFormat::Json, _) => format_status_json(&status)?,
        (_, true) => format_status_line(&status, opts) + "\n",
        (_, false) => format_status_text(&status, opts),
    };
    write_output(output, &content)
}
