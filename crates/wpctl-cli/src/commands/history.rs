//! History command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use wpctl_core::DeviceSync;

use crate::cli::{HistoryArgs, OutputFormat};
use crate::config::Config;
use crate::format::{FormatOptions, format_history_csv, format_history_json, format_history_text};
use crate::util::write_output;

pub async fn cmd_history(
    sync: &DeviceSync,
    config: &Config,
    args: &HistoryArgs,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let query = config.history_query(args.hours, args.limit);
    info!(hours = query.hours_back, limit = query.limit, "Loading history");

    let series = sync
        .load_history(query)
        .await
        .context("Failed to load history")?;

    let opts = opts.with_no_header(args.no_header);
    let content = match args.format {
        OutputFormat::Text => format_history_text(&series, &opts),
        OutputFormat::Json => format_history_json(&series)?,
        OutputFormat::Csv => format_history_csv(&series, &opts),
    };
    write_output(output, &content)
}
