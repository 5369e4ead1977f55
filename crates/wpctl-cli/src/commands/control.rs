//! Control command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use serde_json::json;
use tracing::warn;
use wpctl_core::{DeviceSync, SyncError, encode_status};
use wpctl_types::ControlCommand;

use crate::cli::{ControlAction, OutputFormat};
use crate::format::{FormatOptions, format_status_line};
use crate::util::write_output;

/// Translate a CLI action into a controller command.
pub fn command_for(action: &ControlAction) -> ControlCommand {
    match action {
        ControlAction::Bath { state } => ControlCommand::bath_mode(*state),
        ControlAction::Holiday { state, hours } => ControlCommand::holiday_mode(*state, *hours),
        ControlAction::ForceOn => ControlCommand::force_on(),
        ControlAction::ForceOff => ControlCommand::force_off(),
        ControlAction::Raw {
            name,
            active,
            hours,
        } => ControlCommand {
            name: name.clone(),
            enabled: *active,
            duration_hours: *hours,
        },
    }
}

pub async fn cmd_control(
    sync: &DeviceSync,
    action: &ControlAction,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let command = command_for(action);

    // A known status lets the dispatcher show its prediction.
    if let Err(e) = sync.refresh_now().await.status {
        warn!(error = %e, "Could not read status before sending command");
    }

    let outcome = match sync.dispatch_command(command.clone()).await {
        Ok(outcome) => outcome,
        Err(SyncError::Rejected(message)) => {
            bail!("Controller rejected '{}': {}", command, message)
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to send '{}'", command)),
    };

    let status = outcome.reconciliation.status.as_ref().ok();
    let content = match format {
        OutputFormat::Json => {
            let body = json!({
                "command": command.to_string(),
                "success": true,
                "message": outcome.message,
                "status": status.map(|s| encode_status(s)),
            });
            serde_json::to_string_pretty(&body)? + "\n"
        }
        _ => {
            let mut text = if opts.no_color {
                format!("{}: {}\n", command, outcome.message)
            } else {
                format!("{}: {}\n", command.green(), outcome.message)
            };
            match status {
                Some(status) => {
                    text.push_str(&format_status_line(status, opts));
                    text.push('\n');
                }
                None => text.push_str("Status could not be confirmed yet.\n"),
            }
            text
        }
    };
    write_output(output, &content)
}
