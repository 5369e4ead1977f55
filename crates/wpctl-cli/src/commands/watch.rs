//! Watch command implementation.
//!
//! Activates the poller and prints every status the store publishes until
//! Ctrl+C or the requested count. Failed polls are reported on stderr; the
//! poller keeps running and the next tick retries.

use std::path::PathBuf;

use anyhow::{Result, bail};
use owo_colors::OwoColorize;
use tokio::sync::mpsc;
use wpctl_core::{DeviceSync, StoreEvent, UiView, encode_status};

use crate::cli::{OutputFormat, WatchArgs};
use crate::format::{FormatOptions, format_status_line};
use crate::util::append_output;

pub async fn cmd_watch(
    sync: &DeviceSync,
    args: &WatchArgs,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    if args.format == OutputFormat::Csv {
        bail!("CSV output is only available for history");
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = sync.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });

    let interval = sync.options().poll_interval;
    if args.count > 0 {
        eprintln!(
            "Interval: {:?} | Count: {} | Press Ctrl+C to stop",
            interval, args.count
        );
    } else {
        eprintln!("Interval: {:?} | Press Ctrl+C to stop", interval);
    }
    sync.activate();

    let mut printed: u32 = 0;
    let result = loop {
        if args.count > 0 && printed >= args.count {
            eprintln!("Completed {} readings.", printed);
            break Ok(());
        }

        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break Ok(());
            }
            event = rx.recv() => event,
        };

        match event {
            Some(StoreEvent::Status {
                view: UiView::Ready(status),
                ..
            }) => {
                let line = match args.format {
                    OutputFormat::Json => encode_status(&status).to_string(),
                    _ => format_status_line(&status, opts),
                };
                if let Err(e) = append_output(output, &line) {
                    break Err(e);
                }
                printed += 1;
            }
            Some(StoreEvent::Status {
                view: UiView::Failed(err),
                ..
            }) => {
                let message = format!("Poll failed: {}", err);
                if opts.no_color {
                    eprintln!("{}", message);
                } else {
                    eprintln!("{}", message.red());
                }
            }
            Some(StoreEvent::Notice(notice)) => eprintln!("{}", notice),
            Some(_) => {}
            None => break Ok(()),
        }
    };

    sync.unsubscribe(listener);
    sync.deactivate();
    result
}
