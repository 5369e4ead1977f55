//! Output formatting for status snapshots and history.

use std::fmt::Write as _;

use anyhow::Result;
use owo_colors::OwoColorize;
use serde_json::{Map, Value, json};
use time::PrimitiveDateTime;
use wpctl_core::encode_status;
use wpctl_types::{
    CompressorState, DeviceStatus, HistorySeries, Sensor, format_runtime, format_time_of_day,
};

/// Placeholder for a value the controller did not report.
const MISSING: &str = "—";

/// Options for formatting output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Omit header row in CSV output.
    pub no_header: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            no_header: false,
        }
    }

    #[must_use]
    pub fn with_no_header(mut self, no_header: bool) -> Self {
        self.no_header = no_header;
        self
    }
}

fn temp(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("{:.1}°C", v))
}

fn csv_temp(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| format!("{:.1}", v))
}

fn compressor(state: &CompressorState, opts: &FormatOptions) -> String {
    let label = state.to_string();
    if opts.no_color {
        return label;
    }
    match state {
        CompressorState::Running => label.green().to_string(),
        CompressorState::Off => label.dimmed().to_string(),
        CompressorState::Unknown(_) => label.yellow().to_string(),
    }
}

fn flag(on: bool, opts: &FormatOptions) -> String {
    match (on, opts.no_color) {
        (true, true) => "on".to_string(),
        (false, true) => "off".to_string(),
        (true, false) => "on".green().to_string(),
        (false, false) => "off".dimmed().to_string(),
    }
}

fn heading(title: &str, opts: &FormatOptions) -> String {
    if opts.no_color {
        title.to_string()
    } else {
        title.bold().to_string()
    }
}

/// Format a history timestamp the way the controller does.
pub fn format_timestamp(ts: PrimitiveDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}

// ============================================================================
// Status
// ============================================================================

/// Full multi-section status report.
pub fn format_status_text(status: &DeviceStatus, opts: &FormatOptions) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", heading("Temperatures", opts));
    for sensor in Sensor::ALL {
        let _ = writeln!(
            out,
            "  {:<12} {}",
            sensor.label(),
            temp(status.temperatures.get(sensor))
        );
    }

    let _ = writeln!(out, "{}", heading("Compressor", opts));
    let _ = writeln!(
        out,
        "  {:<12} {}",
        "State",
        compressor(&status.compressor.state, opts)
    );
    if let Some(runtime) = status.compressor.runtime_current {
        let _ = writeln!(out, "  {:<12} {}", "Current run", format_runtime(runtime));
    }
    if let Some(runtime) = status.compressor.runtime_today {
        let _ = writeln!(out, "  {:<12} {}", "Today", format_runtime(runtime));
    }

    let _ = writeln!(out, "{}", heading("Setpoints", opts));
    let setpoints = &status.setpoints;
    for (label, value) in [
        ("Switch on", setpoints.switch_on),
        ("Switch off", setpoints.switch_off),
        ("Safety", setpoints.safety),
        ("Evap. limit", setpoints.evaporator_limit),
    ] {
        let _ = writeln!(out, "  {:<12} {}", label, temp(value));
    }

    let _ = writeln!(out, "{}", heading("Modes", opts));
    let modes = &status.modes;
    let _ = writeln!(out, "  {:<12} {}", "Bath", flag(modes.bath, opts));
    let _ = writeln!(out, "  {:<12} {}", "Holiday", flag(modes.holiday, opts));
    let _ = writeln!(out, "  {:<12} {}", "Solar excess", flag(modes.solar_excess, opts));
    if let Some(current) = &modes.current {
        let _ = writeln!(out, "  {:<12} {}", "Active", current);
    }

    let energy = &status.energy;
    if energy.battery_power.is_some() || energy.state_of_charge.is_some() || energy.feed_in.is_some()
    {
        let _ = writeln!(out, "{}", heading("Energy", opts));
        if let Some(power) = energy.battery_power {
            let _ = writeln!(out, "  {:<12} {} W", "Battery", power);
        }
        if let Some(soc) = energy.state_of_charge {
            let _ = writeln!(out, "  {:<12} {}%", "Charge", soc);
        }
        if let Some(feed_in) = energy.feed_in {
            let _ = writeln!(out, "  {:<12} {} W", "Feed-in", feed_in);
        }
    }

    let system = &status.system;
    if let Some(updated) = system.last_update {
        let _ = writeln!(out, "Last update: {}", format_time_of_day(updated));
    }
    if let Some(reason) = &system.exclusion_reason {
        let line = format!("Blocked: {}", reason);
        if opts.no_color {
            let _ = writeln!(out, "{}", line);
        } else {
            let _ = writeln!(out, "{}", line.yellow());
        }
    }
    out
}

/// One-line summary used by `status --brief` and `watch`.
pub fn format_status_line(status: &DeviceStatus, opts: &FormatOptions) -> String {
    let temps = [Sensor::Oben, Sensor::Mittig, Sensor::Unten, Sensor::Verdampfer]
        .into_iter()
        .map(|sensor| format!("{} {}", sensor.label(), temp(status.temperatures.get(sensor))))
        .collect::<Vec<_>>()
        .join("  ");
    format!(
        "{}  | compressor {}",
        temps,
        compressor(&status.compressor.state, opts)
    )
}

/// Status in the controller's wire schema.
pub fn format_status_json(status: &DeviceStatus) -> Result<String> {
    Ok(serde_json::to_string_pretty(&encode_status(status))? + "\n")
}

// ============================================================================
// History
// ============================================================================

/// Sensors that have at least one reading in `series`.
fn reported_sensors(series: &HistorySeries) -> Vec<Sensor> {
    Sensor::ALL
        .into_iter()
        .filter(|sensor| series.samples().iter().any(|s| s.readings.get(*sensor).is_some()))
        .collect()
}

pub fn format_history_text(series: &HistorySeries, opts: &FormatOptions) -> String {
    if series.is_empty() {
        return "No history in the requested window.\n".to_string();
    }
    let sensors = reported_sensors(series);
    let mut out = String::new();

    let mut header = format!("{:<19}", "Timestamp");
    for sensor in &sensors {
        let _ = write!(header, " {:>10}", sensor.label());
    }
    header.push_str("  Compressor");
    let _ = writeln!(out, "{}", heading(&header, opts));

    for sample in series {
        let _ = write!(out, "{:<19}", format_timestamp(sample.timestamp));
        for sensor in &sensors {
            let _ = write!(out, " {:>10}", temp(sample.readings.get(*sensor)));
        }
        let _ = writeln!(out, "  {}", compressor(&sample.compressor, opts));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{} samples", series.len());
    for sensor in &sensors {
        if let Some((min, max)) = series.value_range(*sensor) {
            let _ = writeln!(
                out,
                "  {:<12} min {:.1}°C  max {:.1}°C",
                sensor.label(),
                min,
                max
            );
        }
    }
    if let Some(duty) = series.compressor_duty() {
        let _ = writeln!(out, "  Compressor running in {:.0}% of samples", duty * 100.0);
    }
    out
}

pub fn format_history_csv(series: &HistorySeries, opts: &FormatOptions) -> String {
    let mut out = String::new();
    if !opts.no_header {
        let mut header = "timestamp".to_string();
        for sensor in Sensor::ALL {
            let _ = write!(header, ",{}", sensor.flat_keys()[0]);
        }
        let _ = writeln!(out, "{},kompressor", header);
    }
    for sample in series {
        let mut line = format_timestamp(sample.timestamp);
        for sensor in Sensor::ALL {
            let _ = write!(line, ",{}", csv_temp(sample.readings.get(sensor)));
        }
        let _ = writeln!(out, "{},{}", line, sample.compressor.as_token());
    }
    out
}

/// History as `{"data": [...], "count": n}` with controller column names.
pub fn format_history_json(series: &HistorySeries) -> Result<String> {
    let rows: Vec<Value> = series
        .samples()
        .iter()
        .map(|sample| {
            let mut row = Map::new();
            row.insert(
                "timestamp".to_string(),
                Value::String(format_timestamp(sample.timestamp)),
            );
            for (sensor, value) in sample.readings.iter() {
                row.insert(sensor.flat_keys()[0].to_string(), json!(value));
            }
            row.insert(
                "kompressor".to_string(),
                Value::String(sample.compressor.as_token().to_string()),
            );
            Value::Object(row)
        })
        .collect();
    let body = json!({ "count": rows.len(), "data": rows });
    Ok(serde_json::to_string_pretty(&body)? + "\n")
}
