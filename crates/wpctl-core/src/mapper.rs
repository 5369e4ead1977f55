//! Mapping between controller wire payloads and domain types.
//!
//! All functions here are pure. The mapping policy is:
//!
//! - Every numeric field is optional. A missing, `null` or non-numeric value
//!   becomes "no reading" (`None`), never `0`.
//! - Unrecognized compressor tokens become [`CompressorState::Unknown`].
//! - Structural problems (wrong top-level type, missing envelope fields,
//!   sections of the wrong JSON type) are hard [`MapError`]s.
//!
//! The canonical schema is the nested one served by the controller's
//! `/status` endpoint:
//!
//! ```json
//! {
//!   "temperatures": { "oben": 42.5, "mittig": 41.0, "unten": 39.5, "verdampfer": 10.2 },
//!   "compressor": { "status": "EIN", "runtime_current": "0:15:00", "runtime_today": "2:30:00" },
//!   "setpoints": { "einschaltpunkt": 42, "ausschaltpunkt": 45, "sicherheits_temp": 52, "verdampfertemperatur": 6.0 },
//!   "mode": { "current": "Normalmodus", "solar_active": false, "holiday_active": false, "bath_active": false },
//!   "energy": { "battery_power": 250, "soc": 75, "feed_in": 100 },
//!   "system": { "exclusion_reason": null, "last_update": "14:03:27" }
//! }
//! ```
//!
//! Flat temperature keys (`t_oben`, `tOben`) and a bare compressor token are
//! accepted as well.

use serde_json::{Map, Value, json};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, warn};

use wpctl_types::{
    CommandKind, CommandResult, Compressor, CompressorState, ControlCommand, DeviceStatus, Energy,
    HistorySample, HistorySeries, Modes, ParseError, ParseResult, Sensor, SensorReadings,
    Setpoints, SystemInfo, format_runtime, format_time_of_day, parse_runtime, parse_time_of_day,
};

use crate::error::MapError;

type Object = Map<String, Value>;

/// Map a raw `/status` payload into a [`DeviceStatus`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use wpctl_core::map_status;
/// use wpctl_types::{CompressorState, Sensor};
///
/// let status = map_status(&json!({ "compressor": "running", "tOben": 52.3 })).unwrap();
/// assert_eq!(status.compressor.state, CompressorState::Running);
/// assert_eq!(status.temperatures.get(Sensor::Oben), Some(52.3));
/// assert_eq!(status.temperatures.get(Sensor::Unten), None);
/// ```
pub fn map_status(payload: &Value) -> Result<DeviceStatus, MapError> {
    let root = payload
        .as_object()
        .ok_or_else(|| MapError::wrong_type("$", "object"))?;

    let compressor = match root.get("compressor") {
        None | Some(Value::Null) => return Err(MapError::MissingField("compressor".to_string())),
        Some(value) => map_compressor(value, root)?,
    };

    Ok(DeviceStatus {
        temperatures: map_temperatures(root)?,
        compressor,
        setpoints: map_setpoints(section(root, "setpoints")?),
        modes: map_modes(root)?,
        energy: map_energy(section(root, "energy")?),
        system: map_system(section(root, "system")?),
    })
}

/// Map a raw `/history` payload into a time-ordered [`HistorySeries`].
///
/// Rows whose timestamp cannot be parsed are skipped; the controller itself
/// drops malformed CSV lines in the same way.
pub fn map_history(payload: &Value) -> Result<HistorySeries, MapError> {
    let root = payload
        .as_object()
        .ok_or_else(|| MapError::wrong_type("$", "object"))?;

    let rows = match root.get("data") {
        None | Some(Value::Null) => return Err(MapError::MissingField("data".to_string())),
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(MapError::wrong_type("data", "array")),
    };

    let mut samples = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let row = row
            .as_object()
            .ok_or_else(|| MapError::wrong_type(format!("data[{i}]"), "object"))?;

        let timestamp = match row.get("timestamp").and_then(Value::as_str) {
            Some(raw) => match parse_timestamp(raw) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(row = i, error = %e, "Skipping history row");
                    continue;
                }
            },
            None => {
                warn!(row = i, "Skipping history row without timestamp");
                continue;
            }
        };

        let compressor = ["kompressor", "compressor"]
            .iter()
            .find_map(|k| row.get(*k))
            .map(compressor_state)
            .unwrap_or_else(|| CompressorState::Unknown(String::new()));

        samples.push(HistorySample {
            timestamp,
            readings: map_temperatures(row)?,
            compressor,
        });
    }

    if let Some(count) = root.get("count").and_then(Value::as_u64)
        && count as usize != rows.len()
    {
        debug!(count, rows = rows.len(), "History count does not match row count");
    }

    Ok(HistorySeries::from_samples(samples))
}

/// Map a `/control` reply into a [`CommandResult`].
///
/// The controller answers `{"status": "success", "message": ...}`; a boolean
/// `success` field takes precedence when present.
pub fn map_command_result(payload: &Value) -> Result<CommandResult, MapError> {
    let root = payload
        .as_object()
        .ok_or_else(|| MapError::wrong_type("$", "object"))?;

    let success = match (root.get("success"), root.get("status")) {
        (Some(Value::Bool(b)), _) => *b,
        (_, Some(Value::String(s))) => s.eq_ignore_ascii_case("success"),
        _ => return Err(MapError::MissingField("status".to_string())),
    };
    let message = ["message", "detail"]
        .iter()
        .find_map(|k| root.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    Ok(CommandResult { success, message })
}

/// Encode a [`DeviceStatus`] in the canonical status schema.
///
/// `map_status(&encode_status(&s))` yields a snapshot equal to `s`.
pub fn encode_status(status: &DeviceStatus) -> Value {
    let temperatures: Object = status
        .temperatures
        .iter()
        .map(|(sensor, v)| (sensor.key().to_string(), json!(v)))
        .collect();

    json!({
        "temperatures": temperatures,
        "compressor": {
            "status": status.compressor.state.as_token(),
            "runtime_current": status.compressor.runtime_current.map(format_runtime),
            "runtime_today": status.compressor.runtime_today.map(format_runtime),
        },
        "setpoints": {
            "einschaltpunkt": status.setpoints.switch_on,
            "ausschaltpunkt": status.setpoints.switch_off,
            "sicherheits_temp": status.setpoints.safety,
            "verdampfertemperatur": status.setpoints.evaporator_limit,
        },
        "mode": {
            "current": status.modes.current,
            "solar_active": status.modes.solar_excess,
            "holiday_active": status.modes.holiday,
            "bath_active": status.modes.bath,
        },
        "energy": {
            "battery_power": status.energy.battery_power,
            "soc": status.energy.state_of_charge,
            "feed_in": status.energy.feed_in,
        },
        "system": {
            "exclusion_reason": status.system.exclusion_reason,
            "last_update": status.system.last_update.map(format_time_of_day),
        },
    })
}

/// Encode a [`ControlCommand`] as a `/control` request body.
///
/// Compressor overrides are plain commands; mode toggles go through the
/// controller's `set_mode` command with German mode names.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use wpctl_core::encode_command;
/// use wpctl_types::ControlCommand;
///
/// assert_eq!(
///     encode_command(&ControlCommand::bath_mode(true)),
///     json!({ "command": "set_mode", "params": { "mode": "bademodus", "active": true } })
/// );
/// ```
pub fn encode_command(command: &ControlCommand) -> Value {
    let mode_params = |mode: &str| {
        let mut params = Object::new();
        params.insert("mode".to_string(), json!(mode));
        params.insert("active".to_string(), json!(command.enabled.unwrap_or(true)));
        if let Some(hours) = command.duration_hours {
            params.insert("duration_hours".to_string(), json!(hours));
        }
        params
    };

    match command.kind() {
        CommandKind::ForceOn => json!({ "command": "force_on" }),
        CommandKind::ForceOff => json!({ "command": "force_off" }),
        CommandKind::BathMode => json!({ "command": "set_mode", "params": mode_params("bademodus") }),
        CommandKind::HolidayMode => {
            json!({ "command": "set_mode", "params": mode_params("urlaubsmodus") })
        }
        CommandKind::Other => {
            let mut params = Object::new();
            if let Some(enabled) = command.enabled {
                params.insert("active".to_string(), json!(enabled));
            }
            if let Some(hours) = command.duration_hours {
                params.insert("duration_hours".to_string(), json!(hours));
            }
            if params.is_empty() {
                json!({ "command": command.name })
            } else {
                json!({ "command": command.name, "params": params })
            }
        }
    }
}

/// Parse a history timestamp (`YYYY-MM-DD HH:MM:SS`, `T`-separated, or RFC 3339).
pub fn parse_timestamp(raw: &str) -> ParseResult<PrimitiveDateTime> {
    let raw = raw.trim();
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            raw,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
    })
    .or_else(|_| {
        OffsetDateTime::parse(raw, &Rfc3339).map(|dt| PrimitiveDateTime::new(dt.date(), dt.time()))
    })
    .map_err(|_| ParseError::InvalidTimestamp(raw.to_string()))
}

// ==========================================================================
// Section mappers
// ==========================================================================

/// Fetch an optional object-valued section. `null` counts as absent.
fn section<'a>(root: &'a Object, key: &str) -> Result<Option<&'a Object>, MapError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(MapError::wrong_type(key, "object")),
    }
}

fn map_temperatures(root: &Object) -> Result<SensorReadings, MapError> {
    let nested = section(root, "temperatures")?;
    Ok(Sensor::ALL
        .into_iter()
        .filter_map(|sensor| {
            nested
                .and_then(|m| number(m.get(sensor.key())))
                .or_else(|| {
                    sensor
                        .flat_keys()
                        .iter()
                        .find_map(|k| number(root.get(*k)))
                })
                .map(|v| (sensor, v))
        })
        .collect())
}

fn map_compressor(value: &Value, root: &Object) -> Result<Compressor, MapError> {
    match value {
        Value::Object(m) => Ok(Compressor {
            state: m
                .get("status")
                .map(compressor_state)
                .unwrap_or_else(|| CompressorState::Unknown(String::new())),
            runtime_current: runtime(m.get("runtime_current")),
            runtime_today: runtime(m.get("runtime_today")),
        }),
        Value::Array(_) => Err(MapError::wrong_type("compressor", "string or object")),
        // Bare token: runtimes live at the top level.
        other => Ok(Compressor {
            state: compressor_state(other),
            runtime_current: runtime(root.get("current_runtime")),
            runtime_today: runtime(root.get("total_runtime_today")),
        }),
    }
}

fn compressor_state(value: &Value) -> CompressorState {
    match value {
        Value::String(token) => CompressorState::from_token(token),
        Value::Bool(true) => CompressorState::Running,
        Value::Bool(false) => CompressorState::Off,
        Value::Number(n) => CompressorState::from_token(&n.to_string()),
        Value::Null => CompressorState::Unknown(String::new()),
        other => CompressorState::Unknown(other.to_string()),
    }
}

fn map_setpoints(section: Option<&Object>) -> Setpoints {
    let Some(m) = section else {
        return Setpoints::default();
    };
    Setpoints {
        switch_on: number(m.get("einschaltpunkt")).or_else(|| number(m.get("on"))),
        switch_off: number(m.get("ausschaltpunkt")).or_else(|| number(m.get("off"))),
        safety: number(m.get("sicherheits_temp")),
        evaporator_limit: number(m.get("verdampfertemperatur")),
    }
}

fn map_modes(root: &Object) -> Result<Modes, MapError> {
    match root.get("mode") {
        None | Some(Value::Null) => Ok(Modes::default()),
        Some(label @ Value::String(_)) => Ok(Modes {
            current: text(Some(label)),
            ..Modes::default()
        }),
        Some(Value::Object(m)) => Ok(Modes {
            solar_excess: flag(m.get("solar_active")) || flag(m.get("solar_excess")),
            holiday: flag(m.get("holiday_active")),
            bath: flag(m.get("bath_active")),
            current: text(m.get("current")),
        }),
        Some(_) => Err(MapError::wrong_type("mode", "string or object")),
    }
}

fn map_energy(section: Option<&Object>) -> Energy {
    let Some(m) = section else {
        return Energy::default();
    };
    Energy {
        battery_power: integer(m.get("battery_power")),
        state_of_charge: integer(m.get("soc")).and_then(|v| u8::try_from(v).ok().filter(|p| *p <= 100)),
        feed_in: integer(m.get("feed_in")),
    }
}

fn map_system(section: Option<&Object>) -> SystemInfo {
    let Some(m) = section else {
        return SystemInfo::default();
    };
    SystemInfo {
        last_update: text(m.get("last_update")).and_then(|s| parse_time_of_day(&s).ok()),
        exclusion_reason: text(m.get("exclusion_reason")),
    }
}

// ==========================================================================
// Scalar helpers
// ==========================================================================

/// Finite number, or a string holding one. Anything else is no reading.
fn number(value: Option<&Value>) -> Option<f64> {
    let v = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.round() as i64)
        }),
        _ => None,
    }
}

fn flag(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn runtime(value: Option<&Value>) -> Option<std::time::Duration> {
    value
        .and_then(Value::as_str)
        .and_then(|s| parse_runtime(s).ok())
}
