//! Core types for heat-pump controller status and control.

use core::fmt;
use std::collections::BTreeMap;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::Time;
use time::macros::format_description;

use crate::error::{ParseError, ParseResult};

/// Named temperature sensor positions reported by the controller.
///
/// The buffer tank carries three probes (`Oben`, `Mittig`, `Unten`); the
/// remaining positions sit on the refrigerant and heating circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Sensor {
    /// Top of the buffer tank.
    Oben,
    /// Middle of the buffer tank.
    Mittig,
    /// Bottom of the buffer tank.
    Unten,
    /// Evaporator.
    Verdampfer,
    /// Heating flow line.
    Vorlauf,
    /// Tank average as computed by the controller.
    Boiler,
}

impl Sensor {
    /// All sensor positions in display order.
    pub const ALL: [Sensor; 6] = [
        Sensor::Oben,
        Sensor::Mittig,
        Sensor::Unten,
        Sensor::Verdampfer,
        Sensor::Vorlauf,
        Sensor::Boiler,
    ];

    /// Key used inside the nested `temperatures` object of a status payload.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Sensor::Oben => "oben",
            Sensor::Mittig => "mittig",
            Sensor::Unten => "unten",
            Sensor::Verdampfer => "verdampfer",
            Sensor::Vorlauf => "vorlauf",
            Sensor::Boiler => "boiler",
        }
    }

    /// Flat keys accepted for this sensor at the top level of a payload.
    ///
    /// History rows use the snake-case `t_*` form; some status producers
    /// emit the camel-case form.
    ///
    /// # Examples
    ///
    /// ```
    /// use wpctl_types::Sensor;
    ///
    /// assert_eq!(Sensor::Verdampfer.flat_keys()[0], "t_verd");
    /// assert!(Sensor::Oben.flat_keys().contains(&"tOben"));
    /// ```
    #[must_use]
    pub fn flat_keys(self) -> &'static [&'static str] {
        match self {
            Sensor::Oben => &["t_oben", "tOben"],
            Sensor::Mittig => &["t_mittig", "tMittig"],
            Sensor::Unten => &["t_unten", "tUnten"],
            Sensor::Verdampfer => &["t_verd", "tVerd", "t_verdampfer", "tVerdampfer"],
            Sensor::Vorlauf => &["t_vorlauf", "tVorlauf"],
            Sensor::Boiler => &["t_boiler", "tBoiler"],
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Sensor::Oben => "Top",
            Sensor::Mittig => "Middle",
            Sensor::Unten => "Bottom",
            Sensor::Verdampfer => "Evaporator",
            Sensor::Vorlauf => "Flow",
            Sensor::Boiler => "Tank avg",
        }
    }

    /// Look up a sensor by its nested key or any of its flat keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use wpctl_types::Sensor;
    ///
    /// assert_eq!(Sensor::from_key("oben"), Some(Sensor::Oben));
    /// assert_eq!(Sensor::from_key("t_verd"), Some(Sensor::Verdampfer));
    /// assert_eq!(Sensor::from_key("outside"), None);
    /// ```
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.key() == key || s.flat_keys().contains(&key))
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Sparse set of temperature readings in °C, keyed by sensor.
///
/// A sensor that is absent has no reading. Absence is never encoded as `0.0`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SensorReadings {
    values: BTreeMap<Sensor, f64>,
}

impl SensorReadings {
    /// Create an empty set of readings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reading for `sensor`, if one was reported.
    #[must_use]
    pub fn get(&self, sensor: Sensor) -> Option<f64> {
        self.values.get(&sensor).copied()
    }

    /// Record a reading. Non-finite values are treated as no reading.
    pub fn insert(&mut self, sensor: Sensor, celsius: f64) {
        if celsius.is_finite() {
            self.values.insert(sensor, celsius);
        }
    }

    /// Builder-style variant of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, sensor: Sensor, celsius: f64) -> Self {
        self.insert(sensor, celsius);
        self
    }

    /// Iterate over the sensors that have a reading, in sensor order.
    pub fn iter(&self) -> impl Iterator<Item = (Sensor, f64)> + '_ {
        self.values.iter().map(|(s, v)| (*s, *v))
    }

    /// Number of sensors with a reading.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no sensor has a reading.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(Sensor, f64)> for SensorReadings {
    fn from_iter<I: IntoIterator<Item = (Sensor, f64)>>(iter: I) -> Self {
        let mut readings = SensorReadings::new();
        for (sensor, value) in iter {
            readings.insert(sensor, value);
        }
        readings
    }
}

/// Compressor state as reported by the controller.
///
/// Tokens the mapper does not recognize are preserved in `Unknown` rather
/// than being folded into `Off`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CompressorState {
    /// Compressor is stopped.
    Off,
    /// Compressor is running.
    Running,
    /// Unrecognized token, kept verbatim.
    Unknown(String),
}

impl CompressorState {
    /// Interpret a controller token (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use wpctl_types::CompressorState;
    ///
    /// assert_eq!(CompressorState::from_token("EIN"), CompressorState::Running);
    /// assert_eq!(CompressorState::from_token("running"), CompressorState::Running);
    /// assert_eq!(CompressorState::from_token("AUS"), CompressorState::Off);
    /// assert_eq!(
    ///     CompressorState::from_token("defrost"),
    ///     CompressorState::Unknown("defrost".to_string())
    /// );
    /// ```
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "ein" | "on" | "running" | "true" | "1" => CompressorState::Running,
            "aus" | "off" | "stopped" | "false" | "0" => CompressorState::Off,
            _ => CompressorState::Unknown(token.to_string()),
        }
    }

    /// Token the controller uses for this state.
    #[must_use]
    pub fn as_token(&self) -> &str {
        match self {
            CompressorState::Off => "AUS",
            CompressorState::Running => "EIN",
            CompressorState::Unknown(token) => token,
        }
    }

    /// Whether the compressor is known to be running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, CompressorState::Running)
    }
}

impl fmt::Display for CompressorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressorState::Off => write!(f, "off"),
            CompressorState::Running => write!(f, "running"),
            CompressorState::Unknown(token) => write!(f, "unknown ({token})"),
        }
    }
}

/// Compressor state plus cumulative runtimes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Compressor {
    pub state: CompressorState,
    /// Runtime of the current cycle, if running and reported.
    pub runtime_current: Option<Duration>,
    /// Total runtime today, if reported.
    pub runtime_today: Option<Duration>,
}

impl Compressor {
    /// Compressor with the given state and no runtime information.
    pub fn new(state: CompressorState) -> Self {
        Self {
            state,
            runtime_current: None,
            runtime_today: None,
        }
    }
}

/// Active control setpoints in °C.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Setpoints {
    /// Temperature below which the compressor switches on.
    pub switch_on: Option<f64>,
    /// Temperature at which the compressor switches off.
    pub switch_off: Option<f64>,
    /// Safety cut-off temperature.
    pub safety: Option<f64>,
    /// Minimum evaporator temperature.
    pub evaporator_limit: Option<f64>,
}

/// Mode toggles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Modes {
    /// Running on solar excess power.
    pub solar_excess: bool,
    /// Holiday (reduced) mode.
    pub holiday: bool,
    /// Bath mode (raised setpoints for a one-off hot water demand).
    pub bath: bool,
    /// Free-text label of the controller's current mode.
    pub current: Option<String>,
}

/// Photovoltaic/battery snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Energy {
    /// Battery power in W (negative while discharging).
    pub battery_power: Option<i64>,
    /// Battery state of charge in percent.
    pub state_of_charge: Option<u8>,
    /// Grid feed-in power in W (negative while drawing from the grid).
    pub feed_in: Option<i64>,
}

/// Controller metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SystemInfo {
    /// Controller-local time of the snapshot.
    pub last_update: Option<Time>,
    /// Why automatic compressor control is currently suppressed.
    pub exclusion_reason: Option<String>,
}

/// Point-in-time snapshot of the heat-pump controller.
///
/// Snapshots are values: updates produce a new `DeviceStatus` (see
/// [`with_command_applied`](Self::with_command_applied)) so consumers can
/// compare snapshots by equality.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceStatus {
    pub temperatures: SensorReadings,
    pub compressor: Compressor,
    pub setpoints: Setpoints,
    pub modes: Modes,
    pub energy: Energy,
    pub system: SystemInfo,
}

impl DeviceStatus {
    /// Snapshot with the given compressor and nothing else reported.
    pub fn new(compressor: Compressor) -> Self {
        Self {
            temperatures: SensorReadings::new(),
            compressor,
            setpoints: Setpoints::default(),
            modes: Modes::default(),
            energy: Energy::default(),
            system: SystemInfo::default(),
        }
    }

    /// Predict the snapshot the controller will report after `command`.
    ///
    /// Commands without a known local effect return an identical snapshot.
    ///
    /// # Examples
    ///
    /// ```
    /// use wpctl_types::{Compressor, CompressorState, ControlCommand, DeviceStatus};
    ///
    /// let status = DeviceStatus::new(Compressor::new(CompressorState::Off));
    /// let predicted = status.with_command_applied(&ControlCommand::bath_mode(true));
    /// assert!(predicted.modes.bath);
    /// assert!(!status.modes.bath);
    /// ```
    #[must_use]
    pub fn with_command_applied(&self, command: &ControlCommand) -> DeviceStatus {
        let mut next = self.clone();
        match command.kind() {
            CommandKind::BathMode => next.modes.bath = command.enabled.unwrap_or(true),
            CommandKind::HolidayMode => next.modes.holiday = command.enabled.unwrap_or(true),
            CommandKind::ForceOn => {
                next.compressor.state = CompressorState::Running;
                next.system.exclusion_reason = None;
            }
            CommandKind::ForceOff => {
                next.compressor.state = CompressorState::Off;
                next.compressor.runtime_current = None;
            }
            CommandKind::Other => {}
        }
        next
    }
}

/// Known control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CommandKind {
    BathMode,
    HolidayMode,
    ForceOn,
    ForceOff,
    /// A command name this client has no local model for.
    Other,
}

impl CommandKind {
    /// Classify a command name, accepting the controller's German aliases.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "bath_mode" | "bademodus" => CommandKind::BathMode,
            "holiday_mode" | "urlaubsmodus" => CommandKind::HolidayMode,
            "force_on" => CommandKind::ForceOn,
            "force_off" => CommandKind::ForceOff,
            _ => CommandKind::Other,
        }
    }
}

/// A control command for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControlCommand {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub enabled: Option<bool>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub duration_hours: Option<u32>,
}

impl ControlCommand {
    /// Arbitrary named command.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: None,
            duration_hours: None,
        }
    }

    /// Toggle bath mode.
    pub fn bath_mode(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::new("bath_mode")
        }
    }

    /// Toggle holiday mode, optionally for a limited number of hours.
    pub fn holiday_mode(enabled: bool, duration_hours: Option<u32>) -> Self {
        Self {
            enabled: Some(enabled),
            duration_hours,
            ..Self::new("holiday_mode")
        }
    }

    /// Force the compressor on.
    pub fn force_on() -> Self {
        Self::new("force_on")
    }

    /// Force the compressor off.
    pub fn force_off() -> Self {
        Self::new("force_off")
    }

    /// Classified command kind.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        CommandKind::from_name(&self.name)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(enabled) = self.enabled {
            write!(f, " {}", if enabled { "on" } else { "off" })?;
        }
        if let Some(hours) = self.duration_hours {
            write!(f, " for {hours}h")?;
        }
        Ok(())
    }
}

/// Controller reply to a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

/// Parse a runtime in the controller's `H:MM:SS` or `N day(s), H:MM:SS` form.
///
/// Fractional seconds are ignored.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use wpctl_types::parse_runtime;
///
/// assert_eq!(parse_runtime("2:30:00").unwrap(), Duration::from_secs(9000));
/// assert_eq!(parse_runtime("1 day, 0:00:05").unwrap(), Duration::from_secs(86405));
/// assert!(parse_runtime("soon").is_err());
/// ```
pub fn parse_runtime(s: &str) -> ParseResult<Duration> {
    let invalid = || ParseError::InvalidRuntime(s.to_string());
    let trimmed = s.trim();

    let (days, clock) = match trimmed.split_once(',') {
        Some((day_part, clock)) => {
            let count = day_part
                .trim()
                .strip_suffix("days")
                .or_else(|| day_part.trim().strip_suffix("day"))
                .ok_or_else(invalid)?;
            let days: u64 = count.trim().parse().map_err(|_| invalid())?;
            (days, clock.trim())
        }
        None => (0, trimmed),
    };

    let clock = clock.split('.').next().unwrap_or(clock);
    let mut parts = clock.split(':');
    let (Some(h), Some(m), Some(sec), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    let hours: u64 = h.parse().map_err(|_| invalid())?;
    let minutes: u64 = m.parse().map_err(|_| invalid())?;
    let seconds: u64 = sec.parse().map_err(|_| invalid())?;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    let total = days
        .checked_mul(86_400)
        .and_then(|d| hours.checked_mul(3_600).and_then(|h| d.checked_add(h)))
        .and_then(|t| t.checked_add(minutes * 60 + seconds))
        .ok_or_else(invalid)?;
    Ok(Duration::from_secs(total))
}

/// Format a runtime the way the controller does (whole seconds).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use wpctl_types::format_runtime;
///
/// assert_eq!(format_runtime(Duration::from_secs(905)), "0:15:05");
/// assert_eq!(format_runtime(Duration::from_secs(2 * 86_400 + 60)), "2 days, 0:01:00");
/// ```
#[must_use]
pub fn format_runtime(d: Duration) -> String {
    let total = d.as_secs();
    let days = total / 86_400;
    let rest = total % 86_400;
    let clock = format!("{}:{:02}:{:02}", rest / 3_600, (rest % 3_600) / 60, rest % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

/// Parse the controller's `HH:MM:SS` last-update clock.
pub fn parse_time_of_day(s: &str) -> ParseResult<Time> {
    Time::parse(s.trim(), format_description!("[hour]:[minute]:[second]"))
        .map_err(|_| ParseError::InvalidTimeOfDay(s.to_string()))
}

/// Format a clock time as `HH:MM:SS`.
#[must_use]
pub fn format_time_of_day(t: Time) -> String {
    format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn off_status() -> DeviceStatus {
        DeviceStatus::new(Compressor::new(CompressorState::Off))
    }

    #[test]
    fn test_sensor_keys_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for sensor in Sensor::ALL {
            assert!(seen.insert(sensor.key()));
            for key in sensor.flat_keys() {
                assert!(seen.insert(*key), "duplicate key {key}");
            }
        }
    }

    #[test]
    fn test_readings_skip_non_finite() {
        let readings = SensorReadings::new()
            .with(Sensor::Oben, f64::NAN)
            .with(Sensor::Unten, 38.5);
        assert_eq!(readings.get(Sensor::Oben), None);
        assert_eq!(readings.get(Sensor::Unten), Some(38.5));
        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn test_readings_keep_freezing_point() {
        let readings = SensorReadings::new().with(Sensor::Verdampfer, 0.0);
        assert_eq!(readings.get(Sensor::Verdampfer), Some(0.0));
        assert_eq!(readings.get(Sensor::Oben), None);
    }

    #[test]
    fn test_compressor_token_round_trip() {
        for state in [
            CompressorState::Off,
            CompressorState::Running,
            CompressorState::Unknown("Abtauen".to_string()),
        ] {
            assert_eq!(CompressorState::from_token(state.as_token()), state);
        }
    }

    #[test]
    fn test_unknown_token_not_coerced_to_off() {
        let state = CompressorState::from_token("STANDBY");
        assert!(matches!(state, CompressorState::Unknown(ref t) if t == "STANDBY"));
        assert!(!state.is_running());
    }

    #[test]
    fn test_command_kind_aliases() {
        assert_eq!(CommandKind::from_name("bademodus"), CommandKind::BathMode);
        assert_eq!(CommandKind::from_name("Urlaubsmodus"), CommandKind::HolidayMode);
        assert_eq!(CommandKind::from_name("force_off"), CommandKind::ForceOff);
        assert_eq!(CommandKind::from_name("reboot"), CommandKind::Other);
    }

    #[test]
    fn test_force_on_clears_exclusion_reason() {
        let mut status = off_status();
        status.system.exclusion_reason = Some("Nachtabsenkung".to_string());
        let next = status.with_command_applied(&ControlCommand::force_on());
        assert_eq!(next.compressor.state, CompressorState::Running);
        assert_eq!(next.system.exclusion_reason, None);
    }

    #[test]
    fn test_force_off_clears_current_runtime() {
        let mut status = DeviceStatus::new(Compressor::new(CompressorState::Running));
        status.compressor.runtime_current = Some(Duration::from_secs(600));
        let next = status.with_command_applied(&ControlCommand::force_off());
        assert_eq!(next.compressor.state, CompressorState::Off);
        assert_eq!(next.compressor.runtime_current, None);
    }

    #[test]
    fn test_holiday_mode_prediction() {
        let next = off_status().with_command_applied(&ControlCommand::holiday_mode(true, Some(48)));
        assert!(next.modes.holiday);
        assert!(!next.modes.bath);
    }

    #[test]
    fn test_unknown_command_predicts_no_change() {
        let status = off_status();
        assert_eq!(
            status.with_command_applied(&ControlCommand::new("reboot")),
            status
        );
    }

    #[test]
    fn test_command_display() {
        assert_eq!(ControlCommand::bath_mode(true).to_string(), "bath_mode on");
        assert_eq!(
            ControlCommand::holiday_mode(false, Some(12)).to_string(),
            "holiday_mode off for 12h"
        );
        assert_eq!(ControlCommand::force_on().to_string(), "force_on");
    }

    #[test]
    fn test_parse_runtime_variants() {
        assert_eq!(parse_runtime("0:00:00").unwrap(), Duration::ZERO);
        assert_eq!(parse_runtime("12:05:09.123456").unwrap(), Duration::from_secs(43_509));
        assert_eq!(
            parse_runtime("3 days, 1:00:00").unwrap(),
            Duration::from_secs(3 * 86_400 + 3_600)
        );
    }

    #[test]
    fn test_parse_runtime_rejects_garbage() {
        for bad in ["", "5", "1:2", "1:61:00", "x:00:00", "day, 1:00:00", "1:00:00:00"] {
            assert!(parse_runtime(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_parse_runtime_rejects_overflow() {
        for huge in [
            "300000000000000 days, 0:00:00",
            "18446744073709551615:00:00",
            "213503982334601 days, 23:59:59",
        ] {
            assert!(
                matches!(parse_runtime(huge), Err(ParseError::InvalidRuntime(_))),
                "accepted {huge:?}"
            );
        }
        assert_eq!(
            parse_runtime("100000 days, 0:00:00").unwrap(),
            Duration::from_secs(8_640_000_000)
        );
    }

    #[test]
    fn test_time_of_day_round_trip() {
        let t = parse_time_of_day("07:04:09").unwrap();
        assert_eq!(format_time_of_day(t), "07:04:09");
        assert!(parse_time_of_day("25:00:00").is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_runtime_format_parse_round_trip(secs in 0u64..10_000_000) {
            let d = Duration::from_secs(secs);
            proptest::prop_assert_eq!(parse_runtime(&format_runtime(d)).unwrap(), d);
        }
    }
}
