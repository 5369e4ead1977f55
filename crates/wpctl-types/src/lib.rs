//! Platform-agnostic types for heat-pump controller monitoring.
//!
//! This crate provides the domain model shared by the synchronization layer
//! (wpctl-core) and its hosts:
//!
//! - [`DeviceStatus`] snapshots with sparse [`SensorReadings`]
//! - [`HistorySeries`] with per-sensor chart assembly
//! - [`ControlCommand`] and its local effect on a snapshot
//! - Runtime and clock parsing helpers matching the controller's formats
//!
//! # Example
//!
//! ```
//! use wpctl_types::{Compressor, CompressorState, ControlCommand, DeviceStatus, Sensor};
//!
//! let mut status = DeviceStatus::new(Compressor::new(CompressorState::from_token("EIN")));
//! status.temperatures.insert(Sensor::Oben, 52.3);
//!
//! let predicted = status.with_command_applied(&ControlCommand::force_off());
//! assert_eq!(predicted.compressor.state, CompressorState::Off);
//! assert_eq!(predicted.temperatures.get(Sensor::Oben), Some(52.3));
//! ```

pub mod error;
pub mod history;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use history::{HistorySample, HistorySeries, SeriesPoint};
pub use types::{
    CommandKind, CommandResult, Compressor, CompressorState, ControlCommand, DeviceStatus, Energy,
    Modes, Sensor, SensorReadings, Setpoints, SystemInfo, format_runtime, format_time_of_day,
    parse_runtime, parse_time_of_day,
};

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_sensor_keys() {
        let mut status = DeviceStatus::new(Compressor::new(CompressorState::Running));
        status.temperatures.insert(Sensor::Verdampfer, 7.5);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["temperatures"]["verdampfer"], 7.5);
        assert_eq!(json["compressor"]["state"], "running");

        let back: DeviceStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_command_serialization_skips_absent_fields() {
        let json = serde_json::to_value(ControlCommand::force_on()).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "force_on" }));
    }
}
