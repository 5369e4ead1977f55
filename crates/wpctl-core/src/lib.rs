//! Device-state synchronization for a heat-pump controller.
//!
//! This crate keeps a local mirror of a remote controller's status and
//! history, and sends control commands to it:
//!
//! - **Polling**: single-flight periodic refresh with manual triggers
//! - **Views**: tri-state `Loading | Ready | Failed` status and history
//! - **Ordering**: per-view generation numbers drop stale completions
//! - **Commands**: optimistic feedback, reconciling poll, rollback on failure
//! - **Mapping**: tolerant decoding of the controller's JSON payloads
//!
//! # Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | [`DeviceApi`] | Remote operations (HTTP via [`HttpDeviceApi`], or [`MockDeviceApi`]) |
//! | [`map_status`], [`map_history`] | Raw payload to domain model |
//! | [`StateStore`] | Owns both views; single mutation entry point |
//! | [`Poller`] | Periodic single-flight refresh |
//! | [`CommandDispatcher`] | Optimistic command dispatch |
//! | [`DeviceSync`] | Façade wiring all of the above |
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "http")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use wpctl_core::{DeviceSync, HttpDeviceApi, StoreEvent, SyncOptions};
//!
//! let api = HttpDeviceApi::new("http://raspberrypi.local:5000")?;
//! let sync = DeviceSync::new(Arc::new(api), SyncOptions::default())?;
//!
//! sync.subscribe(|event| {
//!     if let StoreEvent::Status { view, .. } = event {
//!         println!("status is now {}", view.tag());
//!     }
//! });
//! sync.activate();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod dispatcher;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod mapper;
pub mod mock;
pub mod options;
pub mod poller;
pub mod refresh;
pub mod store;
pub mod sync;
pub mod view;

pub use api::{DEFAULT_HISTORY_HOURS, DEFAULT_HISTORY_LIMIT, DeviceApi, HistoryQuery};
pub use dispatcher::{CommandDispatcher, CommandOutcome, PendingCommand, PendingGuard, PollerSlot};
pub use error::{ApiError, ErrorKind, MapError, Result, StoreError, SyncError};
#[cfg(feature = "http")]
pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpDeviceApi};
pub use mapper::{
    encode_command, encode_status, map_command_result, map_history, map_status, parse_timestamp,
};
pub use mock::MockDeviceApi;
pub use options::{MIN_POLL_INTERVAL, SyncOptions};
pub use poller::{
    DEFAULT_POLL_INTERVAL, FlightAction, Poller, PollerClient, PollerHandle, SingleFlight, Trigger,
};
pub use refresh::{RefreshOutcome, Refresher};
pub use store::{
    ApplyOutcome, ListenerId, Notice, StateStore, StoreEvent, StoreSnapshot, Update,
};
pub use sync::DeviceSync;
pub use view::{Generation, UiView, ViewError, ViewKind};

// Re-export the domain model so hosts need a single dependency.
pub use wpctl_types::{
    CommandKind, CommandResult, Compressor, CompressorState, ControlCommand, DeviceStatus,
    HistorySample, HistorySeries, Sensor, SensorReadings,
};
