//! Mock controller for testing.
//!
//! [`MockDeviceApi`] implements [`DeviceApi`] without any network. It serves
//! configurable raw payloads, so it exercises the mappers exactly like the
//! real client does.
//!
//! # Features
//!
//! - **Failure injection**: fail the next N status fetches, or every control
//!   command until cleared
//! - **Latency simulation**: delay status fetches and commands (works with a
//!   paused tokio clock)
//! - **Device simulation**: accepted commands change the served status, so a
//!   reconciling poll confirms them
//! - **Call accounting**: per-operation call counts and the peak number of
//!   concurrent status fetches

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use wpctl_types::{CommandResult, ControlCommand};

use crate::api::{DeviceApi, HistoryQuery};
use crate::error::ApiError;
use crate::mapper::{encode_status, map_status};

/// A scripted heat-pump controller.
///
/// # Example
///
/// ```
/// use wpctl_core::{DeviceApi, MockDeviceApi, map_status};
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockDeviceApi::new();
///     let payload = mock.fetch_status().await.unwrap();
///     assert!(map_status(&payload).is_ok());
///     assert_eq!(mock.status_calls(), 1);
/// }
/// ```
pub struct MockDeviceApi {
    status: RwLock<Value>,
    history: RwLock<Value>,
    /// Reply for accepted commands when no rejection is set.
    control_message: RwLock<String>,
    rejection: RwLock<Option<String>>,
    control_failure: Mutex<Option<ApiError>>,
    status_failure: Mutex<Option<ApiError>>,
    remaining_status_failures: AtomicU32,
    apply_commands: AtomicBool,
    status_latency_ms: AtomicU64,
    control_latency_ms: AtomicU64,
    status_calls: AtomicU32,
    history_calls: AtomicU32,
    control_calls: AtomicU32,
    status_in_flight: AtomicU32,
    max_status_in_flight: AtomicU32,
    commands: Mutex<Vec<ControlCommand>>,
}

impl std::fmt::Debug for MockDeviceApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDeviceApi")
            .field("status_calls", &self.status_calls())
            .field("control_calls", &self.control_calls())
            .finish()
    }
}

impl Default for MockDeviceApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDeviceApi {
    /// Create a mock serving a plausible idle controller.
    pub fn new() -> Self {
        Self {
            status: RwLock::new(Self::default_status()),
            history: RwLock::new(json!({ "data": [], "count": 0 })),
            control_message: RwLock::new("OK".to_string()),
            rejection: RwLock::new(None),
            control_failure: Mutex::new(None),
            status_failure: Mutex::new(None),
            remaining_status_failures: AtomicU32::new(0),
            apply_commands: AtomicBool::new(true),
            status_latency_ms: AtomicU64::new(0),
            control_latency_ms: AtomicU64::new(0),
            status_calls: AtomicU32::new(0),
            history_calls: AtomicU32::new(0),
            control_calls: AtomicU32::new(0),
            status_in_flight: AtomicU32::new(0),
            max_status_in_flight: AtomicU32::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    fn default_status() -> Value {
        json!({
            "temperatures": { "oben": 45.1, "mittig": 43.8, "unten": 40.2, "verdampfer": 8.4 },
            "compressor": { "status": "AUS", "runtime_current": "0:00:00", "runtime_today": "1:42:10" },
            "setpoints": { "einschaltpunkt": 42, "ausschaltpunkt": 45, "sicherheits_temp": 52 },
            "mode": {
                "current": "Normalmodus",
                "solar_active": false,
                "holiday_active": false,
                "bath_active": false
            },
            "energy": { "battery_power": 0, "soc": 80, "feed_in": 0 },
            "system": { "exclusion_reason": null, "last_update": "12:00:00" }
        })
    }

    /// Replace the served status payload.
    pub async fn set_status(&self, payload: Value) {
        *self.status.write().await = payload;
    }

    /// Current served status payload.
    pub async fn status_payload(&self) -> Value {
        self.status.read().await.clone()
    }

    /// Replace the served history payload.
    pub async fn set_history(&self, payload: Value) {
        *self.history.write().await = payload;
    }

    /// Reply `success: false` with `message` to every command.
    pub async fn reject_commands(&self, message: impl Into<String>) {
        *self.rejection.write().await = Some(message.into());
    }

    /// Message returned with accepted commands.
    pub async fn set_control_message(&self, message: impl Into<String>) {
        *self.control_message.write().await = message.into();
    }

    /// Fail the next `count` status fetches with `error`.
    pub fn fail_next(&self, count: u32, error: ApiError) {
        *lock(&self.status_failure) = Some(error);
        self.remaining_status_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every command with `error` until [`clear_failures`](Self::clear_failures).
    pub fn fail_commands(&self, error: ApiError) {
        *lock(&self.control_failure) = Some(error);
    }

    /// Remove all injected failures and rejections.
    pub async fn clear_failures(&self) {
        *lock(&self.status_failure) = None;
        *lock(&self.control_failure) = None;
        self.remaining_status_failures.store(0, Ordering::SeqCst);
        *self.rejection.write().await = None;
    }

    /// Whether accepted commands change the served status (default `true`).
    pub fn set_apply_commands(&self, apply: bool) {
        self.apply_commands.store(apply, Ordering::SeqCst);
    }

    pub fn set_status_latency(&self, latency: Duration) {
        self.status_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_control_latency(&self, latency: Duration) {
        self.control_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn control_calls(&self) -> u32 {
        self.control_calls.load(Ordering::SeqCst)
    }

    /// Peak number of status fetches that were outstanding at once.
    pub fn max_concurrent_status(&self) -> u32 {
        self.max_status_in_flight.load(Ordering::SeqCst)
    }

    /// Commands received, in order.
    pub fn received_commands(&self) -> Vec<ControlCommand> {
        lock(&self.commands).clone()
    }

    fn take_status_failure(&self) -> Option<ApiError> {
        let remaining = self.remaining_status_failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        self.remaining_status_failures
            .store(remaining - 1, Ordering::SeqCst);
        lock(&self.status_failure).clone()
    }

    async fn simulate_command(&self, command: &ControlCommand) {
        if !self.apply_commands.load(Ordering::SeqCst) {
            return;
        }
        let mut payload = self.status.write().await;
        if let Ok(status) = map_status(&payload) {
            *payload = encode_status(&status.with_command_applied(command));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

async fn delay(ms: &AtomicU64) {
    let ms = ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Decrements the in-flight counter even if the fetch future is dropped.
struct InFlight<'a>(&'a AtomicU32);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicU32, peak: &AtomicU32) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceApi for MockDeviceApi {
    async fn fetch_status(&self) -> Result<Value, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.status_in_flight, &self.max_status_in_flight);
        delay(&self.status_latency_ms).await;

        if let Some(err) = self.take_status_failure() {
            debug!(error = %err, "Mock status failure");
            return Err(err);
        }
        Ok(self.status.read().await.clone())
    }

    async fn fetch_history(&self, _query: HistoryQuery) -> Result<Value, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.history.read().await.clone())
    }

    async fn submit_control(&self, command: &ControlCommand) -> Result<CommandResult, ApiError> {
        self.control_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.commands).push(command.clone());
        delay(&self.control_latency_ms).await;

        let failure = lock(&self.control_failure).clone();
        if let Some(err) = failure {
            return Err(err);
        }
        if let Some(message) = self.rejection.read().await.clone() {
            return Ok(CommandResult {
                success: false,
                message,
            });
        }

        self.simulate_command(command).await;
        Ok(CommandResult {
            success: true,
            message: self.control_message.read().await.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wpctl_types::CompressorState;

    #[tokio::test]
    async fn test_default_status_maps() {
        let mock = MockDeviceApi::new();
        let status = map_status(&mock.fetch_status().await.unwrap()).unwrap();
        assert_eq!(status.compressor.state, CompressorState::Off);
        assert_eq!(mock.max_concurrent_status(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_counts_down() {
        let mock = MockDeviceApi::new();
        mock.fail_next(2, ApiError::Decode("eof".to_string()));
        assert!(mock.fetch_status().await.is_err());
        assert!(mock.fetch_status().await.is_err());
        assert!(mock.fetch_status().await.is_ok());
        assert_eq!(mock.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_accepted_command_changes_status() {
        let mock = MockDeviceApi::new();
        let reply = mock
            .submit_control(&ControlCommand::force_on())
            .await
            .unwrap();
        assert!(reply.success);

        let status = map_status(&mock.status_payload().await).unwrap();
        assert!(status.compressor.state.is_running());
        assert_eq!(mock.received_commands(), vec![ControlCommand::force_on()]);
    }

    #[tokio::test]
    async fn test_rejection_leaves_status() {
        let mock = MockDeviceApi::new();
        mock.reject_commands("Ungültiger Modus").await;
        let reply = mock
            .submit_control(&ControlCommand::bath_mode(true))
            .await
            .unwrap();
        assert!(!reply.success);
        assert!(!map_status(&mock.status_payload().await).unwrap().modes.bath);

        mock.clear_failures().await;
        assert!(
            mock.submit_control(&ControlCommand::bath_mode(true))
                .await
                .unwrap()
                .success
        );
    }
}
