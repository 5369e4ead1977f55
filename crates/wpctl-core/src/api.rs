//! Trait abstraction for the controller's remote API.
//!
//! This module provides the [`DeviceApi`] trait that abstracts over the real
//! HTTP client and mock implementations for testing. The synchronization
//! layer only ever talks to the controller through this trait.

use async_trait::async_trait;
use serde_json::Value;

use wpctl_types::{CommandResult, ControlCommand};

use crate::error::{ApiError, SyncError};

/// Default look-back window for history requests.
pub const DEFAULT_HISTORY_HOURS: u32 = 6;

/// Default maximum number of history samples.
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Parameters of a history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    /// How far back to fetch, in hours (≥ 1).
    pub hours_back: u32,
    /// Maximum number of samples (≥ 1).
    pub limit: u32,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            hours_back: DEFAULT_HISTORY_HOURS,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl HistoryQuery {
    /// Create a query, validating both bounds.
    pub fn new(hours_back: u32, limit: u32) -> Result<Self, SyncError> {
        let query = Self { hours_back, limit };
        query.validate()?;
        Ok(query)
    }

    /// Check that both parameters are at least 1.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.hours_back == 0 {
            return Err(SyncError::invalid_config("hours_back must be >= 1"));
        }
        if self.limit == 0 {
            return Err(SyncError::invalid_config("limit must be >= 1"));
        }
        Ok(())
    }
}

/// Remote operations offered by the heat-pump controller.
///
/// Payloads are returned raw; turning them into domain types is the job of
/// [`map_status`](crate::map_status) and [`map_history`](crate::map_history),
/// so that mapping failures stay distinguishable from transport failures.
///
/// # Example
///
/// ```ignore
/// use wpctl_core::{DeviceApi, map_status};
///
/// async fn print_compressor<A: DeviceApi>(api: &A) -> wpctl_core::Result<()> {
///     let payload = api.fetch_status().await?;
///     let status = map_status(&payload)?;
///     println!("Compressor: {}", status.compressor.state);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Fetch the current status snapshot.
    async fn fetch_status(&self) -> Result<Value, ApiError>;

    /// Fetch a bounded time series.
    async fn fetch_history(&self, query: HistoryQuery) -> Result<Value, ApiError>;

    /// Submit a control command.
    async fn submit_control(&self, command: &ControlCommand) -> Result<CommandResult, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_query_defaults() {
        let q = HistoryQuery::default();
        assert_eq!(q.hours_back, 6);
        assert_eq!(q.limit, 100);
        assert!(q.validate().is_ok());
    }

    #[test]
    fn test_history_query_rejects_zero() {
        assert!(matches!(
            HistoryQuery::new(0, 10),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(matches!(
            HistoryQuery::new(6, 0),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(HistoryQuery::new(24, 1).is_ok());
    }
}
