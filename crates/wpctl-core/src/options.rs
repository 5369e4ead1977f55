//! Tuning for [`DeviceSync`](crate::DeviceSync).

use std::time::Duration;

use crate::api::HistoryQuery;
use crate::error::{Result, SyncError};
use crate::poller::DEFAULT_POLL_INTERVAL;

/// Shortest accepted polling period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for the synchronization layer.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use wpctl_core::{HistoryQuery, SyncOptions};
///
/// let options = SyncOptions::default()
///     .poll_interval(Duration::from_secs(10))
///     .history(HistoryQuery::new(24, 288).unwrap());
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Period between scheduled polls.
    pub poll_interval: Duration,
    /// Query used by [`DeviceSync::load_default_history`](crate::DeviceSync::load_default_history).
    pub history: HistoryQuery,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            history: HistoryQuery::default(),
        }
    }
}

impl SyncOptions {
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn history(mut self, query: HistoryQuery) -> Self {
        self.history = query;
        self
    }

    /// Validate the options.
    ///
    /// Returns an error if the polling period is shorter than
    /// [`MIN_POLL_INTERVAL`] or the history query is out of bounds.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(SyncError::invalid_config(format!(
                "poll_interval must be at least {:?}, got {:?}",
                MIN_POLL_INTERVAL, self.poll_interval
            )));
        }
        self.history.validate()
    }
}
