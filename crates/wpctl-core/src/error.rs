//! Error types for wpctl-core.
//!
//! Errors are layered the same way requests flow through the crate:
//!
//! | Layer | Type | Raised by |
//! |-------|------|-----------|
//! | Transport | [`ApiError`] | [`DeviceApi`](crate::DeviceApi) implementations |
//! | Mapping | [`MapError`] | [`map_status`](crate::map_status), [`map_history`](crate::map_history) |
//! | Synchronization | [`SyncError`] | poller, dispatcher, [`DeviceSync`](crate::DeviceSync) |
//! | Store | [`StoreError`] | [`StateStore::apply`](crate::StateStore::apply) |
//!
//! ## Propagation
//!
//! | Error | During polling | During command dispatch |
//! |-------|----------------|-------------------------|
//! | [`ErrorKind::Transport`] | `Failed` view, polling continues | rollback + notice |
//! | [`ErrorKind::Parse`] | `Failed` view, polling continues | rollback + notice |
//! | [`ErrorKind::Busy`] | n/a | notice, view untouched |
//! | [`ErrorKind::Rejected`] | n/a | rollback + notice |
//!
//! None of these is fatal. Re-entrant store mutation is a programming error
//! and panics in debug builds.

use std::time::Duration;

use thiserror::Error;

/// Failure talking to the controller.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// The controller could not be reached.
    #[error("Controller not reachable at {url}: {message}")]
    NotReachable { url: String, message: String },

    /// The request did not complete in time.
    #[error("Request '{operation}' timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// The controller answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request could not be built or its body not read.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The response body was not valid JSON.
    #[error("Malformed response body: {0}")]
    Decode(String),

    /// The configured base URL is unusable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether the failure is about payload content rather than transport.
    pub fn is_decode(&self) -> bool {
        matches!(self, ApiError::Decode(_))
    }
}

/// A payload that fails structural mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MapError {
    /// A value had the wrong JSON type.
    #[error("expected {expected} at '{path}'")]
    WrongType {
        path: String,
        expected: &'static str,
    },

    /// A required envelope field is missing.
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// The body could not be decoded as JSON at all.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

impl MapError {
    pub(crate) fn wrong_type(path: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            path: path.into(),
            expected,
        }
    }
}

/// Errors surfaced by the synchronization layer.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Network, timeout or HTTP failure.
    #[error("Transport error: {0}")]
    Transport(ApiError),

    /// Payload failed structural mapping.
    #[error("Parse error: {0}")]
    Parse(#[from] MapError),

    /// A command is already in flight.
    #[error("Busy: '{pending}' is still in flight")]
    Busy { pending: String },

    /// The controller refused the command.
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// The poller has not been activated.
    #[error("Polling is not active")]
    Inactive,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Decode(msg) => SyncError::Parse(MapError::InvalidJson(msg)),
            other => SyncError::Transport(other),
        }
    }
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Parse,
    Busy,
    Rejected,
    Inactive,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Parse => "parse",
            ErrorKind::Busy => "busy",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Inactive => "inactive",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

impl SyncError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport(_) => ErrorKind::Transport,
            SyncError::Parse(_) => ErrorKind::Parse,
            SyncError::Busy { .. } => ErrorKind::Busy,
            SyncError::Rejected(_) => ErrorKind::Rejected,
            SyncError::Inactive => ErrorKind::Inactive,
            SyncError::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Errors from [`StateStore::apply`](crate::StateStore::apply).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// `apply` was called from inside an observer callback.
    #[error("re-entrant store mutation from an observer callback")]
    Reentrant,
}

/// Result type alias using wpctl-core's SyncError type.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::timeout("fetch_status", Duration::from_secs(10));
        assert!(err.to_string().contains("fetch_status"));
        assert!(err.to_string().contains("10s"));

        let err = ApiError::Http {
            status: 503,
            message: "System not initialized".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503: System not initialized");

        let err = MapError::MissingField("compressor".to_string());
        assert_eq!(err.to_string(), "missing required field 'compressor'");
    }

    #[test]
    fn test_decode_errors_classify_as_parse() {
        let err: SyncError = ApiError::Decode("expected value at line 1".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Parse);

        let err: SyncError = ApiError::NotReachable {
            url: "http://wp.local/status".to_string(),
            message: "connection refused".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_kind_for_command_errors() {
        assert_eq!(
            SyncError::Busy {
                pending: "bath_mode on".to_string()
            }
            .kind(),
            ErrorKind::Busy
        );
        assert_eq!(SyncError::Rejected("nope".to_string()).kind(), ErrorKind::Rejected);
        assert_eq!(ErrorKind::Transport.to_string(), "transport");
    }
}
