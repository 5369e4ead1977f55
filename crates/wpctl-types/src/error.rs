//! Error types for value parsing in wpctl-types.

use thiserror::Error;

/// Errors that can occur when parsing controller values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A runtime string was not in `H:MM:SS` or `N day(s), H:MM:SS` form.
    #[error("Invalid runtime '{0}': expected H:MM:SS or 'N days, H:MM:SS'")]
    InvalidRuntime(String),

    /// A timestamp could not be parsed.
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// A clock time could not be parsed.
    #[error("Invalid time of day '{0}': expected HH:MM:SS")]
    InvalidTimeOfDay(String),
}

/// Result type alias using wpctl-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
