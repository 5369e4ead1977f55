//! Tri-state views consumed by presentation.

use std::fmt;
use std::sync::Arc;

use crate::error::{ErrorKind, SyncError};

/// Monotonically increasing request tag, allocated per view.
///
/// Generation `0` is never issued; it means "nothing applied yet".
pub type Generation = u64;

/// Which of the two views an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Status,
    History,
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::Status => write!(f, "status"),
            ViewKind::History => write!(f, "history"),
        }
    }
}

/// Why a view is in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SyncError> for ViewError {
    fn from(err: &SyncError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// `Loading | Ready | Failed` for one piece of remote data.
///
/// Payloads are shared behind [`Arc`], so cloning a view is cheap and two
/// views can be compared by pointer with [`UiView::same_payload`].
#[derive(Debug)]
pub enum UiView<T> {
    Loading,
    Ready(Arc<T>),
    Failed(ViewError),
}

impl<T> Clone for UiView<T> {
    fn clone(&self) -> Self {
        match self {
            UiView::Loading => UiView::Loading,
            UiView::Ready(value) => UiView::Ready(Arc::clone(value)),
            UiView::Failed(err) => UiView::Failed(err.clone()),
        }
    }
}

impl<T: PartialEq> PartialEq for UiView<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (UiView::Loading, UiView::Loading) => true,
            (UiView::Ready(a), UiView::Ready(b)) => a == b,
            (UiView::Failed(a), UiView::Failed(b)) => a == b,
            _ => false,
        }
    }
}

impl<T> UiView<T> {
    /// Build a `Ready` view from an owned value.
    pub fn ready(value: T) -> Self {
        UiView::Ready(Arc::new(value))
    }

    /// Build a `Failed` view from a synchronization error.
    pub fn failed(err: &SyncError) -> Self {
        UiView::Failed(ViewError::from(err))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, UiView::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, UiView::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UiView::Failed(_))
    }

    /// The payload, if `Ready`.
    pub fn value(&self) -> Option<&Arc<T>> {
        match self {
            UiView::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// The failure, if `Failed`.
    pub fn error(&self) -> Option<&ViewError> {
        match self {
            UiView::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Whether both views are `Ready` with the very same allocation.
    pub fn same_payload(&self, other: &Self) -> bool {
        match (self, other) {
            (UiView::Ready(a), UiView::Ready(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Short tag for logs.
    pub fn tag(&self) -> &'static str {
        match self {
            UiView::Loading => "loading",
            UiView::Ready(_) => "ready",
            UiView::Failed(_) => "failed",
        }
    }
}

impl<T> Default for UiView<T> {
    fn default() -> Self {
        UiView::Loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    #[test]
    fn test_view_error_from_sync_error() {
        let err = SyncError::from(ApiError::Http {
            status: 503,
            message: "System not initialized".to_string(),
        });
        let view: UiView<u32> = UiView::failed(&err);
        let failure = view.error().unwrap();
        assert_eq!(failure.kind, ErrorKind::Transport);
        assert!(failure.message.contains("503"));
    }

    #[test]
    fn test_same_payload_is_pointer_identity() {
        let a = UiView::ready(5u32);
        let b = a.clone();
        let c = UiView::ready(5u32);
        assert!(a.same_payload(&b));
        assert!(!a.same_payload(&c));
        assert_eq!(a, c);
    }

    #[test]
    fn test_exactly_one_tag() {
        let views: [UiView<u8>; 3] = [
            UiView::Loading,
            UiView::ready(1),
            UiView::Failed(ViewError {
                kind: ErrorKind::Parse,
                message: "bad".to_string(),
            }),
        ];
        for view in &views {
            let tags = [view.is_loading(), view.is_ready(), view.is_failed()];
            assert_eq!(tags.iter().filter(|t| **t).count(), 1, "{}", view.tag());
        }
    }
}
