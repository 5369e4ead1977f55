//! The single source of truth for status and history views.
//!
//! [`StateStore`] owns both views. Everything else (poller, dispatcher,
//! history loads) submits candidate [`Update`]s through
//! [`StateStore::apply`], which decides whether the update is current enough
//! to take effect and then notifies observers synchronously, in order.
//!
//! # Generations
//!
//! Every request is tagged with a [`Generation`] from [`StateStore::begin`].
//! A completion is applied only if its generation is newer than both the last
//! applied completion and the abandon watermark of its view:
//!
//! ```text
//! begin -> g1        begin -> g2
//!    |                  |
//!    |                  +--- completes: applied (g2 > 0)
//!    +--------------------------- completes: Stale (g1 < g2)
//! ```
//!
//! # Observers
//!
//! Listeners registered with [`StateStore::subscribe`] run on the thread that
//! called `apply`, after the state change, in registration order. They may
//! read the store but must not call `apply`; doing so panics in debug builds
//! and returns [`StoreError::Reentrant`] otherwise. Async consumers can use
//! [`StateStore::watch`] instead.

use std::cell::Cell;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error};

use wpctl_types::{DeviceStatus, HistorySeries};

use crate::error::{ErrorKind, StoreError, SyncError};
use crate::view::{Generation, UiView, ViewKind};

thread_local! {
    static NOTIFYING: Cell<bool> = const { Cell::new(false) };
}

/// A transient, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: ErrorKind,
    /// Display form of the command the notice is about, if any.
    pub command: Option<String>,
    pub message: String,
}

impl Notice {
    /// Notice for a failed command.
    pub fn command_failed(command: impl fmt::Display, err: &SyncError) -> Self {
        Self {
            kind: err.kind(),
            command: Some(command.to_string()),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.command {
            Some(command) => write!(f, "{command}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A candidate state change.
#[derive(Debug, Clone)]
pub enum Update {
    /// Loading marker or completion of a status request.
    Status {
        generation: Generation,
        view: UiView<DeviceStatus>,
    },
    /// Loading marker or completion of a history request.
    History {
        generation: Generation,
        view: UiView<HistorySeries>,
    },
    /// Locally predicted status; marks the status view optimistic.
    Optimistic(Arc<DeviceStatus>),
    /// Revert to the last authoritative status and clear the marker.
    Rollback,
    /// Keep the current status and clear the marker.
    SettleOptimistic,
    /// Drop the completions of every generation issued so far.
    Abandon(ViewKind),
    /// Publish a notice without touching either view.
    Notify(Notice),
}

/// What [`StateStore::apply`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The state changed (or the notice was published).
    Applied,
    /// A completion older than what is already shown, or abandoned.
    Stale,
    /// Not applicable in the current state.
    Ignored,
}

/// Delivered to listeners after each applied update.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Status {
        view: UiView<DeviceStatus>,
        optimistic: bool,
    },
    History(UiView<HistorySeries>),
    Notice(Notice),
}

/// Both views at one instant.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub status: UiView<DeviceStatus>,
    /// The status view shows a local prediction not yet confirmed.
    pub optimistic: bool,
    pub history: UiView<HistorySeries>,
    /// Generation of the status completion currently shown (0 if none).
    pub status_generation: Generation,
    pub history_generation: Generation,
}

/// Handle returned by [`StateStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

#[derive(Debug)]
struct Slot<T> {
    view: UiView<T>,
    issued: Generation,
    applied: Generation,
    abandoned_through: Generation,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            view: UiView::Loading,
            issued: 0,
            applied: 0,
            abandoned_through: 0,
        }
    }
}

impl<T> Slot<T> {
    fn begin(&mut self) -> Generation {
        self.issued += 1;
        self.issued
    }

    fn is_stale(&self, generation: Generation) -> bool {
        generation <= self.applied || generation <= self.abandoned_through
    }

    fn abandon(&mut self) {
        self.abandoned_through = self.issued;
    }

    /// Shared generation rules for both views.
    fn accept(&mut self, generation: Generation, view: &UiView<T>) -> ApplyOutcome {
        if view.is_loading() {
            if self.is_stale(generation) || self.view.is_loading() {
                return ApplyOutcome::Ignored;
            }
        } else if self.is_stale(generation) {
            return ApplyOutcome::Stale;
        } else {
            self.applied = generation;
        }
        self.view = view.clone();
        ApplyOutcome::Applied
    }
}

#[derive(Default)]
struct Inner {
    status: Slot<DeviceStatus>,
    history: Slot<HistorySeries>,
    optimistic: bool,
    /// Last status view that came from the controller.
    authoritative: UiView<DeviceStatus>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl Inner {
    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            status: self.status.view.clone(),
            optimistic: self.optimistic,
            history: self.history.view.clone(),
            status_generation: self.status.applied,
            history_generation: self.history.applied,
        }
    }

    fn status_event(&self) -> StoreEvent {
        StoreEvent::Status {
            view: self.status.view.clone(),
            optimistic: self.optimistic,
        }
    }

    fn reduce(&mut self, update: Update) -> (ApplyOutcome, Option<StoreEvent>) {
        match update {
            Update::Status { generation, view } => {
                if view.is_loading() && self.optimistic {
                    return (ApplyOutcome::Ignored, None);
                }
                let outcome = self.status.accept(generation, &view);
                if outcome != ApplyOutcome::Applied {
                    debug!(generation, ?outcome, view = view.tag(), "Status update not applied");
                    return (outcome, None);
                }
                if !view.is_loading() {
                    // Keeps the optimistic marker; only the command clears it.
                    self.authoritative = view;
                }
                (outcome, Some(self.status_event()))
            }
            Update::History { generation, view } => {
                let outcome = self.history.accept(generation, &view);
                if outcome != ApplyOutcome::Applied {
                    debug!(generation, ?outcome, view = view.tag(), "History update not applied");
                    return (outcome, None);
                }
                (outcome, Some(StoreEvent::History(view)))
            }
            Update::Optimistic(predicted) => {
                self.optimistic = true;
                self.status.view = UiView::Ready(predicted);
                (ApplyOutcome::Applied, Some(self.status_event()))
            }
            Update::Rollback => {
                if !self.optimistic {
                    return (ApplyOutcome::Ignored, None);
                }
                self.optimistic = false;
                self.status.view = self.authoritative.clone();
                (ApplyOutcome::Applied, Some(self.status_event()))
            }
            Update::SettleOptimistic => {
                if !self.optimistic {
                    return (ApplyOutcome::Ignored, None);
                }
                self.optimistic = false;
                (ApplyOutcome::Applied, Some(self.status_event()))
            }
            Update::Abandon(kind) => {
                match kind {
                    ViewKind::Status => self.status.abandon(),
                    ViewKind::History => self.history.abandon(),
                }
                (ApplyOutcome::Applied, None)
            }
            Update::Notify(notice) => (ApplyOutcome::Applied, Some(StoreEvent::Notice(notice))),
        }
    }
}

/// Owner of the status and history views.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use wpctl_core::{ApplyOutcome, StateStore, UiView, Update, ViewKind};
/// use wpctl_types::{Compressor, CompressorState, DeviceStatus};
///
/// let store = StateStore::new();
/// let g1 = store.begin(ViewKind::Status);
/// let g2 = store.begin(ViewKind::Status);
///
/// let status = |s| UiView::ready(DeviceStatus::new(Compressor::new(s)));
/// let newer = Update::Status { generation: g2, view: status(CompressorState::Running) };
/// let older = Update::Status { generation: g1, view: status(CompressorState::Off) };
///
/// assert_eq!(store.apply(newer).unwrap(), ApplyOutcome::Applied);
/// assert_eq!(store.apply(older).unwrap(), ApplyOutcome::Stale);
/// assert!(store.status_view().value().unwrap().compressor.state.is_running());
/// ```
pub struct StateStore {
    inner: Mutex<Inner>,
    /// Serializes apply + notify so observers see one total order.
    delivery: Mutex<()>,
    snapshots: watch::Sender<StoreSnapshot>,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("StateStore")
            .field("status", &inner.status.view.tag())
            .field("optimistic", &inner.optimistic)
            .field("history", &inner.history.view.tag())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create a store with both views `Loading`.
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(StoreSnapshot::default());
        Self {
            inner: Mutex::new(Inner::default()),
            delivery: Mutex::new(()),
            snapshots,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next generation for a request against `kind`.
    pub fn begin(&self, kind: ViewKind) -> Generation {
        let mut inner = self.lock();
        match kind {
            ViewKind::Status => inner.status.begin(),
            ViewKind::History => inner.history.begin(),
        }
    }

    /// The only mutation entry point.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reentrant`] when called from inside a listener
    /// (release builds only; debug builds panic).
    pub fn apply(&self, update: Update) -> Result<ApplyOutcome, StoreError> {
        if NOTIFYING.with(Cell::get) {
            if cfg!(debug_assertions) {
                panic!("StateStore::apply called from an observer callback");
            }
            return Err(StoreError::Reentrant);
        }

        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let (outcome, event, listeners) = {
            let mut inner = self.lock();
            let (outcome, event) = inner.reduce(update);
            if event.is_some() {
                self.snapshots.send_replace(inner.snapshot());
            }
            let listeners: Vec<Listener> = match event {
                Some(_) => inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => Vec::new(),
            };
            (outcome, event, listeners)
        };

        if let Some(event) = event {
            let _flag = NotifyingFlag::set();
            for listener in &listeners {
                listener(&event);
            }
        }
        Ok(outcome)
    }

    /// [`apply`](Self::apply) for internal callers that never run inside a
    /// listener. A re-entrancy error is logged and reported as `Ignored`.
    pub(crate) fn submit(&self, update: Update) -> ApplyOutcome {
        self.apply(update).unwrap_or_else(|e| {
            error!(error = %e, "Store update rejected");
            ApplyOutcome::Ignored
        })
    }

    pub fn status_view(&self) -> UiView<DeviceStatus> {
        self.lock().status.view.clone()
    }

    pub fn history_view(&self) -> UiView<HistorySeries> {
        self.lock().history.view.clone()
    }

    /// Whether the status view shows an unconfirmed prediction.
    pub fn is_optimistic(&self) -> bool {
        self.lock().optimistic
    }

    /// Both views at one instant.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().snapshot()
    }

    /// Register a synchronous listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_listener += 1;
        let id = ListenerId(inner.next_listener);
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _)| *lid != id);
        inner.listeners.len() != before
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.subscribe()
    }
}

/// Marks the current thread as delivering notifications until dropped.
struct NotifyingFlag;

impl NotifyingFlag {
    fn set() -> Self {
        NOTIFYING.with(|f| f.set(true));
        Self
    }
}

impl Drop for NotifyingFlag {
    fn drop(&mut self) {
        NOTIFYING.with(|f| f.set(false));
    }
}
