//! Control commands with optimistic feedback.
//!
//! A dispatch goes through these steps:
//!
//! 1. Claim the single pending slot, or fail with [`SyncError::Busy`].
//! 2. Apply the locally predicted status as optimistic.
//! 3. Submit the command.
//! 4. On success, force a reconciling poll, then settle the optimistic marker.
//! 5. On failure, roll back to the last authoritative status and publish a
//!    [`Notice`].
//!
//! The pending slot is held by a [`PendingGuard`]. If the dispatch future is
//! dropped half-way the guard frees the slot; it rolls back if the controller
//! has not accepted the command yet and settles the prediction otherwise.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use wpctl_types::{ControlCommand, DeviceStatus};

use crate::api::DeviceApi;
use crate::error::{Result, SyncError};
use crate::poller::PollerHandle;
use crate::refresh::{RefreshOutcome, Refresher};
use crate::store::{Notice, StateStore, Update};

/// Slot shared with the owner of the poller, used for reconciliation.
pub type PollerSlot = Arc<Mutex<Option<PollerHandle>>>;

/// A command that has been submitted and not yet resolved.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub command: ControlCommand,
    /// Prediction applied to the status view, if one was shown.
    pub optimistic: Option<Arc<DeviceStatus>>,
    pub started: Instant,
}

/// A command the controller accepted.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub command: ControlCommand,
    /// Message returned by the controller.
    pub message: String,
    /// The reconciling poll that followed.
    pub reconciliation: RefreshOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
    /// Nothing to undo.
    Idle,
    /// A prediction is shown and the command is unconfirmed.
    Predicted,
    /// The controller accepted the command; the prediction stands.
    Accepted,
}

/// Holds the pending slot for one dispatch.
///
/// What a drop does to the status view depends on how far the dispatch got:
/// an unconfirmed prediction is rolled back, an accepted one is settled.
/// Either way the slot is freed.
pub struct PendingGuard {
    slot: Arc<Mutex<Option<PendingCommand>>>,
    store: Arc<StateStore>,
    state: GuardState,
}

impl PendingGuard {
    fn new(slot: Arc<Mutex<Option<PendingCommand>>>, store: Arc<StateStore>) -> Self {
        Self {
            slot,
            store,
            state: GuardState::Idle,
        }
    }

    /// Roll back on drop unless [`accept`](Self::accept)ed or
    /// [`disarm`](Self::disarm)ed.
    fn arm(&mut self) {
        self.state = GuardState::Predicted;
    }

    /// Settle on drop; only meaningful once a prediction is shown.
    fn accept(&mut self) {
        if self.state == GuardState::Predicted {
            self.state = GuardState::Accepted;
        }
    }

    fn disarm(&mut self) {
        self.state = GuardState::Idle;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        match self.state {
            GuardState::Idle => {}
            GuardState::Predicted => {
                warn!("Command dispatch abandoned, rolling back");
                self.store.submit(Update::Rollback);
            }
            GuardState::Accepted => {
                debug!("Command dispatch abandoned after acceptance, keeping prediction");
                self.store.submit(Update::SettleOptimistic);
            }
        }
        lock(&self.slot).take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dispatches one command at a time.
#[derive(Clone)]
pub struct CommandDispatcher {
    refresher: Refresher,
    poller: PollerSlot,
    pending: Arc<Mutex<Option<PendingCommand>>>,
}

impl CommandDispatcher {
    pub fn new(refresher: Refresher, poller: PollerSlot) -> Self {
        Self {
            refresher,
            poller,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    fn store(&self) -> &Arc<StateStore> {
        self.refresher.store()
    }

    fn api(&self) -> &Arc<dyn DeviceApi> {
        self.refresher.api()
    }

    /// The command currently in flight, if any.
    pub fn pending(&self) -> Option<PendingCommand> {
        lock(&self.pending).clone()
    }

    /// Send `command` to the controller.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Busy`] if another command is in flight; the status view
    ///   is not touched.
    /// - [`SyncError::Rejected`] if the controller replied `success: false`.
    /// - [`SyncError::Transport`] / [`SyncError::Parse`] if the request failed.
    ///
    /// Every error is also published as a [`Notice`].
    pub async fn dispatch(&self, command: ControlCommand) -> Result<CommandOutcome> {
        let (mut guard, predicted) = self.claim(&command)?;

        if let Some(predicted) = predicted {
            self.store().submit(Update::Optimistic(predicted));
            guard.arm();
        }

        debug!(%command, "Submitting command");
        let result = match self.api().submit_control(&command).await {
            Ok(reply) if reply.success => Ok(reply),
            Ok(reply) => Err(SyncError::Rejected(reply.message)),
            Err(e) => Err(SyncError::from(e)),
        };

        match result {
            Ok(reply) => {
                info!(%command, message = %reply.message, "Command accepted");
                guard.accept();
                let reconciliation = self.reconcile().await;
                self.store().submit(Update::SettleOptimistic);
                guard.disarm();
                Ok(CommandOutcome {
                    command,
                    message: reply.message,
                    reconciliation,
                })
            }
            Err(e) => {
                warn!(%command, error = %e, "Command failed");
                self.store().submit(Update::Rollback);
                guard.disarm();
                drop(guard);
                self.store()
                    .submit(Update::Notify(Notice::command_failed(&command, &e)));
                Err(e)
            }
        }
    }

    fn claim(
        &self,
        command: &ControlCommand,
    ) -> Result<(PendingGuard, Option<Arc<DeviceStatus>>)> {
        let optimistic = self
            .store()
            .status_view()
            .value()
            .map(|status| Arc::new(status.with_command_applied(command)));

        let busy = {
            let mut slot = lock(&self.pending);
            match slot.as_ref() {
                Some(pending) => Some(SyncError::Busy {
                    pending: pending.command.to_string(),
                }),
                None => {
                    *slot = Some(PendingCommand {
                        command: command.clone(),
                        optimistic: optimistic.clone(),
                        started: Instant::now(),
                    });
                    None
                }
            }
        };

        if let Some(err) = busy {
            debug!(%command, "Dispatch rejected as busy");
            self.store()
                .submit(Update::Notify(Notice::command_failed(command, &err)));
            return Err(err);
        }
        let guard = PendingGuard::new(Arc::clone(&self.pending), Arc::clone(self.store()));
        Ok((guard, optimistic))
    }

    /// Force a poll through the running poller, or a one-shot refresh.
    async fn reconcile(&self) -> RefreshOutcome {
        let client = lock(&self.poller).as_ref().map(PollerHandle::client);
        if let Some(client) = client {
            match client.refresh_now().await {
                Ok(outcome) => return outcome,
                Err(e) => debug!(error = %e, "Poller unavailable for reconciliation"),
            }
        }
        self.refresher.refresh_status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ErrorKind};
    use crate::mock::MockDeviceApi;
    use crate::store::StoreEvent;
    use std::time::Duration;

    async fn ready_dispatcher() -> (Arc<MockDeviceApi>, Arc<StateStore>, CommandDispatcher) {
        let mock = Arc::new(MockDeviceApi::new());
        let store = Arc::new(StateStore::new());
        let refresher = Refresher::new(mock.clone(), Arc::clone(&store));
        refresher.refresh_status().await;
        let dispatcher = CommandDispatcher::new(refresher, Arc::new(Mutex::new(None)));
        (mock, store, dispatcher)
    }

    #[tokio::test]
    async fn test_success_is_confirmed_by_poll() {
        let (mock, store, dispatcher) = ready_dispatcher().await;
        let outcome = dispatcher
            .dispatch(ControlCommand::bath_mode(true))
            .await
            .unwrap();

        assert!(outcome.reconciliation.is_ok());
        assert_eq!(mock.status_calls(), 2);
        assert!(store.status_view().value().unwrap().modes.bath);
        assert!(!store.is_optimistic());
        assert!(dispatcher.pending().is_none());
    }

    #[tokio::test]
    async fn test_poll_corrects_wrong_prediction() {
        let (mock, store, dispatcher) = ready_dispatcher().await;
        mock.set_apply_commands(false);

        dispatcher
            .dispatch(ControlCommand::force_on())
            .await
            .unwrap();
        assert_eq!(
            store.status_view().value().unwrap().compressor.state,
            wpctl_types::CompressorState::Off
        );
    }

    #[tokio::test]
    async fn test_failure_rolls_back_with_notice() {
        let (mock, store, dispatcher) = ready_dispatcher().await;
        let before = store.status_view();
        mock.fail_commands(ApiError::Http {
            status: 503,
            message: "System not initialized".to_string(),
        });

        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        store.subscribe(move |event| {
            if let StoreEvent::Notice(n) = event {
                sink.lock().unwrap().push(n.clone());
            }
        });

        let err = dispatcher
            .dispatch(ControlCommand::holiday_mode(true, Some(24)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(store.status_view().same_payload(&before));
        assert!(!store.is_optimistic());
        assert!(dispatcher.pending().is_none());

        let notices = notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].command.as_deref(), Some("holiday_mode on for 24h"));
    }

    #[tokio::test]
    async fn test_rejected_reply() {
        let (mock, store, dispatcher) = ready_dispatcher().await;
        mock.reject_commands("Ungültiger Modus").await;

        let err = dispatcher
            .dispatch(ControlCommand::bath_mode(true))
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::Rejected("Ungültiger Modus".to_string()));
        assert!(!store.status_view().value().unwrap().modes.bath);
        assert_eq!(mock.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_dispatch_is_busy() {
        let (mock, store, dispatcher) = ready_dispatcher().await;
        mock.set_control_latency(Duration::from_secs(1));

        let transitions = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&transitions);
        store.subscribe(move |event| {
            if matches!(event, StoreEvent::Status { optimistic: true, .. }) {
                *sink.lock().unwrap() += 1;
            }
        });

        let first = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch(ControlCommand::bath_mode(true)).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = dispatcher.dispatch(ControlCommand::bath_mode(true)).await;
        assert!(matches!(second, Err(SyncError::Busy { .. })));
        assert_eq!(*transitions.lock().unwrap(), 1);

        first.await.unwrap().unwrap();
        assert_eq!(mock.control_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_dispatch_rolls_back() {
        let (mock, store, dispatcher) = ready_dispatcher().await;
        mock.set_control_latency(Duration::from_secs(5));
        let before = store.status_view();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            dispatcher.dispatch(ControlCommand::force_on()),
        )
        .await;
        assert!(result.is_err());
        assert!(store.status_view().same_payload(&before));
        assert!(dispatcher.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_after_acceptance_keeps_prediction() {
        let (mock, store, dispatcher) = ready_dispatcher().await;
        mock.set_status_latency(Duration::from_secs(5));

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            dispatcher.dispatch(ControlCommand::force_on()),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(mock.control_calls(), 1);
        assert!(store.status_view().value().unwrap().compressor.state.is_running());
        assert!(!store.is_optimistic());
        assert!(dispatcher.pending().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_without_status_skips_prediction() {
        let mock = Arc::new(MockDeviceApi::new());
        let store = Arc::new(StateStore::new());
        let dispatcher = CommandDispatcher::new(
            Refresher::new(mock.clone(), Arc::clone(&store)),
            Arc::new(Mutex::new(None)),
        );

        dispatcher
            .dispatch(ControlCommand::force_off())
            .await
            .unwrap();
        assert!(store.status_view().is_ready());
        assert!(!store.is_optimistic());
    }
}
