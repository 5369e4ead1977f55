//! The presentation-facing façade.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::info;

use wpctl_types::{ControlCommand, DeviceStatus, HistorySeries};

use crate::api::{DeviceApi, HistoryQuery};
use crate::dispatcher::{CommandDispatcher, CommandOutcome, PendingCommand, PollerSlot};
use crate::error::{Result, SyncError};
use crate::options::SyncOptions;
use crate::poller::{Poller, PollerHandle};
use crate::refresh::{RefreshOutcome, Refresher};
use crate::store::{ListenerId, StateStore, StoreEvent, StoreSnapshot, Update};
use crate::view::{UiView, ViewKind};

/// Synchronizes a local mirror of one controller.
///
/// `DeviceSync` wires a [`StateStore`], a [`Poller`] and a
/// [`CommandDispatcher`] around one [`DeviceApi`]. Polling runs between
/// [`activate`](Self::activate) and [`deactivate`](Self::deactivate), which
/// are meant to follow the lifecycle of whatever is displaying the data.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use wpctl_core::{DeviceSync, MockDeviceApi, SyncOptions};
/// use wpctl_types::ControlCommand;
///
/// #[tokio::main]
/// async fn main() -> wpctl_core::Result<()> {
///     let sync = DeviceSync::new(Arc::new(MockDeviceApi::new()), SyncOptions::default())?;
///     sync.activate();
///
///     let outcome = sync.dispatch_command(ControlCommand::bath_mode(true)).await?;
///     assert!(outcome.reconciliation.is_ok());
///     assert!(sync.status_view().value().unwrap().modes.bath);
///
///     sync.deactivate();
///     Ok(())
/// }
/// ```
pub struct DeviceSync {
    store: Arc<StateStore>,
    refresher: Refresher,
    dispatcher: CommandDispatcher,
    poller: PollerSlot,
    options: SyncOptions,
}

impl std::fmt::Debug for DeviceSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSync")
            .field("store", &self.store)
            .field("active", &self.is_active())
            .field("options", &self.options)
            .finish()
    }
}

impl DeviceSync {
    /// Create an inactive synchronizer.
    pub fn new(api: Arc<dyn DeviceApi>, options: SyncOptions) -> Result<Self> {
        options.validate()?;
        let store = Arc::new(StateStore::new());
        let refresher = Refresher::new(api, Arc::clone(&store));
        let poller: PollerSlot = Arc::new(Mutex::new(None));
        let dispatcher = CommandDispatcher::new(refresher.clone(), Arc::clone(&poller));
        Ok(Self {
            store,
            refresher,
            dispatcher,
            poller,
            options,
        })
    }

    fn poller(&self) -> MutexGuard<'_, Option<PollerHandle>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start polling. Returns `false` if polling was already active.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate(&self) -> bool {
        let mut slot = self.poller();
        if slot.as_ref().is_some_and(PollerHandle::is_active) {
            return false;
        }
        info!(interval = ?self.options.poll_interval, "Activating device sync");
        let poller = Poller::new(self.refresher.clone(), self.options.poll_interval);
        *slot = Some(poller.spawn());
        true
    }

    /// Stop polling and drop every in-flight result. Returns `false` if
    /// polling was not active.
    pub fn deactivate(&self) -> bool {
        let Some(handle) = self.poller().take() else {
            return false;
        };
        handle.stop();
        self.store.submit(Update::Abandon(ViewKind::Status));
        self.store.submit(Update::Abandon(ViewKind::History));
        info!("Device sync deactivated");
        true
    }

    pub fn is_active(&self) -> bool {
        self.poller().as_ref().is_some_and(PollerHandle::is_active)
    }

    /// Ask the poller for an out-of-schedule refresh.
    ///
    /// # Errors
    ///
    /// [`SyncError::Inactive`] if polling is not active.
    pub fn request_manual_refresh(&self) -> Result<()> {
        match self.poller().as_ref() {
            Some(handle) => handle.request_refresh(),
            None => Err(SyncError::Inactive),
        }
    }

    /// Refresh and wait for the result.
    ///
    /// Goes through the poller when active, otherwise performs a one-shot
    /// request.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        let client = self.poller().as_ref().map(PollerHandle::client);
        if let Some(client) = client
            && let Ok(outcome) = client.refresh_now().await
        {
            return outcome;
        }
        self.refresher.refresh_status().await
    }

    /// Send a control command with optimistic feedback.
    pub async fn dispatch_command(&self, command: ControlCommand) -> Result<CommandOutcome> {
        self.dispatcher.dispatch(command).await
    }

    /// Load history into the history view.
    pub async fn load_history(&self, query: HistoryQuery) -> Result<Arc<HistorySeries>> {
        self.refresher.load_history(query).await
    }

    /// Load history using [`SyncOptions::history`].
    pub async fn load_default_history(&self) -> Result<Arc<HistorySeries>> {
        self.load_history(self.options.history).await
    }

    pub fn status_view(&self) -> UiView<DeviceStatus> {
        self.store.status_view()
    }

    pub fn history_view(&self) -> UiView<HistorySeries> {
        self.store.history_view()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn pending_command(&self) -> Option<PendingCommand> {
        self.dispatcher.pending()
    }

    /// Register a synchronous listener. See [`StateStore::subscribe`].
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Receiver holding the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.store.watch()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }
}

impl Drop for DeviceSync {
    fn drop(&mut self) {
        if let Some(handle) = self.poller().take() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDeviceApi;
    use std::time::Duration;

    fn sync_with(mock: &Arc<MockDeviceApi>) -> DeviceSync {
        DeviceSync::new(mock.clone(), SyncOptions::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let mock: Arc<dyn DeviceApi> = Arc::new(MockDeviceApi::new());
        let options = SyncOptions::default().poll_interval(Duration::ZERO);
        assert!(matches!(
            DeviceSync::new(mock, options),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_refresh_requires_activation() {
        let mock = Arc::new(MockDeviceApi::new());
        let sync = sync_with(&mock);
        assert_eq!(sync.request_manual_refresh(), Err(SyncError::Inactive));
        assert!(!sync.deactivate());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_is_idempotent() {
        let mock = Arc::new(MockDeviceApi::new());
        let sync = sync_with(&mock);
        assert!(sync.activate());
        assert!(!sync.activate());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mock.status_calls(), 1);
        assert!(sync.is_active());

        assert!(sync.deactivate());
        assert!(!sync.is_active());
        assert!(sync.activate());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mock.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_now_without_poller() {
        let mock = Arc::new(MockDeviceApi::new());
        let sync = sync_with(&mock);
        let outcome = sync.refresh_now().await;
        assert!(outcome.is_ok());
        assert!(sync.status_view().is_ready());
    }
}
