//! Single-flight periodic status polling.
//!
//! The poller is a spawned task driven by `tokio::select!` over a
//! cancellation token, an interval timer, a request channel and the one
//! in-flight refresh. The scheduling decisions themselves live in
//! [`SingleFlight`], a plain state machine that can be tested exhaustively
//! without a runtime.
//!
//! | Trigger | Idle | Request in flight |
//! |---------|------|-------------------|
//! | Timer tick | start | coalesced into the running request |
//! | Manual refresh | start | one follow-up after completion |

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, OptionFuture};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::refresh::{RefreshOutcome, Refresher};
use crate::store::{StateStore, Update};
use crate::view::ViewKind;

/// Default polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Tick,
    Manual,
}

/// What the poller should do about a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightAction {
    /// Start a request now.
    Start,
    /// Satisfied by the request already in flight.
    Coalesced,
    /// Start one follow-up when the current request completes.
    Deferred,
}

/// Single-flight scheduling state.
///
/// # Example
///
/// ```
/// use wpctl_core::{FlightAction, SingleFlight, Trigger};
///
/// let mut flight = SingleFlight::default();
/// assert_eq!(flight.on_trigger(Trigger::Tick), FlightAction::Start);
/// assert_eq!(flight.on_trigger(Trigger::Tick), FlightAction::Coalesced);
/// assert_eq!(flight.on_trigger(Trigger::Manual), FlightAction::Deferred);
/// assert_eq!(flight.on_trigger(Trigger::Manual), FlightAction::Deferred);
///
/// // The deferred requests collapse into exactly one follow-up.
/// assert!(flight.on_complete());
/// assert!(!flight.on_complete());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    in_flight: bool,
    follow_up: bool,
}

impl SingleFlight {
    pub fn on_trigger(&mut self, trigger: Trigger) -> FlightAction {
        if !self.in_flight {
            self.in_flight = true;
            return FlightAction::Start;
        }
        match trigger {
            Trigger::Tick => FlightAction::Coalesced,
            Trigger::Manual => {
                self.follow_up = true;
                FlightAction::Deferred
            }
        }
    }

    /// Record completion. Returns `true` if a follow-up starts right away.
    pub fn on_complete(&mut self) -> bool {
        self.in_flight = mem::take(&mut self.follow_up);
        self.in_flight
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn follow_up_pending(&self) -> bool {
        self.follow_up
    }
}

type Waiter = oneshot::Sender<RefreshOutcome>;

enum PollRequest {
    Refresh(Option<Waiter>),
}

/// Cloneable way to ask a running poller for refreshes.
#[derive(Clone)]
pub struct PollerClient {
    tx: mpsc::UnboundedSender<PollRequest>,
}

impl PollerClient {
    /// Request a refresh without waiting for it.
    pub fn request_refresh(&self) -> Result<()> {
        self.tx
            .send(PollRequest::Refresh(None))
            .map_err(|_| SyncError::Inactive)
    }

    /// Request a refresh and wait for a request started after this call.
    pub async fn refresh_now(&self) -> Result<RefreshOutcome> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(PollRequest::Refresh(Some(tx)))
            .map_err(|_| SyncError::Inactive)?;
        rx.await.map_err(|_| SyncError::Inactive)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handle to a running poller task.
///
/// Dropping the handle stops the poller.
pub struct PollerHandle {
    client: PollerClient,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn client(&self) -> PollerClient {
        self.client.clone()
    }

    pub fn request_refresh(&self) -> Result<()> {
        self.client.request_refresh()
    }

    pub async fn refresh_now(&self) -> Result<RefreshOutcome> {
        self.client.refresh_now().await
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.client.is_closed()
    }

    /// Stop the timer and drop the in-flight request.
    pub fn stop(mut self) {
        self.cancel.cancel();
        self.task.take();
    }

    /// Stop and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Periodic status poller.
pub struct Poller {
    refresher: Refresher,
    period: Duration,
}

impl Poller {
    pub fn new(refresher: Refresher, period: Duration) -> Self {
        Self { refresher, period }
    }

    /// Spawn the polling task. The first refresh starts immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> PollerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(rx, cancel.clone()));
        PollerHandle {
            client: PollerClient { tx },
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<PollRequest>, cancel: CancellationToken) {
        let store: Arc<StateStore> = Arc::clone(self.refresher.store());
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut flight = SingleFlight::default();
        let mut in_flight: Option<BoxFuture<'static, RefreshOutcome>> = None;
        // Waiters served by the running request, and by the follow-up.
        let mut current: Vec<Waiter> = Vec::new();
        let mut next: Vec<Waiter> = Vec::new();

        info!(period = ?self.period, "Poller started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(outcome) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                    debug!(generation = outcome.generation, ok = outcome.is_ok(), "Poll completed");
                    for waiter in current.drain(..) {
                        let _ = waiter.send(outcome.clone());
                    }
                    if flight.on_complete() {
                        debug!("Starting follow-up poll");
                        in_flight = Some(self.refresher.refresh_status().boxed());
                        current = mem::take(&mut next);
                    }
                }

                request = rx.recv() => {
                    let Some(PollRequest::Refresh(waiter)) = request else {
                        break;
                    };
                    match flight.on_trigger(Trigger::Manual) {
                        FlightAction::Start => {
                            in_flight = Some(self.refresher.refresh_status().boxed());
                            current.extend(waiter);
                        }
                        FlightAction::Deferred | FlightAction::Coalesced => next.extend(waiter),
                    }
                }

                _ = ticker.tick() => {
                    match flight.on_trigger(Trigger::Tick) {
                        FlightAction::Start => {
                            in_flight = Some(self.refresher.refresh_status().boxed());
                        }
                        action => debug!(?action, "Tick while poll in flight"),
                    }
                }
            }
        }

        // Dropping `in_flight` abandons the request; make sure nothing
        // already issued can still land.
        drop(in_flight);
        store.submit(Update::Abandon(ViewKind::Status));
        info!("Poller stopped");
    }
}
