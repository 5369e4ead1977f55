//! One request, mapped and applied under a fresh generation.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use wpctl_types::{DeviceStatus, HistorySeries};

use crate::api::{DeviceApi, HistoryQuery};
use crate::error::Result;
use crate::mapper::{map_history, map_status};
use crate::store::{ApplyOutcome, StateStore, Update};
use crate::view::{Generation, UiView, ViewKind};

/// Result of one status refresh.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub generation: Generation,
    /// The mapped snapshot, or why there is none.
    pub status: Result<Arc<DeviceStatus>>,
    /// Whether the store accepted the completion.
    pub applied: ApplyOutcome,
}

impl RefreshOutcome {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Fetches, maps and applies. Cheap to clone.
#[derive(Clone)]
pub struct Refresher {
    api: Arc<dyn DeviceApi>,
    store: Arc<StateStore>,
}

impl Refresher {
    pub fn new(api: Arc<dyn DeviceApi>, store: Arc<StateStore>) -> Self {
        Self { api, store }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn api(&self) -> &Arc<dyn DeviceApi> {
        &self.api
    }

    /// Start a status refresh.
    ///
    /// The generation is allocated when this is called, not when the returned
    /// future is first polled, so request order is issue order.
    pub fn refresh_status(&self) -> impl Future<Output = RefreshOutcome> + Send + 'static {
        let generation = self.store.begin(ViewKind::Status);
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);

        async move {
            debug!(generation, "Refreshing status");
            let status = fetch_status(api.as_ref()).await;
            let view = match &status {
                Ok(snapshot) => UiView::Ready(Arc::clone(snapshot)),
                Err(e) => {
                    warn!(generation, error = %e, "Status refresh failed");
                    UiView::failed(e)
                }
            };
            let applied = store.submit(Update::Status { generation, view });
            RefreshOutcome {
                generation,
                status,
                applied,
            }
        }
    }

    /// Load history into the history view.
    ///
    /// The view shows `Loading` while the request is outstanding. At most
    /// `query.limit` of the newest samples are kept.
    pub async fn load_history(&self, query: HistoryQuery) -> Result<Arc<HistorySeries>> {
        query.validate()?;
        let generation = self.store.begin(ViewKind::History);
        self.store.submit(Update::History {
            generation,
            view: UiView::Loading,
        });

        let result = fetch_history(self.api.as_ref(), query).await;
        let view = match &result {
            Ok(series) => UiView::Ready(Arc::clone(series)),
            Err(e) => {
                warn!(generation, error = %e, "History load failed");
                UiView::failed(e)
            }
        };
        if self.store.submit(Update::History { generation, view }) == ApplyOutcome::Stale {
            debug!(generation, "History completion superseded");
        }
        result
    }
}

async fn fetch_status(api: &dyn DeviceApi) -> Result<Arc<DeviceStatus>> {
    let payload = api.fetch_status().await?;
    Ok(Arc::new(map_status(&payload)?))
}

async fn fetch_history(api: &dyn DeviceApi, query: HistoryQuery) -> Result<Arc<HistorySeries>> {
    let payload = api.fetch_history(query).await?;
    let series = map_history(&payload)?;
    Ok(Arc::new(series.truncate_to_latest(query.limit as usize)))
}
