//! End-to-end scenarios for `DeviceSync` against the mock controller.
//!
//! All timing-dependent tests run on a paused tokio clock, so the 5 s poll
//! period elapses instantly.
//!
//! ```
//! cargo test --package wpctl-core --test sync_scenarios
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use wpctl_core::{
    ApiError, ApplyOutcome, CompressorState, ControlCommand, DeviceSync, ErrorKind,
    HistoryQuery, MockDeviceApi, Sensor, StoreEvent, SyncError, SyncOptions, UiView, Update,
    ViewKind,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("wpctl_core=debug")
        .try_init();
}

fn setup() -> (Arc<MockDeviceApi>, Arc<DeviceSync>) {
    init_tracing();
    let mock = Arc::new(MockDeviceApi::new());
    let sync = DeviceSync::new(mock.clone(), SyncOptions::default()).unwrap();
    (mock, Arc::new(sync))
}

/// Let spawned tasks run without crossing a poll boundary.
async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn flat_payload_becomes_ready() {
    let (mock, sync) = setup();
    mock.set_status(json!({ "compressor": "running", "tOben": 52.3 }))
        .await;

    sync.activate();
    settle().await;

    let view = sync.status_view();
    let status = view.value().expect("status should be ready");
    assert_eq!(status.compressor.state, CompressorState::Running);
    assert_eq!(status.temperatures.get(Sensor::Oben), Some(52.3));
    for sensor in Sensor::ALL.into_iter().filter(|s| *s != Sensor::Oben) {
        assert_eq!(status.temperatures.get(sensor), None, "{sensor} should have no reading");
    }
}

#[tokio::test(start_paused = true)]
async fn bath_mode_is_shown_optimistically_then_confirmed() {
    let (mock, sync) = setup();
    sync.activate();
    settle().await;
    assert!(!sync.status_view().value().unwrap().modes.bath);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    sync.subscribe(move |event| {
        if let StoreEvent::Status {
            view: UiView::Ready(status),
            optimistic,
        } = event
        {
            sink.lock().unwrap().push((*optimistic, status.modes.bath));
        }
    });

    let outcome = sync
        .dispatch_command(ControlCommand::bath_mode(true))
        .await
        .unwrap();
    assert!(outcome.reconciliation.is_ok());
    assert_eq!(outcome.message, "OK");

    let events = events.lock().unwrap();
    assert_eq!(events.first(), Some(&(true, true)), "prediction comes first");
    assert_eq!(events.last(), Some(&(false, true)), "confirmed afterwards");

    let snapshot = sync.snapshot();
    assert!(!snapshot.optimistic);
    assert!(snapshot.status.value().unwrap().modes.bath);
    assert_eq!(mock.received_commands(), [ControlCommand::bath_mode(true)]);
    assert!(sync.pending_command().is_none());
}

#[tokio::test(start_paused = true)]
async fn transport_failure_recovers_on_next_tick() {
    let (mock, sync) = setup();
    mock.fail_next(
        1,
        ApiError::NotReachable {
            url: "http://raspberrypi.local:5000/status".to_string(),
            message: "connection refused".to_string(),
        },
    );

    sync.activate();
    settle().await;
    let view = sync.status_view();
    assert_eq!(view.error().map(|e| e.kind), Some(ErrorKind::Transport));

    sleep(Duration::from_secs(5)).await;
    assert!(sync.status_view().is_ready());
    assert_eq!(mock.status_calls(), 2);
    assert!(sync.is_active());
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_is_a_parse_failure() {
    let (mock, sync) = setup();
    mock.set_status(json!({ "temperatures": { "oben": 40.0 } }))
        .await;

    sync.activate();
    settle().await;
    let view = sync.status_view();
    assert_eq!(view.error().map(|e| e.kind), Some(ErrorKind::Parse));

    // Polling goes on after a parse failure too.
    mock.set_status(json!({ "compressor": "AUS" })).await;
    sleep(Duration::from_secs(5)).await;
    assert!(sync.status_view().is_ready());
}

#[tokio::test]
async fn late_completion_is_dropped() {
    let (_mock, sync) = setup();
    let store = sync.store();

    let older = store.begin(ViewKind::Status);
    let newer = store.begin(ViewKind::Status);

    let fresh = wpctl_core::map_status(&json!({ "compressor": "EIN" })).unwrap();
    let stale = wpctl_core::map_status(&json!({ "compressor": "AUS" })).unwrap();

    assert_eq!(
        store.apply(Update::Status {
            generation: newer,
            view: UiView::ready(fresh),
        }),
        Ok(ApplyOutcome::Applied)
    );
    let before = sync.status_view();
    assert_eq!(
        store.apply(Update::Status {
            generation: older,
            view: UiView::ready(stale),
        }),
        Ok(ApplyOutcome::Stale)
    );
    assert!(sync.status_view().same_payload(&before));
    assert_eq!(sync.snapshot().status_generation, newer);
}

#[tokio::test(start_paused = true)]
async fn second_command_while_pending_is_busy() {
    let (mock, sync) = setup();
    sync.activate();
    settle().await;
    mock.set_control_latency(Duration::from_secs(1));

    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notices);
    sync.subscribe(move |event| {
        if let StoreEvent::Notice(notice) = event {
            sink.lock().unwrap().push(notice.clone());
        }
    });

    let first = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.dispatch_command(ControlCommand::force_on()).await }
    });
    settle().await;
    assert!(sync.pending_command().is_some());

    let err = sync
        .dispatch_command(ControlCommand::force_off())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Busy { .. }));
    assert_eq!(notices.lock().unwrap()[0].kind, ErrorKind::Busy);

    first.await.unwrap().unwrap();
    assert_eq!(mock.received_commands(), [ControlCommand::force_on()]);
    assert!(sync.status_view().value().unwrap().compressor.state.is_running());
}

#[tokio::test(start_paused = true)]
async fn scheduled_poll_during_slow_command_keeps_optimistic_marker() {
    let (mock, sync) = setup();
    sync.activate();
    settle().await;
    mock.set_control_latency(Duration::from_secs(7));

    let dispatch = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.dispatch_command(ControlCommand::force_on()).await }
    });
    settle().await;
    let snapshot = sync.snapshot();
    assert!(snapshot.optimistic);
    assert!(snapshot.status.value().unwrap().compressor.state.is_running());

    // The 5 s tick lands while the controller is still working on the command.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(mock.status_calls(), 2);
    let snapshot = sync.snapshot();
    assert!(snapshot.optimistic, "a scheduled poll must not settle the command");
    assert_eq!(
        snapshot.status.value().unwrap().compressor.state,
        CompressorState::Off
    );
    assert!(sync.pending_command().is_some());

    let outcome = dispatch.await.unwrap().unwrap();
    assert!(outcome.reconciliation.is_ok());
    let snapshot = sync.snapshot();
    assert!(!snapshot.optimistic);
    assert!(snapshot.status.value().unwrap().compressor.state.is_running());
    assert!(sync.pending_command().is_none());
}

#[tokio::test(start_paused = true)]
async fn deactivate_drops_in_flight_poll() {
    let (mock, sync) = setup();
    mock.set_status_latency(Duration::from_secs(2));

    sync.activate();
    settle().await;
    assert_eq!(mock.status_calls(), 1);
    assert!(sync.deactivate());

    sleep(Duration::from_secs(10)).await;
    assert!(sync.status_view().is_loading());
    assert_eq!(mock.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn watch_receiver_sees_latest_snapshot() {
    let (_mock, sync) = setup();
    let mut rx = sync.watch();
    assert!(rx.borrow().status.is_loading());

    sync.activate();
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().status.is_ready());
}

#[tokio::test]
async fn history_is_loaded_sorted_and_limited() {
    let (mock, sync) = setup();
    mock.set_history(json!({
        "count": 3,
        "data": [
            { "timestamp": "2024-05-01 10:10:00", "t_oben": 47.0, "t_unten": null, "kompressor": "EIN" },
            { "timestamp": "2024-05-01 10:00:00", "t_oben": 45.0, "t_unten": 30.5, "kompressor": "AUS" },
            { "timestamp": "2024-05-01 10:05:00", "t_oben": "n/a", "t_unten": 31.0, "kompressor": "AUS" }
        ]
    }))
    .await;

    let series = sync
        .load_history(HistoryQuery::new(6, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series.latest().unwrap().compressor, CompressorState::Running);

    let chart = series.chart_series();
    assert_eq!(chart[&Sensor::Oben].len(), 1);
    assert_eq!(chart[&Sensor::Unten].len(), 1);
    assert!(sync.history_view().is_ready());
    assert_eq!(mock.history_calls(), 1);
}

#[tokio::test]
async fn invalid_history_query_is_rejected_without_request() {
    let (mock, sync) = setup();
    let err = sync
        .load_history(HistoryQuery {
            hours_back: 0,
            limit: 10,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(mock.history_calls(), 0);
}
