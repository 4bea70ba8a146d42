//! Background Task Poller Integration Tests
//!
//! Interval adaptation, debounced refreshes, and lifecycle of the poller,
//! driven by tokio's paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use seo_pipeline_api::ApiError;
use seo_pipeline_client::models::settings::PollerSettings;
use seo_pipeline_client::services::poller::{BackgroundTaskPoller, RefreshHandler};
use seo_pipeline_core::TaskStatusResponse;

use crate::mock_backend::{tasks, MockBackend};

#[derive(Default)]
struct CountingRefresh {
    calls: AtomicUsize,
}

impl CountingRefresh {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshHandler for CountingRefresh {
    async fn refresh(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    backend: Arc<MockBackend>,
    refresh: Arc<CountingRefresh>,
    liveness: CancellationToken,
    poller: BackgroundTaskPoller,
}

fn fixture(settings: PollerSettings) -> Fixture {
    let backend = MockBackend::new();
    let refresh = Arc::new(CountingRefresh::default());
    let liveness = CancellationToken::new();
    let poller = BackgroundTaskPoller::new(
        backend.clone(),
        refresh.clone(),
        settings,
        liveness.clone(),
    );
    Fixture {
        backend,
        refresh,
        liveness,
        poller,
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn gaps(times: &[tokio::time::Instant]) -> Vec<Duration> {
    times.windows(2).map(|w| w[1] - w[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn test_idle_backend_is_polled_slowly() {
    let f = fixture(PollerSettings::default());
    f.backend.queue_tasks(Ok(tasks(&[])));

    assert!(f.poller.start());
    tokio::time::sleep(secs(25)).await;

    let times = f.backend.poll_times();
    assert_eq!(times.len(), 3);
    assert!(gaps(&times).iter().all(|gap| *gap == secs(10)));
    assert_eq!(f.refresh.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_running_jobs_are_polled_quickly() {
    let f = fixture(PollerSettings::default());
    f.backend.queue_tasks(Ok(tasks(&["a", "b"])));

    f.poller.start();
    tokio::time::sleep(secs(7)).await;

    let times = f.backend.poll_times();
    assert_eq!(times.len(), 4);
    assert!(gaps(&times).iter().all(|gap| *gap == secs(2)));
    assert_eq!(f.poller.subscribe().borrow().total_tasks, 2);
}

#[tokio::test(start_paused = true)]
async fn test_count_change_triggers_one_refresh() {
    let f = fixture(PollerSettings::default());
    f.backend.queue_tasks(Ok(tasks(&["a", "b"])));

    f.poller.start();
    tokio::time::sleep(secs(1)).await;
    assert_eq!(f.refresh.calls(), 1);

    // Count stays at two: no further refreshes.
    tokio::time::sleep(secs(10)).await;
    assert_eq!(f.refresh.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_jobs_finishing_refreshes_and_slows_down() {
    let f = fixture(PollerSettings::default());
    f.backend.queue_tasks(Ok(tasks(&["a"])));
    f.backend.queue_tasks(Ok(tasks(&[])));

    f.poller.start();
    tokio::time::sleep(secs(13)).await;

    assert_eq!(f.refresh.calls(), 2);
    let times = f.backend.poll_times();
    assert_eq!(gaps(&times), vec![secs(2), secs(10)]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_changes_collapses_into_one_refresh() {
    let settings = PollerSettings {
        refresh_debounce_ms: 5000,
        ..PollerSettings::default()
    };
    let f = fixture(settings);
    f.backend.queue_tasks(Ok(tasks(&["a"])));
    f.backend.queue_tasks(Ok(tasks(&["a", "b"])));
    f.backend.queue_tasks(Ok(tasks(&["a", "b", "c"])));

    f.poller.start();
    tokio::time::sleep(secs(8)).await;
    assert_eq!(f.refresh.calls(), 0);

    tokio::time::sleep(secs(3)).await;
    assert_eq!(f.refresh.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_error_keeps_polling_at_idle_interval() {
    let f = fixture(PollerSettings::default());
    f.backend.queue_tasks(Err(ApiError::network("connection reset")));
    f.backend.queue_tasks(Ok(tasks(&["a"])));

    f.poller.start();
    tokio::time::sleep(secs(11)).await;

    let times = f.backend.poll_times();
    assert_eq!(gaps(&times), vec![secs(10)]);
    assert!(f.poller.is_running());
    assert_eq!(f.refresh.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unsuccessful_poll_is_treated_as_error() {
    let f = fixture(PollerSettings::default());
    f.backend.queue_tasks(Ok(tasks(&["a"])));
    f.backend.queue_tasks(Ok(TaskStatusResponse {
        success: false,
        tasks: Vec::new(),
        total_tasks: 0,
    }));

    f.poller.start();
    tokio::time::sleep(secs(13)).await;

    assert_eq!(gaps(&f.backend.poll_times()), vec![secs(2), secs(10)]);
    assert_eq!(f.refresh.calls(), 1);
    assert_eq!(f.poller.subscribe().borrow().total_tasks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let f = fixture(PollerSettings::default());
    f.backend.queue_tasks(Ok(tasks(&[])));

    assert!(f.poller.start());
    assert!(!f.poller.start());
    tokio::time::sleep(secs(1)).await;

    assert_eq!(f.backend.poll_times().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_polling() {
    let f = fixture(PollerSettings::default());
    f.backend.queue_tasks(Ok(tasks(&["a"])));

    f.poller.start();
    tokio::time::sleep(secs(3)).await;
    f.poller.stop();
    let polled = f.backend.poll_times().len();

    tokio::time::sleep(secs(30)).await;
    assert_eq!(f.backend.poll_times().len(), polled);
    assert!(!f.poller.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_stops_polling() {
    let f = fixture(PollerSettings::default());
    f.backend.queue_tasks(Ok(tasks(&[])));

    f.poller.start();
    tokio::time::sleep(secs(1)).await;
    f.liveness.cancel();
    tokio::time::sleep(secs(30)).await;

    assert_eq!(f.backend.poll_times().len(), 1);
    assert!(!f.poller.is_running());
}
