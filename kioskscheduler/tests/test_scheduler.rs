use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use kioskcache::{CacheError, CacheStatus, ContentCache, Fetcher};
use kioskscheduler::{
    Broadcast, Clock, ContentScheduler, LocalClock, PassthroughMedia, PlaybackCondition, Playlist,
    Renderer, ScheduledItem, SchedulerHandle, SchedulerTimings,
};
use kiosksession::SessionError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Records every render with its time offset, in whole seconds.
struct FakeRenderer {
    start: Instant,
    log: Mutex<Vec<(u64, String)>>,
    script: Mutex<VecDeque<Result<(), SessionError>>>,
    always: Mutex<Option<SessionError>>,
}

impl FakeRenderer {
    fn new(start: Instant) -> Arc<Self> {
        Arc::new(Self {
            start,
            log: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            always: Mutex::new(None),
        })
    }

    fn fail_next(&self, err: SessionError) {
        self.script.lock().push_back(Err(err));
    }

    fn log(&self) -> Vec<(u64, String)> {
        self.log.lock().clone()
    }

    fn urls(&self) -> Vec<String> {
        self.log().into_iter().map(|(_, url)| url).collect()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, url: &str) -> Result<(), SessionError> {
        self.log
            .lock()
            .push((self.start.elapsed().as_secs(), url.to_string()));
        if let Some(err) = self.always.lock().clone() {
            return Err(err);
        }
        self.script.lock().pop_front().unwrap_or(Ok(()))
    }
}

/// Wall clock that follows the (paused) tokio clock from a fixed origin.
struct TestClock {
    base: NaiveDateTime,
    start: Instant,
}

impl Clock for TestClock {
    fn now(&self) -> NaiveDateTime {
        self.base + chrono::Duration::from_std(self.start.elapsed()).unwrap()
    }
}

/// Wednesday 2024-01-03 at `h:m`.
fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 3)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn harness(now: NaiveDateTime) -> (SchedulerHandle, Arc<FakeRenderer>) {
    let start = Instant::now();
    let renderer = FakeRenderer::new(start);
    let handle = ContentScheduler::spawn(
        renderer.clone(),
        Arc::new(PassthroughMedia),
        Arc::new(TestClock { base: now, start }),
        SchedulerTimings::default(),
    );
    (handle, renderer)
}

/// Lets the scheduler and its render tasks drain without moving time.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
    settle().await;
}

fn item(id: &str, secs: u64) -> ScheduledItem {
    ScheduledItem::new(id, &format!("https://content.example.com/{}", id), secs)
}

fn url(id: &str) -> String {
    format!("https://content.example.com/{}", id)
}

async fn start_with(handle: &SchedulerHandle, items: Vec<ScheduledItem>) {
    handle.load_playlist(Playlist::new("p1", items)).unwrap();
    handle.start().unwrap();
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_item_uses_fallback_and_rotates() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 10), item("b", 0)]).await;

    advance(36).await;

    assert_eq!(
        renderer.log(),
        vec![
            (0, url("a")),
            (10, url("b")),
            (25, url("a")),
            (35, url("b")),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_permanent_item_never_rotates() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 0)]).await;

    advance(3600).await;

    assert_eq!(renderer.log().len(), 1);
    let state = handle.state().await.unwrap();
    assert_eq!(state.current_item_id.as_deref(), Some("a"));
    assert_eq!(state.time_remaining_ms, None);
}

#[tokio::test(start_paused = true)]
async fn test_rotation_delay_bounded_by_window_end() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(
        &handle,
        vec![item("a", 3600).with_window("09:00", "12:30"), item("b", 10)],
    )
    .await;

    let state = handle.state().await.unwrap();
    assert_eq!(state.time_remaining_ms, Some(30 * 60 * 1000));

    advance(30 * 60 - 1).await;
    assert_eq!(renderer.urls(), vec![url("a")]);
    advance(2).await;
    assert_eq!(renderer.log()[1], (30 * 60, url("b")));
}

#[tokio::test(start_paused = true)]
async fn test_stall_until_window_opens_next_day() {
    let (handle, renderer) = harness(at(20, 0));
    start_with(&handle, vec![item("a", 0).with_window("09:00", "17:00")]).await;

    assert!(renderer.log().is_empty());
    let state = handle.state().await.unwrap();
    assert!(state.is_stalled);
    assert_eq!(state.condition, PlaybackCondition::NoDisplayableItem);

    // 13 hours later it is 09:00 the next day.
    advance(13 * 3600 + 60).await;

    let log = renderer.log();
    assert_eq!(log.len(), 1);
    assert!(log[0].0 >= 13 * 3600 && log[0].0 <= 13 * 3600 + 60);
    let state = handle.state().await.unwrap();
    assert!(!state.is_stalled);
    assert_eq!(state.condition, PlaybackCondition::None);
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_retries_same_item_after_recovery_window() {
    let (handle, renderer) = harness(at(12, 0));
    renderer.fail_next(SessionError::Closed("browser has been closed".into()));
    start_with(&handle, vec![item("c", 30), item("d", 30)]).await;

    advance(5).await;
    let state = handle.state().await.unwrap();
    assert_eq!(state.condition, PlaybackCondition::RenderUnavailable);

    advance(6).await;
    assert_eq!(renderer.log(), vec![(0, url("c")), (10, url("c"))]);
    let state = handle.state().await.unwrap();
    assert_eq!(state.current_item_id.as_deref(), Some("c"));
    assert_eq!(state.condition, PlaybackCondition::None);
}

#[tokio::test(start_paused = true)]
async fn test_crash_and_content_failures() {
    let (handle, renderer) = harness(at(12, 0));
    renderer.fail_next(SessionError::Crashed("renderer".into()));
    start_with(&handle, vec![item("c", 30), item("d", 30)]).await;
    advance(8).await;
    assert_eq!(renderer.log(), vec![(0, url("c")), (7, url("c"))]);

    let (handle, renderer) = harness(at(12, 0));
    renderer.fail_next(SessionError::Navigation {
        url: url("c"),
        message: "net::ERR_NAME_NOT_RESOLVED".into(),
    });
    start_with(&handle, vec![item("c", 30), item("d", 30)]).await;
    advance(4).await;
    assert_eq!(renderer.log(), vec![(0, url("c")), (3, url("d"))]);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_session_keeps_reporting() {
    let (handle, renderer) = harness(at(12, 0));
    *renderer.always.lock() = Some(SessionError::Degraded { attempts: 5 });
    start_with(&handle, vec![item("c", 30)]).await;

    advance(25).await;

    assert_eq!(
        renderer.log().iter().map(|(t, _)| *t).collect::<Vec<_>>(),
        vec![0, 10, 20]
    );
    let state = handle.state().await.unwrap();
    assert!(state.is_running);
    assert_eq!(state.condition, PlaybackCondition::SessionDegraded);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_resumes_with_remaining_time() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(
        &handle,
        vec![
            item("i0", 10),
            item("i1", 10),
            item("i2", 10),
            item("i3", 10),
            item("i4", 10),
        ],
    )
    .await;

    advance(26).await;
    handle
        .start_broadcast(Broadcast::message("Evacuate", 5000))
        .unwrap();
    settle().await;

    let state = handle.state().await.unwrap();
    assert!(state.is_broadcasting);
    assert_eq!(state.time_remaining_ms, Some(5000));
    let snapshot = handle.snapshot().await.unwrap().unwrap();
    assert_eq!(snapshot.cursor, 2);

    advance(10).await;

    let log = renderer.log();
    assert_eq!(log[2], (20, url("i2")));
    assert_eq!(log[3].0, 26);
    assert!(log[3].1.starts_with("data:text/html;base64,"));
    assert_eq!(log[4], (31, url("i2")));
    assert_eq!(log[5], (35, url("i3")));

    let state = handle.state().await.unwrap();
    assert!(!state.is_broadcasting);
    assert_eq!(state.playlist_id.as_deref(), Some("p1"));
    assert_eq!(state.current_item_index, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_broadcast_end_restores_cursor() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 10), item("b", 10), item("c", 10)]).await;
    advance(12).await;

    handle
        .start_broadcast(Broadcast::url("https://alerts.example.com", 0))
        .unwrap();
    advance(120).await;
    assert_eq!(renderer.urls().last().unwrap(), "https://alerts.example.com");

    handle.end_broadcast().unwrap();
    settle().await;

    let state = handle.state().await.unwrap();
    assert_eq!(state.current_item_id.as_deref(), Some("b"));
    assert_eq!(state.time_remaining_ms, Some(8000));
    assert_eq!(renderer.urls().last().unwrap(), &url("b"));
}

#[tokio::test(start_paused = true)]
async fn test_playlist_update_during_broadcast_is_deferred() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 10)]).await;

    handle.start_broadcast(Broadcast::message("Hello", 0)).unwrap();
    settle().await;
    handle
        .load_playlist(Playlist::new("p2", vec![item("x", 10)]))
        .unwrap();
    settle().await;
    assert_eq!(
        handle.state().await.unwrap().playlist_id.as_deref(),
        Some("p1")
    );

    handle.end_broadcast().unwrap();
    settle().await;

    let state = handle.state().await.unwrap();
    assert_eq!(state.playlist_id.as_deref(), Some("p2"));
    assert_eq!(renderer.urls().last().unwrap(), &url("x"));
}

#[tokio::test(start_paused = true)]
async fn test_pause_resume_uses_remaining_time() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 10), item("b", 10)]).await;

    advance(4).await;
    handle.pause().unwrap();
    settle().await;
    let state = handle.state().await.unwrap();
    assert!(state.is_paused);
    assert_eq!(state.time_remaining_ms, Some(6000));

    advance(96).await;
    assert_eq!(renderer.log().len(), 1);

    handle.resume().unwrap();
    advance(7).await;
    assert_eq!(renderer.log(), vec![(0, url("a")), (106, url("b"))]);
}

#[tokio::test(start_paused = true)]
async fn test_next_and_previous_walk_the_playlist() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 10), item("b", 10), item("c", 10)]).await;

    for step in ["next", "next", "previous", "previous", "previous"] {
        if step == "next" {
            handle.next().unwrap();
        } else {
            handle.previous().unwrap();
        }
        settle().await;
        let state = handle.state().await.unwrap();
        assert!(state.current_item_index.unwrap() < 3);
    }

    assert_eq!(
        renderer.urls(),
        vec![url("a"), url("b"), url("c"), url("b"), url("a"), url("c")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_identical_permanent_reload_does_not_render_again() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 0)]).await;

    start_with(&handle, vec![item("a", 0)]).await;
    advance(1).await;

    assert_eq!(renderer.log().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduling_change_forces_restart() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 10), item("b", 10)]).await;

    start_with(
        &handle,
        vec![item("a", 10), item("b", 10).with_window("08:00", "18:00")],
    )
    .await;

    assert_eq!(renderer.log(), vec![(0, url("a")), (0, url("a"))]);
}

#[tokio::test(start_paused = true)]
async fn test_content_change_elsewhere_is_swapped_in_place() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 10), item("b", 10)]).await;

    let mut b2 = item("b", 10);
    b2.source_ref = url("b2");
    start_with(&handle, vec![item("a", 10), b2]).await;
    advance(11).await;

    assert_eq!(renderer.log(), vec![(0, url("a")), (10, url("b2"))]);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_and_restore() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 10), item("b", 10), item("c", 10)]).await;
    advance(11).await;

    let snapshot = handle.snapshot().await.unwrap().unwrap();
    assert_eq!(snapshot.playlist_id, "p1");
    assert_eq!(snapshot.cursor, 1);

    handle.restore(snapshot).unwrap();
    settle().await;

    assert_eq!(renderer.log().last().unwrap(), &(11, url("b")));
}

#[tokio::test(start_paused = true)]
async fn test_stop_goes_idle() {
    let (handle, renderer) = harness(at(12, 0));
    start_with(&handle, vec![item("a", 10), item("b", 10)]).await;

    handle.stop().unwrap();
    settle().await;
    let state = handle.state().await.unwrap();
    assert!(!state.is_running);
    assert_eq!(state.current_item_id, None);

    advance(60).await;
    assert_eq!(renderer.log().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_state_published_on_heartbeat() {
    let (handle, _renderer) = harness(at(12, 0));
    let mut states = handle.subscribe();
    start_with(&handle, vec![item("a", 0)]).await;

    advance(12).await;

    let mut received = 0;
    while states.try_recv().is_ok() {
        received += 1;
    }
    assert!(received >= 4);
}

// ----------------------------------------------------------------------
// With the real content cache
// ----------------------------------------------------------------------

#[derive(Default)]
struct CountingFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(destination, url.as_bytes()).await?;
        Ok(url.len() as u64)
    }
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

const CLIP: &str = "https://cdn.example.com/media/clip.mp4";
const OLD: &str = "https://cdn.example.com/media/old.mp4";

#[tokio::test]
async fn test_reload_reconciles_cache_and_serves_local_copy() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let cache = Arc::new(ContentCache::with_fetcher(dir.path(), fetcher.clone()).unwrap());
    let renderer = FakeRenderer::new(Instant::now());
    let timings = SchedulerTimings {
        cache_poll_interval: Duration::from_millis(10),
        ..SchedulerTimings::default()
    };
    let handle = ContentScheduler::spawn(renderer.clone(), cache.clone(), Arc::new(LocalClock), timings);

    handle
        .load_playlist(Playlist::new(
            "p1",
            vec![
                ScheduledItem::new("clip", CLIP, 30),
                ScheduledItem::new("old", OLD, 30),
            ],
        ))
        .unwrap();
    handle.start().unwrap();

    eventually("both downloads", || {
        cache.get_status(CLIP) == CacheStatus::Ready && cache.get_status(OLD) == CacheStatus::Ready
    })
    .await;
    eventually("first render", || !renderer.log().is_empty()).await;
    assert!(renderer.urls()[0].starts_with("file://"));
    let old_path = cache.file_path(OLD);

    handle
        .load_playlist(Playlist::new("p2", vec![ScheduledItem::new("clip", CLIP, 30)]))
        .unwrap();
    eventually("old media evicted", || {
        cache.get_status(OLD) == CacheStatus::NotCached
    })
    .await;

    assert!(!old_path.exists());
    assert_eq!(cache.get_status(CLIP), CacheStatus::Ready);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}
