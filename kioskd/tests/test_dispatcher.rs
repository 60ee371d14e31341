use async_trait::async_trait;
use kioskconfig::Config;
use kioskd::{Dispatcher, Envelope, LineChannel, OutboundEvent, run_event_loop, spawn_state_forwarder};
use kioskscheduler::{
    ContentScheduler, LocalClock, PassthroughMedia, SchedulerHandle, SchedulerTimings,
};
use kiosksession::{
    DriverError, DryRunDriver, Interaction, LaunchOptions, RenderDriver, RenderSession,
    RenderSurface, SessionManager, SessionPolicy, WaitUntil,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

struct Harness {
    dispatcher: Dispatcher,
    scheduler: SchedulerHandle,
    session: Arc<SessionManager>,
    tx: mpsc::UnboundedSender<OutboundEvent>,
    outbound: mpsc::UnboundedReceiver<OutboundEvent>,
}

async fn harness() -> Harness {
    harness_with(Arc::new(DryRunDriver)).await
}

async fn harness_with(driver: Arc<dyn RenderDriver>) -> Harness {
    let session = Arc::new(SessionManager::new(
        driver,
        LaunchOptions::default(),
        SessionPolicy::default(),
    ));
    session.initialize().await.unwrap();
    let scheduler = ContentScheduler::spawn(
        session.clone(),
        Arc::new(PassthroughMedia),
        Arc::new(LocalClock),
        SchedulerTimings::default(),
    );
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(scheduler.clone(), session.clone(), tx.clone(), 10);
    Harness {
        dispatcher,
        scheduler,
        session,
        tx,
        outbound: rx,
    }
}

fn envelope(event: &str, payload: serde_json::Value) -> Envelope {
    Envelope::new(event, payload)
}

fn playlist() -> serde_json::Value {
    json!({
        "playlistId": "lobby",
        "items": [
            {"id": "a", "url": "https://a.example.com", "duration": 60, "orderIndex": 0},
            {"id": "b", "url": "https://b.example.com", "duration": 60, "orderIndex": 1}
        ]
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_content_update_starts_rotation() {
    let mut h = harness().await;
    h.dispatcher.handle(envelope("content:update", playlist())).await;
    settle().await;

    let state = h.scheduler.state().await.unwrap();
    assert!(state.is_running);
    assert_eq!(state.playlist_id.as_deref(), Some("lobby"));
    assert_eq!(state.current_item_id.as_deref(), Some("a"));
    assert_eq!(
        h.session.current_url().await.as_deref(),
        Some("https://a.example.com")
    );

    h.dispatcher.handle(envelope("playlist:next", json!(null))).await;
    settle().await;
    assert_eq!(
        h.scheduler.state().await.unwrap().current_item_id.as_deref(),
        Some("b")
    );
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_and_ad_hoc_navigation() {
    let mut h = harness().await;
    h.dispatcher.handle(envelope("content:update", playlist())).await;
    settle().await;

    h.dispatcher
        .handle(envelope(
            "playlist:broadcast:start",
            json!({"type": "url", "url": "https://alert.example.com", "duration": 0}),
        ))
        .await;
    settle().await;
    assert!(h.scheduler.state().await.unwrap().is_broadcasting);
    assert_eq!(
        h.session.current_url().await.as_deref(),
        Some("https://alert.example.com")
    );

    h.dispatcher.handle(envelope("playlist:broadcast:end", json!(null))).await;
    settle().await;
    assert!(!h.scheduler.state().await.unwrap().is_broadcasting);
    assert_eq!(
        h.session.current_url().await.as_deref(),
        Some("https://a.example.com")
    );

    h.dispatcher
        .handle(envelope("display:navigate", json!({"url": "https://adhoc.example.com"})))
        .await;
    settle().await;
    assert_eq!(
        h.session.current_url().await.as_deref(),
        Some("https://adhoc.example.com")
    );
}

#[tokio::test(start_paused = true)]
async fn test_config_update_restarts_and_restores_rotation() {
    let mut h = harness().await;
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config::load_config(dir.path().to_str().unwrap()).unwrap());
    h.dispatcher = h.dispatcher.with_config(config.clone());

    h.dispatcher.handle(envelope("content:update", playlist())).await;
    settle().await;
    h.dispatcher.handle(envelope("playlist:next", json!(null))).await;
    settle().await;

    h.dispatcher
        .handle(envelope("config:update", json!({"displayWidth": 1280, "displayHeight": 720})))
        .await;
    // Redémarrage complet : cool-down compris
    tokio::time::sleep(Duration::from_secs(10)).await;

    let options = h.session.launch_options().await;
    assert_eq!((options.width, options.height, options.kiosk_mode), (1280, 720, true));
    assert_eq!(config.get_display_width().unwrap(), 1280);
    assert_eq!(config.get_display_height().unwrap(), 720);
    assert_eq!(
        h.session.current_url().await.as_deref(),
        Some("https://b.example.com")
    );
    assert_eq!(
        h.scheduler.state().await.unwrap().current_item_id.as_deref(),
        Some("b")
    );
}

#[tokio::test(start_paused = true)]
async fn test_device_restart_redisplays_current_item() {
    let mut h = harness().await;
    h.dispatcher.handle(envelope("content:update", playlist())).await;
    settle().await;

    h.dispatcher.handle(envelope("device:restart", json!(null))).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        h.session.current_url().await.as_deref(),
        Some("https://a.example.com")
    );
    // Compteur remis à zéro par la relance, puis une navigation de réaffichage
    assert_eq!(h.session.navigation_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_uploads_screenshot_and_screencast_toggles() {
    let mut h = harness().await;
    h.dispatcher.handle(envelope("display:refresh", json!(null))).await;
    settle().await;
    match h.outbound.try_recv().unwrap() {
        OutboundEvent::Screenshot { png, .. } => assert!(!png.is_empty()),
        other => panic!("unexpected {:?}", other),
    }

    h.dispatcher.handle(envelope("screencast:start", json!(null))).await;
    assert!(h.dispatcher.is_screencasting());
    tokio::time::sleep(Duration::from_millis(250)).await;
    h.dispatcher.handle(envelope("screencast:stop", json!(null))).await;
    assert!(!h.dispatcher.is_screencasting());

    let mut frames = 0;
    while let Ok(event) = h.outbound.try_recv() {
        if let OutboundEvent::ScreencastFrame { .. } = event {
            frames += 1;
        }
    }
    assert!(frames >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_bad_events_are_ignored() {
    let mut h = harness().await;
    h.dispatcher.handle(envelope("device:selfdestruct", json!(null))).await;
    h.dispatcher
        .handle(envelope("content:update", json!({"items": "nope"})))
        .await;
    h.dispatcher
        .handle(envelope("remote:click", json!({"x": 10, "y": 20})))
        .await;
    settle().await;
    assert!(!h.scheduler.state().await.unwrap().is_running);
}

#[tokio::test(start_paused = true)]
async fn test_event_loop_over_line_channel() {
    let Harness {
        mut dispatcher,
        scheduler,
        tx,
        mut outbound,
        ..
    } = harness().await;
    let forwarder = spawn_state_forwarder(&scheduler, tx);

    let (peer, local) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(local);
    let mut channel = LineChannel::new(reader, writer);
    let event_loop = tokio::spawn(async move {
        run_event_loop(&mut channel, &mut dispatcher, &mut outbound).await
    });

    let (peer_read, mut peer_write) = tokio::io::split(peer);
    let update = serde_json::to_string(&envelope("content:update", playlist())).unwrap();
    peer_write
        .write_all(format!("garbage line\n{}\n", update).as_bytes())
        .await
        .unwrap();

    let mut lines = BufReader::new(peer_read).lines();
    let running = loop {
        let line = lines.next_line().await.unwrap().unwrap();
        let envelope: Envelope = serde_json::from_str(&line).unwrap();
        assert_eq!(envelope.event, "playback:state:update");
        if envelope.payload["playlistId"] == "lobby" && envelope.payload["currentItemId"] == "a" {
            break envelope;
        }
    };
    assert_eq!(running.payload["isRunning"], true);

    drop(lines);
    drop(peer_write);
    assert!(event_loop.await.unwrap().is_ok());
    forwarder.abort();
}

/// Browser whose page loads hang for 20 s on `slow` URLs.
#[derive(Default)]
struct SlowPages {
    clicks: AtomicUsize,
}

struct SlowDriver(Arc<SlowPages>);

#[async_trait]
impl RenderDriver for SlowDriver {
    fn name(&self) -> &str {
        "slow"
    }

    async fn launch(&self, _options: &LaunchOptions) -> Result<Box<dyn RenderSession>, DriverError> {
        Ok(Box::new(SlowSession(self.0.clone())))
    }
}

struct SlowSession(Arc<SlowPages>);

#[async_trait]
impl RenderSession for SlowSession {
    async fn new_surface(&self) -> Result<Box<dyn RenderSurface>, DriverError> {
        Ok(Box::new(SlowSurface(self.0.clone())))
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

struct SlowSurface(Arc<SlowPages>);

#[async_trait]
impl RenderSurface for SlowSurface {
    async fn add_init_script(&self, _script: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn navigate(&self, url: &str, _wait: WaitUntil, _timeout: Duration) -> Result<(), DriverError> {
        if url.contains("slow") {
            tokio::time::sleep(Duration::from_secs(20)).await;
        }
        Ok(())
    }

    async fn reload(&self, _wait: WaitUntil, _timeout: Duration) -> Result<(), DriverError> {
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(Vec::new())
    }

    async fn interact(&self, action: &Interaction) -> Result<(), DriverError> {
        if let Interaction::Click { .. } = action {
            self.0.clicks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_navigation_does_not_stall_event_handling() {
    let pages = Arc::new(SlowPages::default());
    let mut h = harness_with(Arc::new(SlowDriver(pages.clone()))).await;
    h.dispatcher.handle(envelope("content:update", playlist())).await;
    settle().await;

    h.dispatcher
        .handle(envelope("display:navigate", json!({"url": "https://slow.example.com"})))
        .await;
    settle().await;

    // La navigation tient la session : aucun de ces événements ne doit attendre
    let started = tokio::time::Instant::now();
    h.dispatcher
        .handle(envelope("remote:click", json!({"x": 10, "y": 20})))
        .await;
    h.dispatcher
        .handle(envelope("config:update", json!({"displayWidth": 1280})))
        .await;
    h.dispatcher.handle(envelope("playlist:pause", json!(null))).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(h.scheduler.state().await.unwrap().is_paused);
    assert_eq!(pages.clicks.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(pages.clicks.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.launch_options().await.width, 1280);
}
