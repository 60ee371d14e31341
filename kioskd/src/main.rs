use anyhow::Result;
use kioskcache::CacheConfigExt;
use kioskconfig::get_config;
use kioskd::logging::init_logging;
use kioskd::{Dispatcher, LineChannel, run_event_loop, spawn_screenshot_uploader, spawn_state_forwarder};
use kioskscheduler::{ContentScheduler, LocalClock, SchedulerConfigExt};
use kiosksession::{SessionConfigExt, SessionManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let config = get_config();
    info!(config_dir = %config.directory(), "🖥️ Starting kioskd");

    // ========== PHASE 1 : Cache de contenu ==========
    let cache = Arc::new(config.create_content_cache()?);

    // ========== PHASE 2 : Session de rendu ==========
    let driver = config.create_render_driver()?;
    info!(driver = driver.name(), "🌐 Launching render session...");
    let session = Arc::new(SessionManager::new(
        driver,
        config.launch_options()?,
        config.session_policy(),
    ));
    // Une session dégradée n'arrête pas le démon : l'état est remonté au backend
    if let Err(e) = session.initialize().await {
        warn!(error = %e, "⚠️ Render session unavailable at startup");
    }

    // ========== PHASE 3 : Scheduler ==========
    let scheduler = ContentScheduler::spawn(
        session.clone(),
        cache.clone(),
        Arc::new(LocalClock),
        config.scheduler_timings(),
    );
    info!("✅ Content scheduler ready");

    // ========== PHASE 4 : Canal d'événements ==========
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let forwarder = spawn_state_forwarder(&scheduler, outbound_tx.clone());
    let uploader = spawn_screenshot_uploader(
        session.clone(),
        outbound_tx.clone(),
        Duration::from_secs(config.get_screenshot_interval_secs()?.max(1)),
    );
    let mut dispatcher = Dispatcher::new(
        scheduler.clone(),
        session.clone(),
        outbound_tx,
        config.get_screencast_fps()?,
    )
    .with_config(config.clone());

    let mut channel = LineChannel::stdio();
    info!("📡 Listening for backend events on stdin");

    tokio::select! {
        result = run_event_loop(&mut channel, &mut dispatcher, &mut outbound_rx) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    // ========== Arrêt ==========
    let _ = scheduler.stop();
    uploader.abort();
    forwarder.abort();
    session.dispose().await;
    info!("👋 kioskd stopped");
    Ok(())
}
