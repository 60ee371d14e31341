//! Frame capture for remote viewing: live screencast and periodic screenshots.

use crate::protocol::OutboundEvent;
use kiosksession::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub type Outbound = mpsc::UnboundedSender<OutboundEvent>;

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Captures the display once and wraps it for `screenshot:upload`.
pub async fn capture_screenshot(session: &SessionManager) -> kiosksession::Result<OutboundEvent> {
    let png = session.capture_frame().await?;
    Ok(OutboundEvent::Screenshot {
        png,
        url: session.current_url().await,
        timestamp: timestamp(),
    })
}

/// Captures and queues one screenshot; failures are only logged.
pub async fn upload_screenshot(session: &SessionManager, outbound: &Outbound) {
    match capture_screenshot(session).await {
        Ok(event) => {
            let _ = outbound.send(event);
        }
        Err(e) => warn!(error = %e, "Screenshot capture failed"),
    }
}

/// Uploads a screenshot every `interval` until the outbound queue closes.
pub fn spawn_screenshot_uploader(
    session: Arc<SessionManager>,
    outbound: Outbound,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Le premier tick est immédiat : on attend une période complète
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if outbound.is_closed() {
                break;
            }
            upload_screenshot(&session, &outbound).await;
        }
    })
}

/// Live frame stream polled at a fixed rate.
pub struct Screencast {
    session: Arc<SessionManager>,
    outbound: Outbound,
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl Screencast {
    pub fn new(session: Arc<SessionManager>, outbound: Outbound, fps: u64) -> Self {
        let fps = fps.clamp(1, 60);
        Self {
            session,
            outbound,
            period: Duration::from_millis(1000 / fps),
            task: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn start(&mut self) {
        if self.is_active() {
            debug!("Screencast already running");
            return;
        }
        info!(period_ms = self.period.as_millis() as u64, "🎥 Screencast started");

        let session = self.session.clone();
        let outbound = self.outbound.clone();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sequence = 0u64;
            loop {
                ticker.tick().await;
                let png = match session.capture_frame().await {
                    Ok(png) => png,
                    Err(e) => {
                        // Session en cours de récupération : on saute l'image
                        debug!(error = %e, "Screencast frame skipped");
                        continue;
                    }
                };
                let options = session.launch_options().await;
                let frame = OutboundEvent::ScreencastFrame {
                    png,
                    width: options.width,
                    height: options.height,
                    sequence,
                    timestamp: timestamp(),
                };
                if outbound.send(frame).is_err() {
                    break;
                }
                sequence += 1;
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Screencast stopped");
        }
    }
}

impl Drop for Screencast {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
