//! Routes backend events to the scheduler and the render session.

use crate::channel::EventChannel;
use crate::protocol::{DisplayUpdate, Envelope, InboundEvent, OutboundEvent};
use crate::screencast::{Outbound, Screencast, upload_screenshot};
use anyhow::Result;
use kioskconfig::Config;
use kioskscheduler::SchedulerHandle;
use kiosksession::{Interaction, LaunchOptions, RecoveryOutcome, SessionManager};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Session work that must run in arrival order, off the event loop.
enum SessionJob {
    Input(Interaction),
    Display(DisplayUpdate),
}

pub struct Dispatcher {
    scheduler: SchedulerHandle,
    session: Arc<SessionManager>,
    outbound: Outbound,
    screencast: Screencast,
    config: Option<Arc<Config>>,
    jobs: Option<mpsc::UnboundedSender<SessionJob>>,
}

impl Dispatcher {
    pub fn new(
        scheduler: SchedulerHandle,
        session: Arc<SessionManager>,
        outbound: Outbound,
        screencast_fps: u64,
    ) -> Self {
        let screencast = Screencast::new(session.clone(), outbound.clone(), screencast_fps);
        Self {
            scheduler,
            session,
            outbound,
            screencast,
            config: None,
            jobs: None,
        }
    }

    /// Persists display changes received from the backend into `config`.
    pub fn with_config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        // Le worker déjà lancé garde l'ancienne config
        self.jobs = None;
        self
    }

    pub fn is_screencasting(&self) -> bool {
        self.screencast.is_active()
    }

    /// Decodes and applies one envelope. Failures are logged, never returned.
    pub async fn handle(&mut self, envelope: Envelope) {
        let event = match InboundEvent::from_envelope(envelope) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Event ignored");
                return;
            }
        };
        if let Err(e) = self.dispatch(event).await {
            error!(error = %e, "Event handling failed");
        }
    }

    /// Applies one event.
    ///
    /// Session operations that can take long (navigation, reload, restart)
    /// run in their own task so the channel keeps flowing. Remote input and
    /// reconfiguration go through an ordered queue instead.
    pub async fn dispatch(&mut self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::ContentUpdate(playlist) => {
                info!(
                    playlist = %playlist.playlist_id,
                    items = playlist.len(),
                    "📋 Content update received"
                );
                self.scheduler.load_playlist(playlist)?;
                self.scheduler.start()?;
            }
            InboundEvent::Navigate(url) => {
                let session = self.session.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.navigate(&url).await {
                        warn!(url = %url, error = %e, "Ad-hoc navigation failed");
                    }
                });
            }
            InboundEvent::Refresh => {
                let session = self.session.clone();
                let outbound = self.outbound.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.reload().await {
                        warn!(error = %e, "Refresh failed");
                        return;
                    }
                    upload_screenshot(&session, &outbound).await;
                });
            }
            InboundEvent::Pause => self.scheduler.pause()?,
            InboundEvent::Resume => self.scheduler.resume()?,
            InboundEvent::Next => self.scheduler.next()?,
            InboundEvent::Previous => self.scheduler.previous()?,
            InboundEvent::BroadcastStart(broadcast) => self.scheduler.start_broadcast(broadcast)?,
            InboundEvent::BroadcastEnd => self.scheduler.end_broadcast()?,
            InboundEvent::ConfigUpdate(update) => self.enqueue(SessionJob::Display(update))?,
            InboundEvent::Remote(action) => self.enqueue(SessionJob::Input(action))?,
            InboundEvent::ScreencastStart => self.screencast.start(),
            InboundEvent::ScreencastStop => self.screencast.stop(),
            InboundEvent::DeviceRestart => {
                info!("🔄 Restart requested by backend");
                let session = self.session.clone();
                let scheduler = self.scheduler.clone();
                tokio::spawn(async move {
                    match session.recover().await {
                        Ok(RecoveryOutcome::Recovered) => {
                            if let Err(e) = scheduler.redisplay() {
                                warn!(error = %e, "Redisplay after restart failed");
                            }
                        }
                        Ok(RecoveryOutcome::AlreadyInProgress) => {
                            debug!("Restart merged into the running recovery");
                        }
                        Err(e) => error!(error = %e, "Restart failed"),
                    }
                });
            }
        }
        Ok(())
    }

    /// Queues a job for the session worker, spawning it on first use.
    fn enqueue(&mut self, job: SessionJob) -> Result<()> {
        let jobs = self.jobs.get_or_insert_with(|| {
            spawn_session_worker(
                self.session.clone(),
                self.scheduler.clone(),
                self.config.clone(),
            )
        });
        jobs.send(job)
            .map_err(|_| anyhow::anyhow!("session worker stopped"))
    }
}

/// Runs remote input and display reconfiguration one at a time, in the
/// order the backend sent them. Ends when the dispatcher is dropped.
fn spawn_session_worker(
    session: Arc<SessionManager>,
    scheduler: SchedulerHandle,
    config: Option<Arc<Config>>,
) -> mpsc::UnboundedSender<SessionJob> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job {
                SessionJob::Input(action) => {
                    if let Err(e) = session.interact(&action).await {
                        warn!(?action, error = %e, "Remote input failed");
                    }
                }
                SessionJob::Display(update) => {
                    if let Err(e) =
                        apply_display_update(&session, &scheduler, config.as_deref(), update).await
                    {
                        error!(error = %e, "Display update failed");
                    }
                }
            }
        }
        debug!("Session worker stopped");
    });
    tx
}

async fn apply_display_update(
    session: &SessionManager,
    scheduler: &SchedulerHandle,
    config: Option<&Config>,
    update: DisplayUpdate,
) -> Result<()> {
    let current = session.launch_options().await;
    let options = LaunchOptions {
        width: update.display_width.unwrap_or(current.width),
        height: update.display_height.unwrap_or(current.height),
        kiosk_mode: update.kiosk_mode.unwrap_or(current.kiosk_mode),
    };
    if options == current {
        debug!("Display configuration unchanged");
        return Ok(());
    }

    if let Some(config) = config {
        config.set_display_width(u64::from(options.width))?;
        config.set_display_height(u64::from(options.height))?;
        config.set_display_kiosk_mode(options.kiosk_mode)?;
    }

    let snapshot = match scheduler.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Scheduler unavailable, reconfiguring anyway");
            None
        }
    };
    if session.reconfigure(options).await? {
        if let Some(snapshot) = snapshot {
            if let Err(e) = scheduler.restore(snapshot) {
                warn!(error = %e, "Rotation restore failed");
            }
        }
    } else {
        debug!("Render session kept");
    }
    Ok(())
}

/// Forwards every scheduler state change to the backend.
pub fn spawn_state_forwarder(scheduler: &SchedulerHandle, outbound: Outbound) -> JoinHandle<()> {
    let mut states = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match states.recv().await {
                Ok(state) => {
                    if outbound.send(OutboundEvent::PlaybackState(state)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "State updates lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Pumps inbound events into the dispatcher and outbound events into the
/// channel until the peer closes it.
pub async fn run_event_loop<C: EventChannel>(
    channel: &mut C,
    dispatcher: &mut Dispatcher,
    outbound: &mut mpsc::UnboundedReceiver<OutboundEvent>,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;
            inbound = channel.recv() => match inbound? {
                Some(envelope) => dispatcher.handle(envelope).await,
                None => {
                    info!("Event channel closed by peer");
                    return Ok(());
                }
            },
            Some(event) = outbound.recv() => {
                channel.send(&event.into_envelope()).await?;
            }
        }
    }
}
