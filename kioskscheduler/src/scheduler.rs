//! Rotation state machine.
//!
//! Every transition (external command, rotation timer, render completion,
//! broadcast expiry) goes through one command queue consumed by a single
//! task, so the cursor and timers only ever have one writer. Rendering and
//! cache waits run in detached tasks whose outcome comes back as a command.

use crate::broadcast::Broadcast;
use crate::clock::Clock;
use crate::error::{Result, SchedulerError};
use crate::playlist::{Playlist, ScheduledItem};
use crate::render::{MediaResolver, Renderer};
use crate::rotation::{self, NextDelay};
use crate::state::{PlaybackCondition, PlaybackState};
use crate::timings::SchedulerTimings;
use kiosksession::SessionError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const STATE_CHANNEL_CAPACITY: usize = 64;

/// Rotation position that survives a render session restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub playlist_id: String,
    pub items: Vec<ScheduledItem>,
    /// Item rendered first on restore.
    pub cursor: usize,
}

#[derive(Debug, Clone, Copy)]
enum RenderKind {
    Rotation { index: usize, delay: NextDelay },
    Redisplay,
    Broadcast,
}

enum Command {
    LoadPlaylist(Playlist),
    Start,
    Stop,
    Pause,
    Resume,
    Next,
    Previous,
    StartBroadcast { broadcast: Broadcast, target: String },
    EndBroadcast,
    Redisplay,
    Snapshot(oneshot::Sender<Option<SchedulerSnapshot>>),
    Restore(SchedulerSnapshot),
    State(oneshot::Sender<PlaybackState>),
    RotationDue { epoch: u64 },
    RenderFinished {
        epoch: u64,
        kind: RenderKind,
        url: String,
        result: std::result::Result<(), SessionError>,
    },
    BroadcastExpired { epoch: u64 },
}

/// Cloneable front door of a running [`ContentScheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
    state_tx: broadcast::Sender<PlaybackState>,
}

impl SchedulerHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| SchedulerError::Closed)
    }

    pub fn load_playlist(&self, playlist: Playlist) -> Result<()> {
        self.send(Command::LoadPlaylist(playlist))
    }

    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    pub fn next(&self) -> Result<()> {
        self.send(Command::Next)
    }

    pub fn previous(&self) -> Result<()> {
        self.send(Command::Previous)
    }

    /// Suspends the rotation and shows `broadcast`.
    ///
    /// Fails without touching the rotation when the broadcast has nothing to show.
    pub fn start_broadcast(&self, broadcast: Broadcast) -> Result<()> {
        let target = broadcast.render_target()?;
        self.send(Command::StartBroadcast { broadcast, target })
    }

    pub fn end_broadcast(&self) -> Result<()> {
        self.send(Command::EndBroadcast)
    }

    /// Renders the current item again without touching rotation timing.
    pub fn redisplay(&self) -> Result<()> {
        self.send(Command::Redisplay)
    }

    pub fn restore(&self, snapshot: SchedulerSnapshot) -> Result<()> {
        self.send(Command::Restore(snapshot))
    }

    pub async fn snapshot(&self) -> Result<Option<SchedulerSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }

    pub async fn state(&self) -> Result<PlaybackState> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::State(tx))?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }

    /// Playback states, on every transition and on the heartbeat.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }
}

/// Rotation state saved while a broadcast is on screen.
struct SavedRotation {
    playlist: Option<Playlist>,
    cursor: usize,
    current: Option<usize>,
    current_url: Option<String>,
    remaining: Option<Duration>,
}

struct ActiveBroadcast {
    saved: SavedRotation,
    target: String,
    ends_at: Option<Instant>,
    expiry: Option<JoinHandle<()>>,
}

pub struct ContentScheduler {
    rx: mpsc::UnboundedReceiver<Command>,
    self_tx: mpsc::WeakUnboundedSender<Command>,
    state_tx: broadcast::Sender<PlaybackState>,
    renderer: Arc<dyn Renderer>,
    media: Arc<dyn MediaResolver>,
    clock: Arc<dyn Clock>,
    timings: SchedulerTimings,

    playlist: Option<Playlist>,
    /// Next position to scan from; always past the displayed item.
    cursor: usize,
    current: Option<usize>,
    current_url: Option<String>,
    pending_render: Option<usize>,
    running: bool,
    paused: bool,
    paused_remaining: Option<Duration>,
    stalled: bool,
    condition: PlaybackCondition,

    timer: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
    timer_epoch: u64,
    render_epoch: Arc<AtomicU64>,
    render_lock: Arc<Mutex<()>>,

    broadcast: Option<ActiveBroadcast>,
    broadcast_epoch: u64,
    deferred_playlist: Option<Playlist>,
}

impl ContentScheduler {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        media: Arc<dyn MediaResolver>,
        clock: Arc<dyn Clock>,
        timings: SchedulerTimings,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);

        let scheduler = Self {
            rx,
            self_tx: tx.downgrade(),
            state_tx: state_tx.clone(),
            renderer,
            media,
            clock,
            timings,
            playlist: None,
            cursor: 0,
            current: None,
            current_url: None,
            pending_render: None,
            running: false,
            paused: false,
            paused_remaining: None,
            stalled: false,
            condition: PlaybackCondition::None,
            timer: None,
            deadline: None,
            timer_epoch: 0,
            render_epoch: Arc::new(AtomicU64::new(0)),
            render_lock: Arc::new(Mutex::new(())),
            broadcast: None,
            broadcast_epoch: 0,
            deferred_playlist: None,
        };

        (scheduler, SchedulerHandle { tx, state_tx })
    }

    /// Creates the scheduler and runs it on the current runtime.
    pub fn spawn(
        renderer: Arc<dyn Renderer>,
        media: Arc<dyn MediaResolver>,
        clock: Arc<dyn Clock>,
        timings: SchedulerTimings,
    ) -> SchedulerHandle {
        let (scheduler, handle) = Self::new(renderer, media, clock, timings);
        tokio::spawn(scheduler.run());
        handle
    }

    /// Consumes commands until every handle is dropped.
    pub async fn run(mut self) {
        let mut heartbeat = tokio::time::interval(self.timings.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Content scheduler started");

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = heartbeat.tick() => self.publish(),
            }
        }

        self.cancel_timer();
        if let Some(expiry) = self.broadcast.take().and_then(|b| b.expiry) {
            expiry.abort();
        }
        info!("Content scheduler stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::LoadPlaylist(playlist) => self.load_playlist(playlist).await,
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Next => self.step(false),
            Command::Previous => self.step(true),
            Command::StartBroadcast { broadcast, target } => self.start_broadcast(broadcast, target),
            Command::EndBroadcast => self.end_broadcast().await,
            Command::Redisplay => self.redisplay(),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Restore(snapshot) => self.restore(snapshot),
            Command::State(reply) => {
                let _ = reply.send(self.build_state());
            }
            Command::RotationDue { epoch } => {
                if epoch == self.timer_epoch && self.running && !self.paused && self.broadcast.is_none() {
                    self.rotate();
                }
            }
            Command::RenderFinished {
                epoch,
                kind,
                url,
                result,
            } => self.render_finished(epoch, kind, url, result),
            Command::BroadcastExpired { epoch } => {
                if epoch == self.broadcast_epoch && self.broadcast.is_some() {
                    info!("Broadcast duration elapsed");
                    self.end_broadcast().await;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Playlist and transport commands
    // ------------------------------------------------------------------

    async fn load_playlist(&mut self, playlist: Playlist) {
        let incoming = Playlist::new(playlist.playlist_id, playlist.items);
        if self.broadcast.is_some() {
            info!(playlist = %incoming.playlist_id, "Broadcast active, playlist update deferred");
            self.deferred_playlist = Some(incoming);
            return;
        }
        self.apply_playlist(incoming).await;
    }

    async fn apply_playlist(&mut self, incoming: Playlist) {
        // Reconcile before prefetching so no removal races a new transfer.
        let sources = incoming.source_refs();
        self.media.retain_only(&sources).await;
        for source in &sources {
            self.media.prefetch(source);
        }

        if incoming.is_empty() {
            info!(playlist = %incoming.playlist_id, "Empty playlist, stopping rotation");
            self.stop();
            self.playlist = Some(incoming);
            self.publish();
            return;
        }

        let restart = match &self.playlist {
            Some(old) if self.running => old.requires_restart(&incoming, self.current),
            _ => true,
        };

        if !restart {
            debug!(playlist = %incoming.playlist_id, "Rotation unaffected by playlist update");
            self.playlist = Some(incoming);
            self.publish();
            return;
        }

        info!(
            playlist = %incoming.playlist_id,
            items = incoming.len(),
            "Loading playlist"
        );
        self.cancel_timer();
        self.supersede_renders();
        self.playlist = Some(incoming);
        self.cursor = 0;
        self.current = None;
        self.current_url = None;
        self.paused_remaining = None;
        self.stalled = false;
        self.condition = PlaybackCondition::None;

        if self.running {
            self.rotate();
        } else {
            self.publish();
        }
    }

    fn start(&mut self) {
        if self.running {
            debug!("Scheduler already running");
            return;
        }
        if self.playlist.as_ref().map_or(true, Playlist::is_empty) {
            debug!("No playlist to start");
            return;
        }
        if self.broadcast.is_some() {
            debug!("Start ignored while a broadcast is on screen");
            return;
        }
        info!("Starting rotation");
        self.running = true;
        self.paused = false;
        self.paused_remaining = None;
        self.rotate();
    }

    fn stop(&mut self) {
        if let Some(active) = self.broadcast.take() {
            if let Some(expiry) = active.expiry {
                expiry.abort();
            }
            self.broadcast_epoch += 1;
        }
        if let Some(deferred) = self.deferred_playlist.take() {
            self.playlist = Some(deferred);
        }
        self.cancel_timer();
        self.supersede_renders();
        if self.running {
            info!("Stopping rotation");
        }
        self.running = false;
        self.paused = false;
        self.paused_remaining = None;
        self.cursor = 0;
        self.current = None;
        self.current_url = None;
        self.stalled = false;
        self.condition = PlaybackCondition::None;
        self.publish();
    }

    fn pause(&mut self) {
        if !self.running || self.paused {
            return;
        }
        if self.broadcast.is_some() {
            debug!("Pause ignored while a broadcast is on screen");
            return;
        }
        let now = Instant::now();
        self.paused_remaining = self.deadline.map(|d| d.saturating_duration_since(now));
        self.paused = true;
        self.cancel_timer();
        info!(remaining = ?self.paused_remaining, "Rotation paused");
        self.publish();
    }

    fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        info!(remaining = ?self.paused_remaining, "Rotation resumed");
        match self.paused_remaining.take() {
            Some(remaining) if remaining.is_zero() => self.rotate(),
            Some(remaining) => {
                self.schedule_rotation(remaining);
                self.publish();
            }
            None if self.current.is_none() && self.pending_render.is_none() => self.rotate(),
            None => self.publish(),
        }
    }

    /// Next / Previous: constraints are evaluated again from the new cursor.
    fn step(&mut self, backwards: bool) {
        if !self.running || self.broadcast.is_some() {
            return;
        }
        let Some(len) = self.playlist.as_ref().map(Playlist::len).filter(|len| *len > 0) else {
            return;
        };
        if backwards {
            self.cursor = rotation::previous_cursor(self.cursor, len);
        }
        debug!(cursor = self.cursor, backwards, "Manual rotation");
        self.rotate();
    }

    fn redisplay(&mut self) {
        if let Some(active) = &self.broadcast {
            let target = active.target.clone();
            self.spawn_render(RenderKind::Broadcast, target, false);
            return;
        }
        match self.current_source() {
            Some(source) => self.spawn_render(RenderKind::Redisplay, source, true),
            None if self.running && !self.paused && self.pending_render.is_none() => self.rotate(),
            None => {}
        }
    }

    // ------------------------------------------------------------------
    // Rotation
    // ------------------------------------------------------------------

    /// Picks the next qualifying item from the cursor and renders it, or
    /// reports a stall and retries later.
    fn rotate(&mut self) {
        self.cancel_timer();
        self.supersede_renders();

        let now = self.clock.now();
        let fallback = self.timings.zero_duration_fallback;
        let choice = match self.playlist.as_ref() {
            Some(playlist) if !playlist.is_empty() => {
                let len = playlist.len();
                self.cursor %= len;
                match rotation::find_next(playlist, self.cursor, now) {
                    Some(index) => {
                        let item = playlist.items[index].clone();
                        let delay = rotation::next_delay(&item, len, now, fallback);
                        Ok((index, len, item, delay))
                    }
                    None => Err(playlist.playlist_id.clone()),
                }
            }
            _ => return,
        };

        match choice {
            Err(playlist_id) => {
                warn!(
                    playlist = %playlist_id,
                    retry = ?self.timings.stall_retry,
                    "No displayable item, retrying later"
                );
                self.stalled = true;
                self.condition = PlaybackCondition::NoDisplayableItem;
                self.current = None;
                self.current_url = None;
                self.schedule_rotation(self.timings.stall_retry);
            }
            Ok((index, len, item, delay)) => {
                self.cursor = (index + 1) % len;
                self.stalled = false;
                if self.condition == PlaybackCondition::NoDisplayableItem {
                    self.condition = PlaybackCondition::None;
                }
                if delay == NextDelay::Immediate {
                    debug!(item = %item.id, "Time window already closed, rotating immediately");
                    self.schedule_rotation(Duration::ZERO);
                } else {
                    debug!(item = %item.id, index, ?delay, "Rendering item");
                    self.spawn_render(RenderKind::Rotation { index, delay }, item.source_ref, true);
                }
            }
        }
        self.publish();
    }

    fn render_finished(
        &mut self,
        epoch: u64,
        kind: RenderKind,
        url: String,
        result: std::result::Result<(), SessionError>,
    ) {
        if epoch != self.render_epoch.load(Ordering::SeqCst) {
            debug!(url, "Ignoring outcome of a superseded render");
            return;
        }

        match (kind, result) {
            (RenderKind::Rotation { index, delay }, Ok(())) => {
                self.pending_render = None;
                self.current = Some(index);
                self.current_url = Some(url);
                self.condition = PlaybackCondition::None;
                let delay = delay.as_duration();
                if self.paused {
                    self.paused_remaining = delay;
                } else if let Some(delay) = delay {
                    self.schedule_rotation(delay);
                }
            }
            (RenderKind::Rotation { index, .. }, Err(err)) => {
                self.pending_render = None;
                self.render_failed(index, &err);
            }
            (RenderKind::Redisplay, Ok(())) => {
                self.current_url = Some(url);
                self.condition = PlaybackCondition::None;
            }
            (RenderKind::Redisplay, Err(err)) => {
                warn!(url, error = %err, "Redisplay failed");
                self.condition = condition_for(&err);
            }
            (RenderKind::Broadcast, Ok(())) => {}
            (RenderKind::Broadcast, Err(err)) => {
                warn!(error = %err, "Broadcast render failed");
                self.condition = condition_for(&err);
            }
        }
        self.publish();
    }

    fn render_failed(&mut self, index: usize, err: &SessionError) {
        let (retry_same, delay) = if err.is_session_unavailable() {
            (true, self.timings.closed_session_retry)
        } else if err.is_crash() {
            (true, self.timings.crash_retry)
        } else {
            (false, self.timings.content_failure_skip)
        };

        if retry_same {
            warn!(index, error = %err, retry = ?delay, "Render unavailable, retrying same item");
            self.cursor = index;
        } else {
            warn!(index, error = %err, skip = ?delay, "Content failed to render, skipping");
        }
        self.condition = condition_for(err);

        if self.paused {
            self.paused_remaining = Some(delay);
        } else {
            self.schedule_rotation(delay);
        }
    }

    // ------------------------------------------------------------------
    // Broadcast
    // ------------------------------------------------------------------

    fn start_broadcast(&mut self, broadcast: Broadcast, target: String) {
        let now = Instant::now();

        match self.broadcast.as_mut() {
            Some(active) => {
                if let Some(expiry) = active.expiry.take() {
                    expiry.abort();
                }
                active.target = target.clone();
            }
            None => {
                // A render still in flight is replayed from scratch on restore.
                let saved = match self.pending_render {
                    Some(pending) => SavedRotation {
                        playlist: self.playlist.clone(),
                        cursor: pending,
                        current: None,
                        current_url: None,
                        remaining: None,
                    },
                    None => SavedRotation {
                        playlist: self.playlist.clone(),
                        cursor: self.cursor,
                        current: self.current,
                        current_url: self.current_url.clone(),
                        remaining: if self.paused {
                            self.paused_remaining
                        } else {
                            self.deadline.map(|d| d.saturating_duration_since(now))
                        },
                    },
                };
                self.broadcast = Some(ActiveBroadcast {
                    saved,
                    target: target.clone(),
                    ends_at: None,
                    expiry: None,
                });
            }
        }

        self.cancel_timer();
        self.supersede_renders();
        self.broadcast_epoch += 1;

        let epoch = self.broadcast_epoch;
        let duration = broadcast.duration();
        let expiry = duration.map(|duration| {
            let tx = self.self_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                if let Some(tx) = tx.upgrade() {
                    let _ = tx.send(Command::BroadcastExpired { epoch });
                }
            })
        });
        if let Some(active) = self.broadcast.as_mut() {
            active.ends_at = duration.map(|d| now + d);
            active.expiry = expiry;
        }

        info!(kind = ?broadcast.kind, duration_ms = broadcast.duration_ms, "Broadcast started");
        self.spawn_render(RenderKind::Broadcast, target, false);
        self.publish();
    }

    async fn end_broadcast(&mut self) {
        let Some(active) = self.broadcast.take() else {
            debug!("No broadcast to end");
            return;
        };
        if let Some(expiry) = active.expiry {
            expiry.abort();
        }
        self.broadcast_epoch += 1;
        self.cancel_timer();
        self.supersede_renders();

        let saved = active.saved;
        self.playlist = saved.playlist;
        self.cursor = saved.cursor;
        self.current = saved.current;
        self.current_url = saved.current_url;
        self.paused_remaining = if self.paused { saved.remaining } else { None };
        info!(cursor = self.cursor, "Broadcast ended, restoring rotation");

        self.resume_after_broadcast(saved.remaining);

        if let Some(deferred) = self.deferred_playlist.take() {
            self.apply_playlist(deferred).await;
        }
        self.publish();
    }

    fn resume_after_broadcast(&mut self, remaining: Option<Duration>) {
        let source = self.current_source();

        if !self.running || self.paused {
            if let Some(source) = source {
                self.spawn_render(RenderKind::Redisplay, source, true);
            }
            return;
        }

        match (source, remaining) {
            (Some(_), Some(remaining)) if remaining.is_zero() => self.rotate(),
            (Some(source), Some(remaining)) => {
                self.spawn_render(RenderKind::Redisplay, source, true);
                self.schedule_rotation(remaining);
            }
            (Some(source), None) => self.spawn_render(RenderKind::Redisplay, source, true),
            (None, _) => self.rotate(),
        }
    }

    // ------------------------------------------------------------------
    // Snapshot / restore
    // ------------------------------------------------------------------

    fn snapshot(&self) -> Option<SchedulerSnapshot> {
        let (playlist, cursor, current) = match &self.broadcast {
            Some(active) => (
                active.saved.playlist.as_ref(),
                active.saved.cursor,
                active.saved.current,
            ),
            None => (
                self.playlist.as_ref(),
                self.cursor,
                self.pending_render.or(self.current),
            ),
        };
        playlist.map(|p| SchedulerSnapshot {
            playlist_id: p.playlist_id.clone(),
            items: p.items.clone(),
            cursor: current.unwrap_or(cursor),
        })
    }

    fn restore(&mut self, snapshot: SchedulerSnapshot) {
        let playlist = Playlist {
            playlist_id: snapshot.playlist_id,
            items: snapshot.items,
        };
        let cursor = match playlist.len() {
            0 => 0,
            len => snapshot.cursor % len,
        };
        info!(playlist = %playlist.playlist_id, cursor, "Restoring rotation snapshot");

        if let Some(active) = self.broadcast.as_mut() {
            active.saved = SavedRotation {
                playlist: Some(playlist),
                cursor,
                current: None,
                current_url: None,
                remaining: None,
            };
            return;
        }

        self.cancel_timer();
        self.supersede_renders();
        self.playlist = Some(playlist);
        self.cursor = cursor;
        self.current = None;
        self.current_url = None;
        self.paused_remaining = None;
        self.stalled = false;

        if self.running && !self.paused {
            self.rotate();
        } else {
            self.publish();
        }
    }

    // ------------------------------------------------------------------
    // Timers, renders and state
    // ------------------------------------------------------------------

    fn cancel_timer(&mut self) {
        self.timer_epoch += 1;
        self.deadline = None;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn schedule_rotation(&mut self, delay: Duration) {
        self.cancel_timer();
        let epoch = self.timer_epoch;
        let tx = self.self_tx.clone();
        self.deadline = Some(Instant::now() + delay);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::RotationDue { epoch });
            }
        }));
    }

    /// Invalidates every render still queued or in flight.
    fn supersede_renders(&mut self) {
        self.render_epoch.fetch_add(1, Ordering::SeqCst);
        self.pending_render = None;
    }

    fn spawn_render(&mut self, kind: RenderKind, source: String, resolve: bool) {
        if let RenderKind::Rotation { index, .. } = kind {
            self.pending_render = Some(index);
        }

        let epoch = self.render_epoch.load(Ordering::SeqCst);
        let current_epoch = self.render_epoch.clone();
        let lock = self.render_lock.clone();
        let renderer = self.renderer.clone();
        let media = self.media.clone();
        let tx = self.self_tx.clone();
        let wait = self.timings.cache_wait_timeout;
        let poll = self.timings.cache_poll_interval;

        tokio::spawn(async move {
            let url = if resolve {
                media.resolve(&source, wait, poll).await
            } else {
                source
            };

            // One render at a time, in submission order.
            let _serial = lock.lock().await;
            if current_epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            let result = renderer.render(&url).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::RenderFinished {
                    epoch,
                    kind,
                    url,
                    result,
                });
            }
        });
    }

    fn current_source(&self) -> Option<String> {
        let index = self.current?;
        self.playlist
            .as_ref()
            .and_then(|p| p.get(index))
            .map(|item| item.source_ref.clone())
    }

    fn build_state(&self) -> PlaybackState {
        let now = Instant::now();
        let playlist = self.playlist.as_ref();

        if let Some(active) = &self.broadcast {
            return PlaybackState {
                is_running: self.running,
                is_paused: self.paused,
                is_broadcasting: true,
                current_item_id: None,
                current_item_index: None,
                playlist_id: playlist.map(|p| p.playlist_id.clone()),
                total_items: playlist.map_or(0, Playlist::len),
                current_url: Some(active.target.clone()),
                time_remaining_ms: active
                    .ends_at
                    .map(|end| end.saturating_duration_since(now).as_millis() as u64),
                condition: self.condition,
                is_stalled: false,
            };
        }

        let remaining = if self.paused {
            self.paused_remaining
        } else if self.current.is_some() {
            self.deadline.map(|d| d.saturating_duration_since(now))
        } else {
            None
        };

        PlaybackState {
            is_running: self.running,
            is_paused: self.paused,
            is_broadcasting: false,
            current_item_id: self
                .current
                .and_then(|i| playlist.and_then(|p| p.get(i)))
                .map(|item| item.id.clone()),
            current_item_index: self.current,
            playlist_id: playlist.map(|p| p.playlist_id.clone()),
            total_items: playlist.map_or(0, Playlist::len),
            current_url: self.current_url.clone(),
            time_remaining_ms: remaining.map(|d| d.as_millis() as u64),
            condition: self.condition,
            is_stalled: self.stalled,
        }
    }

    fn publish(&self) {
        // No subscriber is not an error.
        let _ = self.state_tx.send(self.build_state());
    }
}

fn condition_for(err: &SessionError) -> PlaybackCondition {
    match err {
        SessionError::Degraded { .. } => PlaybackCondition::SessionDegraded,
        err if err.is_session_unavailable() || err.is_crash() => PlaybackCondition::RenderUnavailable,
        _ => PlaybackCondition::None,
    }
}
