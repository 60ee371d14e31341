//! Supervised handle to the single render session.
//!
//! All operations go through one async lock, so a recovery (teardown,
//! cool-down, orphan reaping, relaunch) is never interleaved with a
//! navigation or with another recovery. Callers arriving during a
//! recovery wait behind it; explicit recovery requests arriving while one
//! is pending are dropped.

use crate::chrome::{NoopChrome, ShellChrome};
use crate::driver::{
    Interaction, LaunchOptions, RenderDriver, RenderSession, RenderSurface, WaitUntil,
};
use crate::error::{DriverError, FaultClass, Result, SessionError};
use crate::policy::{FaultWindow, SessionPolicy};
use crate::reaper::{ProcessReaper, SystemReaper};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Evaluated on every page before its own scripts: kiosk pages must never
/// raise credential or WebAuthn prompts nobody can answer.
pub const DISABLE_CREDENTIAL_APIS_SCRIPT: &str = r#"(() => {
  try {
    Object.defineProperty(navigator, 'credentials', { value: undefined, configurable: false });
    window.PublicKeyCredential = undefined;
    window.PasswordCredential = undefined;
    window.FederatedCredential = undefined;
  } catch (_) {}
})();"#;

/// Lifecycle of the render session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Recovering,
    /// Automatic recovery gave up; only an explicit recovery can leave this state.
    Degraded,
}

/// Result of an explicit recovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered,
    /// Another recovery was already pending; this request was dropped.
    AlreadyInProgress,
}

struct Inner {
    options: LaunchOptions,
    session: Option<Box<dyn RenderSession>>,
    surface: Option<Box<dyn RenderSurface>>,
    navigations: u32,
    started_at: Option<Instant>,
    failed_recoveries: u32,
    content_faults: FaultWindow,
    current_url: Option<String>,
    chrome_hidden: bool,
}

/// Clears the recovery flag when dropped.
struct RecoveryGuard<'a>(&'a AtomicBool);

impl Drop for RecoveryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SessionManager {
    driver: Arc<dyn RenderDriver>,
    reaper: Arc<dyn ProcessReaper>,
    chrome: Arc<dyn ShellChrome>,
    policy: SessionPolicy,
    inner: Mutex<Inner>,
    recovery_pending: AtomicBool,
    state_tx: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn RenderDriver>, options: LaunchOptions, policy: SessionPolicy) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        Self {
            driver,
            reaper: Arc::new(SystemReaper),
            chrome: Arc::new(NoopChrome),
            policy,
            inner: Mutex::new(Inner {
                options,
                session: None,
                surface: None,
                navigations: 0,
                started_at: None,
                failed_recoveries: 0,
                content_faults: FaultWindow::new(),
                current_url: None,
                chrome_hidden: false,
            }),
            recovery_pending: AtomicBool::new(false),
            state_tx,
        }
    }

    pub fn with_reaper(mut self, reaper: Arc<dyn ProcessReaper>) -> Self {
        self.reaper = reaper;
        self
    }

    pub fn with_chrome(mut self, chrome: Arc<dyn ShellChrome>) -> Self {
        self.chrome = chrome;
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub async fn current_url(&self) -> Option<String> {
        self.inner.lock().await.current_url.clone()
    }

    pub async fn launch_options(&self) -> LaunchOptions {
        self.inner.lock().await.options.clone()
    }

    /// Navigations performed on the current render surface.
    pub async fn navigation_count(&self) -> u32 {
        self.inner.lock().await.navigations
    }

    /// Launches the session if it is not running yet.
    pub async fn initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.session.is_some() && inner.surface.is_some() {
            return Ok(());
        }
        match self.launch_locked(&mut inner).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(driver = self.driver.name(), error = %e, "Initial launch failed, recovering");
                self.recover_session_locked(&mut inner, "initial launch failed").await
            }
        }
    }

    /// Shows `url` on the render surface.
    ///
    /// Preventive maintenance runs first. A network-idle timeout counts as
    /// success. A closed session is recovered and the navigation retried
    /// once; a crashed surface is recreated and reported as
    /// [`SessionError::Crashed`]; other failures are reported as is.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_available(&mut inner).await?;
        self.preventive_maintenance(&mut inner).await?;

        let err = match self.navigate_once(&mut inner, url).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        match err.classify() {
            FaultClass::Session => {
                warn!(url, error = %err, "Render session lost during navigation");
                let Some(_guard) = self.try_begin_recovery() else {
                    return Err(SessionError::Closed(err.to_string()));
                };
                self.recover_session_locked(&mut inner, &err.to_string()).await?;
                self.navigate_once(&mut inner, url)
                    .await
                    .map_err(|retry_err| self.map_failure(url, retry_err))
            }
            FaultClass::Content => {
                warn!(url, error = %err, "Render surface crashed during navigation");
                self.recover_surface_locked(&mut inner).await?;
                Err(SessionError::Crashed(err.to_string()))
            }
            FaultClass::Timeout | FaultClass::Other => {
                warn!(url, error = %err, "Navigation failed");
                Err(SessionError::Navigation {
                    url: url.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    /// Reloads the current page.
    pub async fn reload(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_available(&mut inner).await?;
        let surface = inner.surface.as_ref().ok_or(SessionError::NotInitialized)?;
        match surface
            .reload(WaitUntil::NetworkIdle, self.policy.navigation_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(DriverError::Timeout(_)) => Ok(()),
            Err(err) => {
                let url = inner.current_url.clone().unwrap_or_default();
                Err(self.handle_side_failure(&mut inner, &url, err).await)
            }
        }
    }

    /// Captures the visible area as PNG bytes.
    ///
    /// Capture never triggers a session-level recovery by itself; the
    /// failure is reported and the next navigation takes care of it.
    pub async fn capture_frame(&self) -> Result<Vec<u8>> {
        let inner = self.inner.lock().await;
        self.check_not_degraded(&inner)?;
        let surface = inner.surface.as_ref().ok_or(SessionError::NotInitialized)?;
        surface.screenshot().await.map_err(|err| match err.classify() {
            FaultClass::Session => SessionError::Closed(err.to_string()),
            FaultClass::Content => SessionError::Crashed(err.to_string()),
            _ => SessionError::Driver(err),
        })
    }

    /// Forwards remote input to the render surface.
    pub async fn interact(&self, action: &Interaction) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_available(&mut inner).await?;
        let surface = inner.surface.as_ref().ok_or(SessionError::NotInitialized)?;
        match surface.interact(action).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let url = inner.current_url.clone().unwrap_or_default();
                Err(self.handle_side_failure(&mut inner, &url, err).await)
            }
        }
    }

    /// Explicit full recovery (operator restart).
    ///
    /// Resets the failed-recovery counter, so it also leaves the degraded
    /// state. Dropped with a warning when another recovery is pending.
    pub async fn recover(&self) -> Result<RecoveryOutcome> {
        let Some(_guard) = self.try_begin_recovery() else {
            warn!("Recovery already in progress, dropping request");
            return Ok(RecoveryOutcome::AlreadyInProgress);
        };
        let mut inner = self.inner.lock().await;
        inner.failed_recoveries = 0;
        self.recover_session_locked(&mut inner, "explicit recovery request")
            .await?;
        Ok(RecoveryOutcome::Recovered)
    }

    /// Applies new launch options, restarting the session when they changed.
    ///
    /// Returns true when a restart happened.
    pub async fn reconfigure(&self, options: LaunchOptions) -> Result<bool> {
        let Some(_guard) = self.try_begin_recovery() else {
            warn!("Recovery in progress, reconfiguration dropped");
            return Ok(false);
        };
        let mut inner = self.inner.lock().await;
        if inner.options == options {
            return Ok(false);
        }

        info!(
            width = options.width,
            height = options.height,
            kiosk_mode = options.kiosk_mode,
            "Display configuration changed, restarting render session"
        );
        if !options.kiosk_mode && inner.chrome_hidden {
            self.chrome.show();
            inner.chrome_hidden = false;
        }
        inner.options = options;
        inner.failed_recoveries = 0;
        self.recover_session_locked(&mut inner, "display configuration changed")
            .await?;
        Ok(true)
    }

    /// Tears the session down and restores the shell chrome.
    pub async fn dispose(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown_locked(&mut inner).await;
        if inner.chrome_hidden {
            self.chrome.show();
            inner.chrome_hidden = false;
        }
        inner.current_url = None;
        self.set_state(SessionState::Uninitialized);
        info!(driver = self.driver.name(), "Render session disposed");
    }

    // ------------------------------------------------------------------
    // Internals (all called with the inner lock held)
    // ------------------------------------------------------------------

    fn try_begin_recovery(&self) -> Option<RecoveryGuard<'_>> {
        self.recovery_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RecoveryGuard(&self.recovery_pending))
    }

    /// Failure reported when an internal recovery yields to a pending one.
    fn recovery_pending_error(err: &DriverError) -> SessionError {
        SessionError::Closed(format!("{}, recovery already pending", err))
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    fn check_not_degraded(&self, inner: &Inner) -> Result<()> {
        if self.state() == SessionState::Degraded {
            return Err(SessionError::Degraded {
                attempts: inner.failed_recoveries,
            });
        }
        Ok(())
    }

    async fn ensure_available(&self, inner: &mut Inner) -> Result<()> {
        self.check_not_degraded(inner)?;
        if inner.session.is_none() {
            debug!("Render session not running, launching");
            if let Err(e) = self.launch_locked(inner).await {
                warn!(error = %e, "Launch failed, recovering");
                let Some(_guard) = self.try_begin_recovery() else {
                    return Err(Self::recovery_pending_error(&e));
                };
                self.recover_session_locked(inner, "launch failed").await?;
            }
        } else if inner.surface.is_none() {
            self.recover_surface_locked(inner).await?;
        }
        Ok(())
    }

    async fn preventive_maintenance(&self, inner: &mut Inner) -> Result<()> {
        let uptime = inner
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or_default();

        if uptime >= self.policy.max_uptime {
            // Une reprise en attente relancera la session de toute façon
            let Some(_guard) = self.try_begin_recovery() else {
                debug!(?uptime, "Preventive restart left to the pending recovery");
                return Ok(());
            };
            info!(?uptime, "Preventive render session restart");
            return self.recover_session_locked(inner, "preventive restart").await;
        }

        if inner.navigations >= self.policy.max_navigations {
            info!(
                navigations = inner.navigations,
                "Preventive render surface recycle"
            );
            return self.recreate_surface_locked(inner).await;
        }

        Ok(())
    }

    async fn navigate_once(&self, inner: &mut Inner, url: &str) -> std::result::Result<(), DriverError> {
        let surface = inner
            .surface
            .as_ref()
            .ok_or_else(|| DriverError::TargetClosed("no render surface".to_string()))?;

        match surface
            .navigate(url, WaitUntil::NetworkIdle, self.policy.navigation_timeout)
            .await
        {
            Ok(()) => {}
            Err(DriverError::Timeout(after)) => {
                debug!(url, ?after, "Network never went idle, keeping navigation");
            }
            Err(err) => return Err(err),
        }

        inner.navigations += 1;
        inner.current_url = Some(url.to_string());
        debug!(url, navigations = inner.navigations, "Navigation complete");
        Ok(())
    }

    fn map_failure(&self, url: &str, err: DriverError) -> SessionError {
        match err.classify() {
            FaultClass::Session => SessionError::Closed(err.to_string()),
            FaultClass::Content => SessionError::Crashed(err.to_string()),
            _ => SessionError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Reload/interaction failures: surface faults are repaired, session
    /// faults are reported and left to the next navigation.
    async fn handle_side_failure(&self, inner: &mut Inner, url: &str, err: DriverError) -> SessionError {
        if err.classify() == FaultClass::Content {
            if let Err(recovery_err) = self.recover_surface_locked(inner).await {
                return recovery_err;
            }
        }
        self.map_failure(url, err)
    }

    async fn launch_locked(&self, inner: &mut Inner) -> std::result::Result<(), DriverError> {
        let session = self.driver.launch(&inner.options).await?;
        let surface = match session.new_surface().await {
            Ok(surface) => surface,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    debug!(error = %close_err, "Ignoring close error after failed launch");
                }
                return Err(e);
            }
        };
        Self::setup_surface(surface.as_ref()).await;

        inner.session = Some(session);
        inner.surface = Some(surface);
        inner.navigations = 0;
        inner.started_at = Some(Instant::now());

        if inner.options.kiosk_mode && !inner.chrome_hidden {
            self.chrome.hide();
            inner.chrome_hidden = true;
        }

        self.set_state(SessionState::Ready);
        info!(
            driver = self.driver.name(),
            width = inner.options.width,
            height = inner.options.height,
            kiosk_mode = inner.options.kiosk_mode,
            "Render session ready"
        );
        Ok(())
    }

    async fn setup_surface(surface: &dyn RenderSurface) {
        if let Err(e) = surface.add_init_script(DISABLE_CREDENTIAL_APIS_SCRIPT).await {
            warn!(error = %e, "Failed to install surface setup script");
        }
    }

    /// Content-level fault: recreate the surface, escalating when faults
    /// pile up in a short window.
    async fn recover_surface_locked(&self, inner: &mut Inner) -> Result<()> {
        if inner.content_faults.record(Instant::now(), &self.policy) {
            warn!("Repeated render surface faults, escalating to session recovery");
            let Some(_guard) = self.try_begin_recovery() else {
                return Err(SessionError::Closed(
                    "repeated surface faults, recovery already pending".to_string(),
                ));
            };
            return self
                .recover_session_locked(inner, "repeated surface faults")
                .await;
        }
        self.recreate_surface_locked(inner).await
    }

    async fn recreate_surface_locked(&self, inner: &mut Inner) -> Result<()> {
        if let Some(old) = inner.surface.take() {
            if let Err(e) = old.close().await {
                debug!(error = %e, "Ignoring error while closing render surface");
            }
        }

        let created = match inner.session.as_ref() {
            Some(session) => session.new_surface().await,
            None => Err(DriverError::TargetClosed("no render session".to_string())),
        };

        match created {
            Ok(surface) => {
                Self::setup_surface(surface.as_ref()).await;
                inner.surface = Some(surface);
                inner.navigations = 0;
                self.set_state(SessionState::Ready);
                info!("Render surface recreated");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Cannot recreate render surface, recovering session");
                let Some(_guard) = self.try_begin_recovery() else {
                    return Err(Self::recovery_pending_error(&err));
                };
                self.recover_session_locked(inner, &err.to_string()).await
            }
        }
    }

    /// Best-effort release of every session resource.
    async fn teardown_locked(&self, inner: &mut Inner) {
        if let Some(surface) = inner.surface.take() {
            if let Err(e) = surface.close().await {
                debug!(error = %e, "Ignoring error while closing render surface");
            }
        }
        if let Some(session) = inner.session.take() {
            if let Err(e) = session.close().await {
                debug!(error = %e, "Ignoring error while closing render session");
            }
        }
        inner.started_at = None;
        inner.navigations = 0;
    }

    /// Session-level recovery: teardown, cool-down, reap, relaunch; bounded
    /// by `max_session_recoveries` consecutive failures.
    async fn recover_session_locked(&self, inner: &mut Inner, reason: &str) -> Result<()> {
        if inner.failed_recoveries >= self.policy.max_session_recoveries {
            self.set_state(SessionState::Degraded);
            return Err(SessionError::Degraded {
                attempts: inner.failed_recoveries,
            });
        }

        warn!(reason, driver = self.driver.name(), "Recovering render session");
        self.set_state(SessionState::Recovering);

        loop {
            self.teardown_locked(inner).await;
            tokio::time::sleep(self.policy.cooldown).await;

            let reaped = self.reaper.reap(&self.driver.process_patterns());
            if reaped > 0 {
                info!(reaped, "Reaped orphaned driver processes");
            }

            match self.launch_locked(inner).await {
                Ok(()) => {
                    inner.failed_recoveries = 0;
                    inner.content_faults.reset();
                    info!("Render session recovered");
                    return Ok(());
                }
                Err(err) => {
                    inner.failed_recoveries += 1;
                    warn!(
                        attempt = inner.failed_recoveries,
                        max = self.policy.max_session_recoveries,
                        error = %err,
                        "Render session recovery attempt failed"
                    );
                    if inner.failed_recoveries >= self.policy.max_session_recoveries {
                        error!(
                            attempts = inner.failed_recoveries,
                            "Render session degraded, manual intervention required"
                        );
                        self.set_state(SessionState::Degraded);
                        return Err(SessionError::Degraded {
                            attempts: inner.failed_recoveries,
                        });
                    }
                }
            }
        }
    }
}
