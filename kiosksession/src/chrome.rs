//! OS shell chrome (taskbar, docks) toggled around kiosk mode.

/// Capability to hide the desktop chrome while a kiosk session is shown.
///
/// Owned by the session manager and toggled on kiosk-mode entry and exit.
pub trait ShellChrome: Send + Sync {
    fn hide(&self);
    fn show(&self);
}

/// Shell chrome that does nothing, for platforms without a taskbar to hide.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopChrome;

impl ShellChrome for NoopChrome {
    fn hide(&self) {
        tracing::debug!("Shell chrome hide requested (no-op)");
    }

    fn show(&self) {
        tracing::debug!("Shell chrome show requested (no-op)");
    }
}
