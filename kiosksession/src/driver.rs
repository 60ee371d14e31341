//! Seam between the session manager and a browser-automation driver.
//!
//! The driver owns the native browser; the manager only sees three nested
//! handles: a driver that launches sessions, a session that opens render
//! surfaces (pages), and a surface that navigates, captures and interacts.

use crate::error::DriverError;
use async_trait::async_trait;
use std::time::Duration;

/// Geometry and mode of the rendering session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub width: u32,
    pub height: u32,
    pub kiosk_mode: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            kiosk_mode: true,
        }
    }
}

/// Condition ending a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    NetworkIdle,
}

/// Remote input forwarded to the render surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Click { x: f64, y: f64 },
    Type { text: String },
    Key { key: String },
    Scroll { x: f64, y: f64, delta_x: f64, delta_y: f64 },
}

#[async_trait]
pub trait RenderDriver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Starts a fresh browser instance.
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn RenderSession>, DriverError>;

    /// Process name patterns belonging to this driver, used to reap orphans.
    fn process_patterns(&self) -> Vec<String> {
        Vec::new()
    }
}

#[async_trait]
pub trait RenderSession: Send + Sync {
    async fn new_surface(&self) -> Result<Box<dyn RenderSurface>, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Registers a script evaluated before any page script on every navigation.
    async fn add_init_script(&self, script: &str) -> Result<(), DriverError>;

    async fn navigate(&self, url: &str, wait: WaitUntil, timeout: Duration)
        -> Result<(), DriverError>;

    async fn reload(&self, wait: WaitUntil, timeout: Duration) -> Result<(), DriverError>;

    /// PNG-encoded capture of the visible area.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    async fn interact(&self, action: &Interaction) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}
