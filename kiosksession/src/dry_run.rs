//! Driver without a browser: logs what would be displayed.
//!
//! Used on headless hosts and for integration runs of the daemon.

use crate::driver::{
    Interaction, LaunchOptions, RenderDriver, RenderSession, RenderSurface, WaitUntil,
};
use crate::error::DriverError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// 1x1 transparent PNG returned by every capture.
pub const BLANK_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae,
    0x42, 0x60, 0x82,
];

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunDriver;

#[async_trait]
impl RenderDriver for DryRunDriver {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn RenderSession>, DriverError> {
        info!(
            width = options.width,
            height = options.height,
            kiosk_mode = options.kiosk_mode,
            "[dry-run] launch"
        );
        Ok(Box::new(DryRunSession))
    }
}

struct DryRunSession;

#[async_trait]
impl RenderSession for DryRunSession {
    async fn new_surface(&self) -> Result<Box<dyn RenderSurface>, DriverError> {
        Ok(Box::new(DryRunSurface))
    }

    async fn close(&self) -> Result<(), DriverError> {
        info!("[dry-run] close session");
        Ok(())
    }
}

struct DryRunSurface;

#[async_trait]
impl RenderSurface for DryRunSurface {
    async fn add_init_script(&self, _script: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn navigate(&self, url: &str, _wait: WaitUntil, _timeout: Duration) -> Result<(), DriverError> {
        info!(url, "[dry-run] navigate");
        Ok(())
    }

    async fn reload(&self, _wait: WaitUntil, _timeout: Duration) -> Result<(), DriverError> {
        info!("[dry-run] reload");
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(BLANK_PNG.to_vec())
    }

    async fn interact(&self, action: &Interaction) -> Result<(), DriverError> {
        info!(?action, "[dry-run] interact");
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_surface_captures_png() {
        let session = DryRunDriver.launch(&LaunchOptions::default()).await.unwrap();
        let surface = session.new_surface().await.unwrap();
        surface
            .navigate("https://example.com", WaitUntil::NetworkIdle, Duration::from_secs(1))
            .await
            .unwrap();
        let png = surface.screenshot().await.unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
