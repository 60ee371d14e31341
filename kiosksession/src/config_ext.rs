//! Extension pour intégrer la session de rendu dans kioskconfig

use crate::driver::{LaunchOptions, RenderDriver};
use crate::dry_run::DryRunDriver;
use crate::policy::SessionPolicy;
use anyhow::{bail, Result};
use kioskconfig::Config;
use std::sync::Arc;
use std::time::Duration;

/// Trait d'extension pour ajouter la configuration de session à kioskconfig
pub trait SessionConfigExt {
    /// Maintenance and recovery thresholds
    fn session_policy(&self) -> SessionPolicy;

    /// Geometry and mode of the render session
    fn launch_options(&self) -> Result<LaunchOptions>;

    /// Instancie le driver nommé par `session.driver`
    fn create_render_driver(&self) -> Result<Arc<dyn RenderDriver>>;
}

impl SessionConfigExt for Config {
    fn session_policy(&self) -> SessionPolicy {
        let defaults = SessionPolicy::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(self.get_u64_or(&["session", key], default.as_secs()))
        };
        let count = |key: &str, default: u32| {
            u32::try_from(self.get_u64_or(&["session", key], u64::from(default))).unwrap_or(default)
        };

        SessionPolicy {
            max_navigations: count("max_navigations", defaults.max_navigations).max(1),
            max_uptime: secs("max_uptime_secs", defaults.max_uptime),
            navigation_timeout: secs("navigation_timeout_secs", defaults.navigation_timeout),
            cooldown: secs("cooldown_secs", defaults.cooldown),
            max_session_recoveries: count("max_session_recoveries", defaults.max_session_recoveries)
                .max(1),
            content_fault_threshold: count(
                "content_fault_threshold",
                defaults.content_fault_threshold,
            ),
            content_fault_min_interval: secs(
                "content_fault_min_interval_secs",
                defaults.content_fault_min_interval,
            ),
            content_fault_window: secs("content_fault_window_secs", defaults.content_fault_window),
        }
    }

    fn launch_options(&self) -> Result<LaunchOptions> {
        Ok(LaunchOptions {
            width: u32::try_from(self.get_display_width()?)?,
            height: u32::try_from(self.get_display_height()?)?,
            kiosk_mode: self.get_display_kiosk_mode()?,
        })
    }

    fn create_render_driver(&self) -> Result<Arc<dyn RenderDriver>> {
        let name = self.get_session_driver()?;
        match name.trim().to_lowercase().as_str() {
            "dry-run" | "dryrun" => Ok(Arc::new(DryRunDriver)),
            other => bail!("Unknown render driver '{}'", other),
        }
    }
}
