//! # kiosksession - Supervision de la session de rendu
//!
//! Owns the single browser session that draws the kiosk screen, keeps it
//! healthy with preventive maintenance, and recovers it after crashes.
//!
//! - A navigation that never reaches network-idle still counts as shown
//! - Surface faults recreate the page; repeated ones restart the browser
//! - Session recovery is bounded; after too many failures the manager
//!   reports [`SessionState::Degraded`] instead of looping forever
//!
//! ```rust,no_run
//! use kiosksession::{DryRunDriver, LaunchOptions, SessionManager, SessionPolicy};
//! use std::sync::Arc;
//!
//! # async fn demo() -> kiosksession::Result<()> {
//! let manager = SessionManager::new(
//!     Arc::new(DryRunDriver),
//!     LaunchOptions::default(),
//!     SessionPolicy::default(),
//! );
//! manager.initialize().await?;
//! manager.navigate("https://example.com/board").await?;
//! # Ok(())
//! # }
//! ```

pub mod chrome;
pub mod driver;
pub mod dry_run;
pub mod error;
pub mod manager;
pub mod policy;
pub mod reaper;

#[cfg(feature = "kioskconfig")]
pub mod config_ext;

pub use chrome::{NoopChrome, ShellChrome};
pub use driver::{Interaction, LaunchOptions, RenderDriver, RenderSession, RenderSurface, WaitUntil};
pub use dry_run::DryRunDriver;
pub use error::{DriverError, FaultClass, Result, SessionError};
pub use manager::{RecoveryOutcome, SessionManager, SessionState, DISABLE_CREDENTIAL_APIS_SCRIPT};
pub use policy::SessionPolicy;
pub use reaper::{ProcessReaper, SystemReaper};

#[cfg(feature = "kioskconfig")]
pub use config_ext::SessionConfigExt;
