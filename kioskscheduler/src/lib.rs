//! # kioskscheduler - Rotation du contenu affiché
//!
//! Decides what the kiosk shows right now. A [`ContentScheduler`] owns the
//! active [`Playlist`] and rotates through it, skipping items outside their
//! time window or day set, resolving cacheable media through a
//! [`MediaResolver`] and rendering through a [`Renderer`].
//!
//! The scheduler runs as a single task; [`SchedulerHandle`] sends it
//! commands and subscribes to [`PlaybackState`] updates.
//!
//! ```rust,no_run
//! use kioskscheduler::{
//!     ContentScheduler, LocalClock, PassthroughMedia, Playlist, ScheduledItem, SchedulerTimings,
//! };
//! use kiosksession::{DryRunDriver, LaunchOptions, SessionManager, SessionPolicy};
//! use std::sync::Arc;
//!
//! # async fn demo() -> kioskscheduler::Result<()> {
//! let session = Arc::new(SessionManager::new(
//!     Arc::new(DryRunDriver),
//!     LaunchOptions::default(),
//!     SessionPolicy::default(),
//! ));
//! let scheduler = ContentScheduler::spawn(
//!     session,
//!     Arc::new(PassthroughMedia),
//!     Arc::new(LocalClock),
//!     SchedulerTimings::default(),
//! );
//! scheduler.load_playlist(Playlist::new(
//!     "lobby",
//!     vec![ScheduledItem::new("welcome", "https://example.com/welcome", 30)],
//! ))?;
//! scheduler.start()?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod clock;
pub mod constraints;
pub mod error;
pub mod playlist;
pub mod render;
pub mod rotation;
pub mod scheduler;
pub mod state;
pub mod timings;

#[cfg(feature = "kioskconfig")]
pub mod config_ext;

pub use broadcast::{Broadcast, BroadcastKind};
pub use clock::{Clock, LocalClock};
pub use constraints::{ItemConstraints, TimeOfDay, TimeWindow};
pub use error::{Result, SchedulerError};
pub use playlist::{Playlist, ScheduledItem};
pub use render::{MediaResolver, PassthroughMedia, Renderer};
pub use rotation::NextDelay;
pub use scheduler::{ContentScheduler, SchedulerHandle, SchedulerSnapshot};
pub use state::{PlaybackCondition, PlaybackState};
pub use timings::SchedulerTimings;

#[cfg(feature = "kioskconfig")]
pub use config_ext::SchedulerConfigExt;
