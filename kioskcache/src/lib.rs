//! # kioskcache - Cache local des médias planifiés
//!
//! Cette crate maintient une copie locale des gros fichiers média (vidéos,
//! images, audio) référencés par la playlist active, afin que l'affichage ne
//! dépende jamais de la latence réseau au moment de la rotation.
//!
//! ## Vue d'ensemble
//!
//! - Une URL correspond toujours au même fichier : `{sha256(url)[..16]}.{ext}`
//! - Un seul téléchargement à la fois par URL (single-flight)
//! - Écriture dans un fichier `.part` puis renommage atomique
//! - `reconcile` supprime tout ce qui n'est plus référencé
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use kioskcache::{CacheStatus, ContentCache};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = ContentCache::new("./cache")?;
//!     let url = "https://cdn.example.com/clip.mp4";
//!
//!     cache.request_cache(url);
//!     let status = cache
//!         .wait_until_settled(url, Duration::from_secs(300), Duration::from_secs(1))
//!         .await;
//!     if status == CacheStatus::Ready {
//!         println!("{:?}", cache.get_local_path(url));
//!     }
//!
//!     cache.reconcile([url]).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Structure des fichiers
//!
//! ```text
//! cache/
//! ├── 1a2b3c4d5e6f7a8b1a2b3c4d5e6f7a8b.mp4        # prêt
//! └── 5e6f7a8b1a2b3c4d5e6f7a8b1a2b3c4d.7.part     # transfert en cours
//! ```

pub mod cache;
pub mod download;
pub mod entry;
pub mod error;
pub mod naming;

#[cfg(feature = "kioskconfig")]
pub mod config_ext;

pub use cache::{ContentCache, ReconcileReport, DEFAULT_EXTENSION};
pub use download::{Fetcher, HttpFetcher};
pub use entry::{CacheEntry, CacheStatus};
pub use error::{CacheError, Result};
pub use naming::{is_cacheable, pk_from_url};

#[cfg(feature = "kioskconfig")]
pub use config_ext::{CacheConfigExt, CacheWaitPolicy};
