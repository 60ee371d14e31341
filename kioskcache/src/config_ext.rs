//! Extension pour intégrer le cache de contenu dans kioskconfig

use crate::cache::{ContentCache, DEFAULT_EXTENSION};
use anyhow::Result;
use kioskconfig::Config;
use std::time::Duration;

const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// How long a consumer waits for a download before falling back to the remote URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for CacheWaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Trait d'extension pour ajouter la gestion du cache à kioskconfig
pub trait CacheConfigExt {
    /// Répertoire du cache (absolu, créé si nécessaire)
    fn get_cache_dir(&self) -> Result<String>;

    /// Extension used for URLs without a recognised media extension
    fn get_cache_default_extension(&self) -> String;

    /// Readiness wait used before rendering cacheable media
    fn cache_wait_policy(&self) -> CacheWaitPolicy;

    /// Crée une instance de cache configurée
    fn create_content_cache(&self) -> Result<ContentCache>;
}

impl CacheConfigExt for Config {
    fn get_cache_dir(&self) -> Result<String> {
        self.get_managed_dir(&["cache", "directory"], DEFAULT_CACHE_DIR)
    }

    fn get_cache_default_extension(&self) -> String {
        self.get_string_or(&["cache", "default_extension"], DEFAULT_EXTENSION)
    }

    fn cache_wait_policy(&self) -> CacheWaitPolicy {
        CacheWaitPolicy {
            timeout: Duration::from_secs(
                self.get_u64_or(&["cache", "wait_timeout_secs"], DEFAULT_WAIT_TIMEOUT_SECS),
            ),
            poll_interval: Duration::from_millis(
                self.get_u64_or(&["cache", "poll_interval_ms"], DEFAULT_POLL_INTERVAL_MS)
                    .max(1),
            ),
        }
    }

    fn create_content_cache(&self) -> Result<ContentCache> {
        let dir = self.get_cache_dir()?;
        let cache = ContentCache::new(&dir)?
            .with_default_extension(&self.get_cache_default_extension());
        tracing::info!(directory = %dir, "Content cache ready");
        Ok(cache)
    }
}
