//! Seams between the scheduler and the components it drives.

use async_trait::async_trait;
use kioskcache::{CacheStatus, ContentCache};
use kiosksession::{SessionError, SessionManager};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Shows a URL on the display.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<(), SessionError>;
}

#[async_trait]
impl Renderer for SessionManager {
    async fn render(&self, url: &str) -> Result<(), SessionError> {
        self.navigate(url).await
    }
}

/// Decides where a media reference is read from.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Starts fetching `source` in the background if it is worth caching.
    fn prefetch(&self, source: &str);

    /// Local URL for `source` once cached, or `source` itself when it is not
    /// cacheable, failed, or is still downloading after `timeout`.
    async fn resolve(&self, source: &str, timeout: Duration, poll: Duration) -> String;

    /// Drops cached media not referenced by `active`.
    async fn retain_only(&self, active: &[String]);
}

#[async_trait]
impl MediaResolver for ContentCache {
    fn prefetch(&self, source: &str) {
        if self.is_cacheable(source) {
            self.request_cache(source);
        }
    }

    async fn resolve(&self, source: &str, timeout: Duration, poll: Duration) -> String {
        if !self.is_cacheable(source) {
            return source.to_string();
        }

        // A failed entry is only retried on an explicit request.
        if self.get_status(source) == CacheStatus::NotCached {
            self.request_cache(source);
        }

        match self.wait_until_settled(source, timeout, poll).await {
            CacheStatus::Ready => match self.get_local_path(source).and_then(|p| file_url(&p)) {
                Some(local) => {
                    debug!(source, local = %local, "Serving media from cache");
                    local
                }
                None => {
                    warn!(source, "Cached file vanished, using remote media");
                    source.to_string()
                }
            },
            status => {
                warn!(source, ?status, "Media not cached, using remote reference");
                source.to_string()
            }
        }
    }

    async fn retain_only(&self, active: &[String]) {
        let report = self.reconcile(active.iter().cloned()).await;
        if !report.removed_files.is_empty() {
            debug!(removed = report.removed_files.len(), "Cache reconciled");
        }
    }
}

fn file_url(path: &Path) -> Option<String> {
    let absolute = std::fs::canonicalize(path).ok()?;
    url::Url::from_file_path(absolute).ok().map(|u| u.to_string())
}

/// Resolver that never caches.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughMedia;

#[async_trait]
impl MediaResolver for PassthroughMedia {
    fn prefetch(&self, _source: &str) {}

    async fn resolve(&self, source: &str, _timeout: Duration, _poll: Duration) -> String {
        source.to_string()
    }

    async fn retain_only(&self, _active: &[String]) {}
}
