//! Cache de contenu indexé par URL
//!
//! Mirrors large media files locally so the display never waits on the
//! network once an item is scheduled. The entry map is guarded by a single
//! lock that is never held across a byte transfer.

use crate::download::{Fetcher, HttpFetcher};
use crate::entry::{CacheEntry, CacheStatus};
use crate::error::Result;
use crate::naming;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Extension used when a URL has no recognised media extension.
pub const DEFAULT_EXTENSION: &str = "mp4";

const PART_SUFFIX: &str = "part";

/// Internal bookkeeping for one URL.
#[derive(Debug, Clone)]
struct Slot {
    entry: CacheEntry,
    /// Identifier of the transfer currently allowed to complete this slot.
    download_id: Option<u64>,
    temp_path: Option<PathBuf>,
}

/// Outcome of a [`ContentCache::reconcile`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// URLs whose entries were dropped.
    pub removed_urls: Vec<String>,
    /// Files deleted from the cache directory.
    pub removed_files: Vec<PathBuf>,
}

/// URL-keyed local mirror of media files.
///
/// Note : ce type est conçu pour être utilisé derrière un `Arc<ContentCache>`.
pub struct ContentCache {
    dir: PathBuf,
    default_extension: String,
    fetcher: Arc<dyn Fetcher>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    next_download: Arc<AtomicU64>,
}

impl ContentCache {
    /// Crée un cache utilisant le client HTTP par défaut
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::with_fetcher(dir, Arc::new(HttpFetcher::new()?))
    }

    /// Crée un cache avec un `Fetcher` personnalisé
    pub fn with_fetcher<P: AsRef<Path>>(dir: P, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            default_extension: DEFAULT_EXTENSION.to_string(),
            fetcher,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_download: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Overrides the extension used for URLs without a media extension.
    pub fn with_default_extension(mut self, extension: &str) -> Self {
        let extension = extension.trim().trim_start_matches('.');
        if !extension.is_empty() {
            self.default_extension = extension.to_ascii_lowercase();
        }
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    /// True when the URL has an extension from the media allow-list.
    pub fn is_cacheable(&self, url: &str) -> bool {
        naming::is_cacheable(url)
    }

    /// Final location of `url` in the cache, whether or not it exists yet.
    pub fn file_path(&self, url: &str) -> PathBuf {
        self.dir
            .join(naming::file_name_for(url, &self.default_extension))
    }

    /// Current status of `url`.
    ///
    /// A URL unknown in memory whose file is present on disk is adopted as
    /// `Ready`: existence of the final file is the readiness signal.
    pub fn get_status(&self, url: &str) -> CacheStatus {
        if let Some(slot) = self.slots.lock().get(url) {
            return slot.entry.status;
        }

        if !self.is_cacheable(url) {
            return CacheStatus::NotCached;
        }

        // stat hors verrou
        let path = self.file_path(url);
        if !path.is_file() {
            return CacheStatus::NotCached;
        }
        self.slots
            .lock()
            .entry(url.to_string())
            .or_insert_with(|| ready_slot(url, path))
            .entry
            .status
    }

    /// Local file of `url`, only once it is `Ready`.
    pub fn get_local_path(&self, url: &str) -> Option<PathBuf> {
        match self.get_status(url) {
            CacheStatus::Ready => Some(self.file_path(url)),
            _ => None,
        }
    }

    /// Snapshot of the entry for `url`, if any.
    pub fn get_entry(&self, url: &str) -> Option<CacheEntry> {
        self.slots.lock().get(url).map(|slot| slot.entry.clone())
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.slots
            .lock()
            .values()
            .map(|slot| slot.entry.clone())
            .collect()
    }

    /// Starts mirroring `url` in the background.
    ///
    /// Idempotent: a URL already `Downloading` or `Ready` is left alone, and
    /// a URL whose final file already exists becomes `Ready` without any
    /// transfer. Returns `true` when a new download was started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request_cache(&self, url: &str) -> bool {
        if !self.is_cacheable(url) {
            tracing::debug!(url, "Ignoring cache request for non-cacheable URL");
            return false;
        }

        let final_path = self.file_path(url);
        let on_disk = final_path.is_file();
        let (download_id, temp_path) = {
            let mut slots = self.slots.lock();

            if let Some(slot) = slots.get(url) {
                if matches!(
                    slot.entry.status,
                    CacheStatus::Downloading | CacheStatus::Ready
                ) {
                    tracing::debug!(url, status = ?slot.entry.status, "Cache request is a no-op");
                    return false;
                }
            }

            if on_disk {
                tracing::debug!(url, path = %final_path.display(), "Adopting cached file found on disk");
                slots.insert(url.to_string(), ready_slot(url, final_path));
                return false;
            }

            let download_id = self.next_download.fetch_add(1, Ordering::Relaxed);
            let temp_path = self.temp_path(url, download_id);
            slots.insert(
                url.to_string(),
                Slot {
                    entry: CacheEntry::downloading(url, final_path.clone()),
                    download_id: Some(download_id),
                    temp_path: Some(temp_path.clone()),
                },
            );
            (download_id, temp_path)
        };

        tracing::info!(url, path = %final_path.display(), "Starting media download");

        let fetcher = Arc::clone(&self.fetcher);
        let slots = Arc::clone(&self.slots);
        let url = url.to_string();
        tokio::spawn(async move {
            let result = fetcher.fetch(&url, &temp_path).await;
            finish_download(&slots, &url, download_id, &temp_path, &final_path, result).await;
        });

        true
    }

    /// Polls `url` until it is `Ready` or `Error`, or `timeout` elapses.
    ///
    /// Returns the last observed status. `NotCached` is returned at once
    /// since nothing would ever change it.
    pub async fn wait_until_settled(
        &self,
        url: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> CacheStatus {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.get_status(url);
            if status.is_settled() || status == CacheStatus::NotCached {
                return status;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::warn!(url, ?timeout, "Timed out waiting for cached media");
                return status;
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    /// Drops every entry whose URL is not in `active_urls` and deletes its file.
    ///
    /// Files in the cache directory that belong to no active URL (leftovers
    /// from a previous run, abandoned partial transfers) are deleted too, so
    /// storage stays bounded by the media currently scheduled.
    pub async fn reconcile<I, S>(&self, active_urls: I) -> ReconcileReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let active: HashSet<String> = active_urls
            .into_iter()
            .map(|u| u.as_ref().to_string())
            .collect();

        let (removed, keep_files) = {
            let mut slots = self.slots.lock();
            let stale: Vec<String> = slots
                .keys()
                .filter(|url| !active.contains(*url))
                .cloned()
                .collect();
            let removed: Vec<Slot> = stale.iter().filter_map(|url| slots.remove(url)).collect();

            let mut keep_files: HashSet<PathBuf> = active
                .iter()
                .filter(|url| naming::is_cacheable(url))
                .map(|url| self.file_path(url))
                .collect();
            keep_files.extend(slots.values().filter_map(|slot| slot.temp_path.clone()));
            (removed, keep_files)
        };

        let mut report = ReconcileReport::default();

        for slot in removed {
            tracing::info!(url = %slot.entry.url, "Evicting media no longer scheduled");
            report.removed_urls.push(slot.entry.url.clone());
            if let Some(temp) = slot.temp_path {
                if remove_if_exists(&temp).await {
                    report.removed_files.push(temp);
                }
            }
            if !keep_files.contains(&slot.entry.local_path)
                && remove_if_exists(&slot.entry.local_path).await
            {
                report.removed_files.push(slot.entry.local_path);
            }
        }

        match tokio::fs::read_dir(&self.dir).await {
            Ok(mut dir) => {
                while let Ok(Some(item)) = dir.next_entry().await {
                    let path = item.path();
                    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    if !naming::is_cache_file_name(name) || keep_files.contains(&path) {
                        continue;
                    }
                    if report.removed_files.contains(&path) {
                        continue;
                    }
                    if remove_if_exists(&path).await {
                        tracing::debug!(path = %path.display(), "Removed orphaned cache file");
                        report.removed_files.push(path);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Cannot scan cache directory");
            }
        }

        report
    }

    fn temp_path(&self, url: &str, download_id: u64) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.{}",
            naming::pk_from_url(url),
            download_id,
            PART_SUFFIX
        ))
    }
}

fn ready_slot(url: &str, path: PathBuf) -> Slot {
    Slot {
        entry: CacheEntry::ready_on_disk(url, path),
        download_id: None,
        temp_path: None,
    }
}

/// True while `download_id` is still the transfer allowed to complete `url`.
fn owns_slot(slots: &Mutex<HashMap<String, Slot>>, url: &str, download_id: u64) -> bool {
    slots
        .lock()
        .get(url)
        .is_some_and(|slot| slot.download_id == Some(download_id))
}

/// Folds the result of a transfer back into the entry map.
///
/// The rename runs outside the lock. Ownership of the slot is checked
/// before it and again before publishing `Ready`: a transfer evicted or
/// superseded in between never leaves its file behind.
async fn finish_download(
    slots: &Mutex<HashMap<String, Slot>>,
    url: &str,
    download_id: u64,
    temp_path: &Path,
    final_path: &Path,
    result: Result<u64>,
) {
    let bytes = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(url, error = %e, "Media download failed");
            settle_slot(slots, url, download_id, CacheStatus::Error, Some(e.to_string()));
            remove_if_exists(temp_path).await;
            return;
        }
    };

    if !owns_slot(slots, url, download_id) {
        tracing::debug!(url, "Download finished for an evicted entry, discarding");
        remove_if_exists(temp_path).await;
        return;
    }

    if let Err(e) = tokio::fs::rename(temp_path, final_path).await {
        tracing::warn!(url, error = %e, "Failed to finalize cached media");
        settle_slot(
            slots,
            url,
            download_id,
            CacheStatus::Error,
            Some(format!("Failed to move download into place: {}", e)),
        );
        remove_if_exists(temp_path).await;
        return;
    }

    if settle_slot(slots, url, download_id, CacheStatus::Ready, None) {
        tracing::info!(url, bytes, path = %final_path.display(), "Media cached");
        return;
    }

    // Évincé pendant le rename : le fichier n'appartient plus qu'à un
    // éventuel slot Ready adopté depuis le disque
    let adopted = slots
        .lock()
        .get(url)
        .is_some_and(|slot| slot.entry.status == CacheStatus::Ready);
    if !adopted {
        tracing::debug!(url, "Entry evicted while finalizing, discarding file");
        remove_if_exists(final_path).await;
    }
}

/// Moves the slot owned by `download_id` to a terminal status.
///
/// Returns false when another transfer owns the slot or it was evicted.
fn settle_slot(
    slots: &Mutex<HashMap<String, Slot>>,
    url: &str,
    download_id: u64,
    status: CacheStatus,
    error: Option<String>,
) -> bool {
    let mut guard = slots.lock();
    match guard.get_mut(url) {
        Some(slot) if slot.download_id == Some(download_id) => {
            slot.entry.status = status;
            slot.entry.completed_at = Some(Utc::now());
            slot.entry.error = error;
            slot.download_id = None;
            slot.temp_path = None;
            true
        }
        _ => false,
    }
}

/// Removes a file, ignoring "not found". Returns true when something was deleted.
async fn remove_if_exists(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            false
        }
    }
}
