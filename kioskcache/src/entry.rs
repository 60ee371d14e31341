use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Readiness of a cached URL.
///
/// Transitions only move forward for a live entry:
/// `NotCached -> Downloading -> Ready | Error`. An `Error` entry may be
/// requested again, which starts a new `Downloading` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheStatus {
    NotCached,
    Downloading,
    Ready,
    Error,
}

impl CacheStatus {
    /// True once the status can no longer change without a new request.
    pub fn is_settled(self) -> bool {
        matches!(self, CacheStatus::Ready | CacheStatus::Error)
    }
}

/// Metadata of a single cached URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub url: String,
    pub status: CacheStatus,
    pub local_path: PathBuf,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CacheEntry {
    pub(crate) fn downloading(url: &str, local_path: PathBuf) -> Self {
        Self {
            url: url.to_string(),
            status: CacheStatus::Downloading,
            local_path,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub(crate) fn ready_on_disk(url: &str, local_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            url: url.to_string(),
            status: CacheStatus::Ready,
            local_path,
            started_at: now,
            completed_at: Some(now),
            error: None,
        }
    }
}
