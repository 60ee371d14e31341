//! Deterministic file naming for cached URLs.
//!
//! A cached file is named `{pk}.{extension}` where `pk` is derived from the
//! URL alone, so the same URL always resolves to the same path without any
//! persistent index.

use sha2::{Digest, Sha256};
use url::Url;

/// Extensions considered as large media worth mirroring locally.
pub const CACHEABLE_EXTENSIONS: &[&str] = &[
    // video
    "mp4", "m4v", "webm", "mkv", "mov", "avi", "ogv",
    // audio
    "mp3", "m4a", "aac", "wav", "flac", "ogg",
    // images
    "jpg", "jpeg", "png", "gif", "webp", "bmp",
];

/// Length in hex characters of a cache key.
pub const PK_LEN: usize = 32;

/// Génère une clé primaire à partir d'une URL
///
/// SHA256 of the URL bytes, truncated to 16 bytes (32 hex characters).
pub fn pk_from_url(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Lower-cased extension of the last path segment of `url`, if any.
///
/// Query strings and fragments are ignored. Unparsable URLs are handled
/// as plain paths.
pub fn url_extension(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// True when the URL points at a media file from the allow-list.
pub fn is_cacheable(url: &str) -> bool {
    url_extension(url)
        .map(|ext| CACHEABLE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// File name used for `url` in the cache directory.
pub fn file_name_for(url: &str, default_extension: &str) -> String {
    let ext = url_extension(url)
        .filter(|ext| CACHEABLE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| default_extension.to_string());
    format!("{}.{}", pk_from_url(url), ext)
}

/// True when `file_name` looks like something this cache wrote.
pub(crate) fn is_cache_file_name(file_name: &str) -> bool {
    file_name.len() > PK_LEN
        && file_name.as_bytes()[PK_LEN] == b'.'
        && file_name[..PK_LEN].bytes().all(|b| b.is_ascii_hexdigit())
}
