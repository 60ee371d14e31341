//! Types d'erreurs pour kioskcache

/// Erreurs du cache de contenu
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub fn fetch(url: &str, message: impl ToString) -> Self {
        CacheError::Fetch {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

/// Type Result spécialisé pour kioskcache
pub type Result<T> = std::result::Result<T, CacheError>;
