use std::time::Duration;
use thiserror::Error;

/// Failures reported by a rendering driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Target closed: {0}")]
    TargetClosed(String),
    #[error("Target crashed: {0}")]
    TargetCrashed(String),
    #[error("Driver disconnected: {0}")]
    Disconnected(String),
    #[error("Launch failed: {0}")]
    Launch(String),
    #[error("{0}")]
    Protocol(String),
}

/// How the session manager must react to a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// The wait policy expired; the page is usable.
    Timeout,
    /// The render surface is unusable but the session is alive.
    Content,
    /// The whole session is gone.
    Session,
    /// Anything else: reported to the caller as is.
    Other,
}

/// Substrings of native crash reports that always mean the session is lost.
const FATAL_SIGNATURES: &[&str] = &[
    "sigsegv",
    "sigbus",
    "sigabrt",
    "sigtrap",
    "sigill",
    "status_access_violation",
    "status_stack_overflow",
    "status_breakpoint",
    "out of memory",
    "gpu process exited",
];

const SESSION_SIGNATURES: &[&str] = &[
    "target closed",
    "session closed",
    "browser has been closed",
    "browser closed",
    "connection closed",
    "websocket is not open",
    "has been disconnected",
];

const CONTENT_SIGNATURES: &[&str] = &["page crashed", "target crashed", "aw, snap"];

impl DriverError {
    /// Classifies the failure from its kind and from known message signatures.
    pub fn classify(&self) -> FaultClass {
        let message = self.to_string().to_lowercase();
        if FATAL_SIGNATURES.iter().any(|s| message.contains(s)) {
            return FaultClass::Session;
        }
        match self {
            DriverError::Timeout(_) => FaultClass::Timeout,
            DriverError::TargetClosed(_) | DriverError::Disconnected(_) => FaultClass::Session,
            DriverError::TargetCrashed(_) => FaultClass::Content,
            DriverError::Launch(_) | DriverError::Protocol(_) => {
                if SESSION_SIGNATURES.iter().any(|s| message.contains(s)) {
                    FaultClass::Session
                } else if CONTENT_SIGNATURES.iter().any(|s| message.contains(s)) {
                    FaultClass::Content
                } else {
                    FaultClass::Other
                }
            }
        }
    }
}

/// Errors surfaced by the session manager to its callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Render session closed: {0}")]
    Closed(String),
    #[error("Render surface crashed: {0}")]
    Crashed(String),
    #[error("Render session degraded after {attempts} failed recoveries, manual intervention required")]
    Degraded { attempts: u32 },
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("Render session is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl SessionError {
    /// True when the caller should wait for a session recovery before retrying.
    pub fn is_session_unavailable(&self) -> bool {
        matches!(
            self,
            SessionError::Closed(_) | SessionError::Degraded { .. } | SessionError::NotInitialized
        )
    }

    pub fn is_crash(&self) -> bool {
        matches!(self, SessionError::Crashed(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_kind() {
        assert_eq!(
            DriverError::Timeout(Duration::from_secs(30)).classify(),
            FaultClass::Timeout
        );
        assert_eq!(
            DriverError::TargetClosed("page".into()).classify(),
            FaultClass::Session
        );
        assert_eq!(
            DriverError::TargetCrashed("renderer".into()).classify(),
            FaultClass::Content
        );
        assert_eq!(
            DriverError::Protocol("net::ERR_NAME_NOT_RESOLVED".into()).classify(),
            FaultClass::Other
        );
    }

    #[test]
    fn test_native_signature_escalates_to_session() {
        let err = DriverError::TargetCrashed("renderer received SIGSEGV".into());
        assert_eq!(err.classify(), FaultClass::Session);
        let err = DriverError::Protocol("exit code STATUS_ACCESS_VIOLATION".into());
        assert_eq!(err.classify(), FaultClass::Session);
    }

    #[test]
    fn test_message_signatures_on_protocol_errors() {
        assert_eq!(
            DriverError::Protocol("Protocol error: Target closed.".into()).classify(),
            FaultClass::Session
        );
        assert_eq!(
            DriverError::Protocol("Page crashed!".into()).classify(),
            FaultClass::Content
        );
    }
}
