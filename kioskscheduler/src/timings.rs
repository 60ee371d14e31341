use std::time::Duration;

/// Delays driving rotation retries, heartbeat and cache readiness waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerTimings {
    /// Retry delay when no item satisfies its constraints.
    pub stall_retry: Duration,
    /// Substitute for zero-duration items in multi-item playlists.
    pub zero_duration_fallback: Duration,
    pub heartbeat: Duration,
    /// Wait before retrying the same item after a closed session.
    pub closed_session_retry: Duration,
    /// Wait before retrying the same item after a surface crash.
    pub crash_retry: Duration,
    /// Wait before skipping an item whose content failed to load.
    pub content_failure_skip: Duration,
    pub cache_wait_timeout: Duration,
    pub cache_poll_interval: Duration,
}

impl Default for SchedulerTimings {
    fn default() -> Self {
        Self {
            stall_retry: Duration::from_secs(60),
            zero_duration_fallback: Duration::from_secs(15),
            heartbeat: Duration::from_secs(5),
            closed_session_retry: Duration::from_secs(10),
            crash_retry: Duration::from_secs(7),
            content_failure_skip: Duration::from_secs(3),
            cache_wait_timeout: Duration::from_secs(300),
            cache_poll_interval: Duration::from_secs(1),
        }
    }
}
