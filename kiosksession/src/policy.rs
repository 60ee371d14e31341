use std::time::Duration;
use tokio::time::Instant;

/// Thresholds driving preventive maintenance and crash recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Navigations after which the render surface is recreated.
    pub max_navigations: u32,
    /// Uptime after which the whole session is restarted.
    pub max_uptime: Duration,
    /// Bound of a single navigation (network-idle wait).
    pub navigation_timeout: Duration,
    /// Pause between teardown and relaunch.
    pub cooldown: Duration,
    /// Consecutive failed session recoveries before giving up.
    pub max_session_recoveries: u32,
    /// Content faults tolerated in the fault window before escalating.
    pub content_fault_threshold: u32,
    /// Two content faults closer than this escalate at once.
    pub content_fault_min_interval: Duration,
    /// Quiet period after which the content fault counter starts over.
    pub content_fault_window: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_navigations: 50,
            max_uptime: Duration::from_secs(6 * 60 * 60),
            navigation_timeout: Duration::from_secs(30),
            cooldown: Duration::from_secs(3),
            max_session_recoveries: 5,
            content_fault_threshold: 2,
            content_fault_min_interval: Duration::from_secs(5),
            content_fault_window: Duration::from_secs(60),
        }
    }
}

/// Short-window counter of content-level faults.
#[derive(Debug, Clone)]
pub(crate) struct FaultWindow {
    count: u32,
    last: Option<Instant>,
}

impl FaultWindow {
    pub(crate) fn new() -> Self {
        Self { count: 0, last: None }
    }

    /// Records a fault at `now`; returns true when it must escalate to a
    /// session-level recovery. The counter is reset on escalation.
    pub(crate) fn record(&mut self, now: Instant, policy: &SessionPolicy) -> bool {
        let since_last = self.last.map(|last| now.saturating_duration_since(last));

        if matches!(since_last, Some(gap) if gap > policy.content_fault_window) {
            self.count = 0;
        }

        let rapid = matches!(since_last, Some(gap) if gap < policy.content_fault_min_interval);
        self.count += 1;
        self.last = Some(now);

        if rapid || self.count > policy.content_fault_threshold {
            self.reset();
            true
        } else {
            false
        }
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
        self.last = None;
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rapid_faults_escalate() {
        let policy = SessionPolicy::default();
        let mut window = FaultWindow::new();
        let t0 = Instant::now();

        assert!(!window.record(t0, &policy));
        assert!(window.record(t0 + Duration::from_secs(2), &policy));
        assert_eq!(window.count(), 0);
    }

    #[test]
    fn test_threshold_escalates_on_third_fault() {
        let policy = SessionPolicy::default();
        let mut window = FaultWindow::new();
        let t0 = Instant::now();

        assert!(!window.record(t0, &policy));
        assert!(!window.record(t0 + Duration::from_secs(10), &policy));
        assert!(window.record(t0 + Duration::from_secs(20), &policy));
    }

    #[test]
    fn test_quiet_period_resets_counter() {
        let policy = SessionPolicy::default();
        let mut window = FaultWindow::new();
        let t0 = Instant::now();

        assert!(!window.record(t0, &policy));
        assert!(!window.record(t0 + Duration::from_secs(10), &policy));
        assert!(!window.record(t0 + Duration::from_secs(200), &policy));
        assert_eq!(window.count(), 1);
    }
}
