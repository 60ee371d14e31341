//! Extension pour intégrer les délais du scheduler dans kioskconfig

use crate::timings::SchedulerTimings;
use kioskcache::CacheConfigExt;
use kioskconfig::Config;
use std::time::Duration;

/// Trait d'extension pour ajouter la configuration du scheduler à kioskconfig
pub trait SchedulerConfigExt {
    fn scheduler_timings(&self) -> SchedulerTimings;
}

impl SchedulerConfigExt for Config {
    fn scheduler_timings(&self) -> SchedulerTimings {
        let defaults = SchedulerTimings::default();
        let cache_wait = self.cache_wait_policy();
        let secs = |section: &str, key: &str, default: Duration| {
            Duration::from_secs(self.get_u64_or(&[section, key], default.as_secs()))
        };

        SchedulerTimings {
            stall_retry: secs("scheduler", "stall_retry_secs", defaults.stall_retry),
            zero_duration_fallback: secs(
                "scheduler",
                "zero_duration_fallback_secs",
                defaults.zero_duration_fallback,
            ),
            heartbeat: secs("scheduler", "heartbeat_secs", defaults.heartbeat)
                .max(Duration::from_secs(1)),
            closed_session_retry: secs(
                "scheduler",
                "closed_session_retry_secs",
                defaults.closed_session_retry,
            ),
            crash_retry: secs("scheduler", "crash_retry_secs", defaults.crash_retry),
            content_failure_skip: secs(
                "scheduler",
                "content_failure_skip_secs",
                defaults.content_failure_skip,
            ),
            cache_wait_timeout: cache_wait.timeout,
            cache_poll_interval: cache_wait.poll_interval,
        }
    }
}
