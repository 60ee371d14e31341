/// Kills processes left behind by a torn-down driver.
pub trait ProcessReaper: Send + Sync {
    /// Terminates processes matching `patterns`; returns how many were killed.
    fn reap(&self, patterns: &[String]) -> usize;
}

/// Reaper backed by the OS process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemReaper;

impl ProcessReaper for SystemReaper {
    fn reap(&self, patterns: &[String]) -> usize {
        kioskutils::reap_processes(patterns).len()
    }
}
