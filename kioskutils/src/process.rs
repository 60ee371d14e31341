use sysinfo::{Pid, System};

/// Processus terminé lors d'un nettoyage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapedProcess {
    pub pid: u32,
    pub process_name: String,
}

/// Returns true when `name` contains one of `patterns` (case-insensitive).
///
/// Empty patterns never match, so an empty pattern list reaps nothing.
pub fn matches_any_pattern(name: &str, patterns: &[String]) -> bool {
    let name = name.to_lowercase();
    patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .any(|p| !p.is_empty() && name.contains(&p))
}

/// Kills every process whose name matches one of `patterns`.
///
/// The current process is never targeted. Kill failures are logged and
/// skipped; the returned list only holds processes that accepted the signal.
pub fn reap_processes(patterns: &[String]) -> Vec<ReapedProcess> {
    if patterns.is_empty() {
        return Vec::new();
    }

    let mut system = System::new();
    system.refresh_processes();

    let own_pid = sysinfo::get_current_pid().ok();
    let mut reaped = Vec::new();

    for (pid, process) in system.processes() {
        if Some(*pid) == own_pid {
            continue;
        }
        let name = process.name();
        if !matches_any_pattern(name, patterns) {
            continue;
        }
        if process.kill() {
            tracing::info!(pid = pid.as_u32(), process = %name, "Killed orphaned driver process");
            reaped.push(build_reaped(*pid, name));
        } else {
            tracing::warn!(pid = pid.as_u32(), process = %name, "Failed to kill orphaned driver process");
        }
    }

    reaped
}

fn build_reaped(pid: Pid, name: &str) -> ReapedProcess {
    ReapedProcess {
        pid: pid.as_u32(),
        process_name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching_is_case_insensitive() {
        let patterns = vec!["chrome".to_string(), "chromedriver".to_string()];
        assert!(matches_any_pattern("Google Chrome Helper", &patterns));
        assert!(matches_any_pattern("chromedriver", &patterns));
        assert!(!matches_any_pattern("firefox", &patterns));
    }

    #[test]
    fn test_blank_patterns_never_match() {
        let patterns = vec!["  ".to_string()];
        assert!(!matches_any_pattern("anything", &patterns));
    }

    #[test]
    fn test_reap_without_patterns_is_noop() {
        assert!(reap_processes(&[]).is_empty());
    }
}
