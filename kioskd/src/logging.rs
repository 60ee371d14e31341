//! Installation du subscriber `tracing` du démon.
//!
//! stdout porte le canal d'événements : les logs partent sur stderr.

use kioskconfig::get_config;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when `RUST_LOG` is unset: the configured minimum level.
pub fn default_directive(min_level: &str) -> String {
    match min_level.trim().to_ascii_uppercase().as_str() {
        "ERROR" => "error",
        "WARN" | "WARNING" => "warn",
        "DEBUG" => "debug",
        "TRACE" => "trace",
        _ => "info",
    }
    .to_string()
}

pub fn init_logging() {
    let min_level = get_config()
        .get_log_min_level()
        .unwrap_or_else(|_| "INFO".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&min_level)));

    Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_ansi(false),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("DEBUG"), "debug");
        assert_eq!(default_directive(" warning "), "warn");
        assert_eq!(default_directive("verbose"), "info");
    }
}
