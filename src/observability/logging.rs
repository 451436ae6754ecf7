//! Structured logging initialization.
//!
//! `RUST_LOG` wins when set; otherwise the configured `logging.level`
//! becomes the global filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive(level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn directive(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_level_names() {
        assert_eq!(directive("debug"), "debug");
        assert_eq!(directive("warning"), "warn");
        assert_eq!(directive("WARN"), "warn");
        assert_eq!(directive("error"), "error");
        assert_eq!(directive(""), "info");
        assert_eq!(directive("nonsense"), "info");
    }
}
