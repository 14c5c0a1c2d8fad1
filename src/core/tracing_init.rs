use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::config::LoggingConfig;

/// HTTP client internals are noisy below `warn`
const QUIET_TARGETS: [&str; 3] = ["reqwest", "hyper_util", "rustls"];

/// Filter from `RUST_LOG`, or the configured level with client noise capped
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&config.level))
}

fn default_filter(level: &str) -> EnvFilter {
    let directives = QUIET_TARGETS
        .iter()
        .fold(level.to_string(), |acc, target| format!("{},{}=warn", acc, target));
    EnvFilter::new(directives)
}

/// Install the global subscriber, console output for a serial terminal or JSON lines
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(config));

    let installed = if config.console || config.format == "console" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_ansi(config.console)
                    .with_line_number(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    };

    installed.context("Failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_http_client() {
        let filter = default_filter("debug").to_string();
        assert!(filter.contains("debug"));
        assert!(filter.contains("reqwest=warn"));
        assert!(filter.contains("hyper_util=warn"));
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
