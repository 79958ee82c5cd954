//! Tracing setup for the aeroshape binary.
//!
//! Filtering comes from `AEROSHAPE_LOG`, then `RUST_LOG`, then a default
//! that shows aeroshape's own events at the requested level and only
//! warnings from dependencies. JSON lines carry the enclosing run or
//! evaluation span so each event can be traced back to its evaluation id.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding filter directives for aeroshape.
pub const LOG_ENV: &str = "AEROSHAPE_LOG";

const TARGETS: &[&str] = &["aeroshape", "aeroshape_core", "aeroshape_tools"];

/// Default directives: `warn` globally, `level` for the aeroshape crates.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(TARGETS.iter().map(|target| format!("{}={}", target, level)));
    directives.join(",")
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = env_filter(level);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_level_to_aeroshape() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,aeroshape=debug,aeroshape_core=debug,aeroshape_tools=debug"
        );
        assert!(EnvFilter::try_new(default_directives(Level::INFO)).is_ok());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
