// src/logging.rs

//! Logging setup for `watchguard` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. explicit `level` argument from the embedding application (if provided)
//! 2. `WATCHGUARD_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for guard output and
//! the optional console-clear escape sequence.

use anyhow::Result;
use tracing_subscriber::fmt;

/// Initialise global logging subscriber.
///
/// Uses `try_init` so an embedder (or test harness) that already installed
/// a subscriber wins; the second call is a no-op.
pub fn init_logging(level: Option<&str>) -> Result<()> {
    let level = level
        .and_then(parse_level_str)
        .or_else(|| {
            std::env::var("WATCHGUARD_LOG")
                .ok()
                .and_then(|s| parse_level_str(&s))
        })
        .unwrap_or(tracing::Level::INFO);

    // Send logs to stderr; keep stdout free for guard output.
    let _ = fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
