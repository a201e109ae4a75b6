// src/logging.rs

//! Logging setup for `helmsman` using `tracing` + `tracing-subscriber`.
//!
//! The subscriber is driven by an `EnvFilter`, so per-target directives like
//! `helmsman::supervisor=debug` work alongside plain levels. Priority:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `HELMSMAN_LOG` environment variable (level or directive string)
//! 3. default to `info`

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(level_directive(lvl)),
        None => EnvFilter::try_from_env("HELMSMAN_LOG")
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // `init()` does not return a Result, so this cannot fail at runtime
    // (if called more than once, it will panic; we only call once in main).
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

fn level_directive(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
