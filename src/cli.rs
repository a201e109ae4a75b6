// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `helmsman`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "helmsman",
    version,
    about = "Single-node supervisor for named project pipelines.",
    long_about = None
)]
pub struct CliArgs {
    /// Bind address for the HTTP API.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Path to persist state snapshots.
    ///
    /// The health history is written next to it, with `-history` inserted
    /// before the extension.
    #[arg(long, value_name = "PATH", default_value = "/var/lib/helmsman/state.json")]
    pub state: String,

    /// Allow the API to execute configured project pipelines.
    ///
    /// Off by default: a freshly deployed instance can only be inspected
    /// until the operator opts in.
    #[arg(long)]
    pub allow_actions: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HELMSMAN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
