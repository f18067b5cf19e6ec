// src/logging.rs

//! Logging setup for `ij` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--verbose` (debug) or `--log-level` CLI flags (if provided)
//! 2. `IJ_LOG` environment variable (an `EnvFilter` directive, e.g. "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR. Every message emitted on behalf of a task carries
//! a `prefix` field naming its position in the plan tree.

use std::fmt;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt};

use crate::cli::LogLevel;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, verbose: bool, color: bool) -> Result<()> {
    let filter = match (verbose, cli_level) {
        (true, _) => EnvFilter::new("debug"),
        (false, Some(lvl)) => EnvFilter::new(level_from_log_level(lvl).as_str()),
        (false, None) => EnvFilter::try_from_env("IJ_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
    };

    subscriber_fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(color)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

/// Hierarchical log prefix, e.g. `default/build/compile.0`.
///
/// An empty prefix denotes unscoped (root) messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefix {
    segments: Vec<String>,
}

impl Prefix {
    pub fn root() -> Self {
        Self::default()
    }

    /// Return a new prefix with `segment` appended.
    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Flattened form used for per-task log file names.
    pub fn file_stem(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("ij");
        }
        f.write_str(&self.segments.join("/"))
    }
}
