//! Structured logging setup.
//!
//! Log levels:
//! - ERROR: Failures surfaced to the CLI user
//! - WARN: Recoverable surprises (task overwrites, retries exhausted)
//! - INFO: Graph lifecycle and registry moves
//! - DEBUG: Every mutation and state transition
//! - TRACE: Unused for now
//!
//! `RUST_LOG` takes precedence. Otherwise the configured level applies,
//! and debug mode (`--debug` or `TASKGRAPH_DEBUG=1`) raises it to debug.

use std::fs::File;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{Config, LoggingConfig};
use crate::Result;

pub const DEBUG_ENV: &str = "TASKGRAPH_DEBUG";

/// Whether debug mode is requested through the environment.
pub fn env_debug() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the filter for the given settings.
pub fn build_filter(logging: &LoggingConfig, debug: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    if debug {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Calling this more than once is harmless.
pub fn init(logging: &LoggingConfig, debug: bool) -> Result<()> {
    let filter = build_filter(logging, debug || env_debug());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if logging.file {
        let path = Config::log_path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        // Truncate on startup.
        let file = File::create(&path)?;
        let _ = builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init();
    } else {
        let _ = builder.with_writer(std::io::stderr).try_init();
    }
    Ok(())
}
