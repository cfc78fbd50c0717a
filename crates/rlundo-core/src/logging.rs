//! Logging and tracing support.
//!
//! Modules log through the re-exported `tracing` macros. Events only go
//! somewhere once [`init`] installed a subscriber, and that only happens
//! when `RLUNDO_LOG_FILE` is set: the terminal is the thing being rewound, so
//! nothing may ever be logged to it.
//!
//! Every process in a checkpoint chain appends to the same file. The
//! subscriber writes synchronously and starts no threads, so it survives
//! `fork`.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

pub use tracing::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::config::UndoConfig;

/// Filter used when `RLUNDO_LOG` is unset.
pub const DEFAULT_FILTER: &str = "debug";

/// Build a subscriber that appends to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or `filter` does not parse.
pub fn file_subscriber(
    path: &Path,
    filter: Option<&str>,
) -> io::Result<impl Subscriber + Send + Sync + 'static> {
    let file: File = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_new(filter.unwrap_or(DEFAULT_FILTER)).map_err(io::Error::other)?;
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .finish())
}

/// Install the global subscriber described by `config`.
///
/// Returns `false` (and installs nothing) when no log file is configured.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened, the filter is invalid,
/// or a global subscriber was already installed.
pub fn init(config: &UndoConfig) -> io::Result<bool> {
    let Some(path) = config.log_file.as_deref() else {
        return Ok(false);
    };
    let subscriber = file_subscriber(path, config.log_filter.as_deref())?;
    tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;
    tracing::info!(pid = std::process::id(), "logging to {}", path.display());
    Ok(true)
}
