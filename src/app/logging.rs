//! Logging configuration and initialization
//!
//! Logs go to stdout and, when configured, are appended to a persistent log
//! file without ANSI colors.

use crate::app::config::AppConfig;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, trace, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing/logging for the application
///
/// `RUST_LOG` takes precedence over the verbosity level. If the log file
/// cannot be opened, logging continues on stdout only.
pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    let stdout_layer = fmt::layer()
        .with_target(config.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(config.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(config.verbose >= 3); // Show line numbers for -vvv

    let mut file_error = None;
    let file_layer = match config.log_file.as_deref().map(open_log_file) {
        Some(Ok(file)) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        ),
        Some(Err(e)) => {
            file_error = Some(e);
            None
        }
        None => None,
    };

    // A subscriber may already be installed (tests, embedding callers)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    if let (Some(e), Some(path)) = (file_error, config.log_file.as_deref()) {
        warn!("Could not open log file {}: {}", path.display(), e);
    }

    debug!("verse-normalizer started with verbosity level: {}", config.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}

/// Open `path` for appending, creating its directory if needed
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}
