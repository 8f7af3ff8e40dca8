//! Centralised tracing initialisation for polarsweep binaries.
//!
//! Call [`init_tracing`] once at program start. Logs go to an append-mode side
//! file next to the run (or to stderr when no file is configured or it cannot
//! be opened), filtered by `RUST_LOG` or the supplied level.
//!
//! Safe to call more than once; subsequent calls are silently ignored (the
//! global subscriber can only be set once per process).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Where log lines ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
}

/// Initialise the global tracing subscriber.
///
/// * `json`: when `true`, emit newline-delimited JSON log lines.
/// * `level`: default verbosity when `RUST_LOG` is not set.
/// * `file`: append log lines to this file instead of stderr.
///
/// A log file that cannot be opened falls back to stderr; write failures are
/// dropped by the subscriber and never reach the run.
pub fn init_tracing(json: bool, level: Level, file: Option<&Path>) -> LogTarget {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let (writer, target) = match file.map(|p| (p, open_log_file(p))) {
        Some((path, Ok(f))) => (Some(Arc::new(f)), LogTarget::File(path.to_path_buf())),
        Some((path, Err(e))) => {
            eprintln!("cannot open log file {}: {e}; logging to stderr", path.display());
            (None, LogTarget::Stderr)
        }
        None => (None, LogTarget::Stderr),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    match (writer, json) {
        (Some(w), true) => registry
            .with(fmt::layer().with_ansi(false).with_writer(w).json())
            .try_init()
            .ok(),
        (Some(w), false) => registry
            .with(fmt::layer().with_ansi(false).with_writer(w))
            .try_init()
            .ok(),
        (None, true) => registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok(),
        (None, false) => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .ok(),
    };

    target
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
