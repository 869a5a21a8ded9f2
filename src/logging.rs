//! Logging initialisation.
//!
//! A run logs to stdout and, when a run log path is given, to a plain-text
//! file next to the output. The run log is the audit trail of a run: the
//! `[hash-matched]`, `[hash-mismatch]` and `done-cc-file:` lines in it are
//! parsed back by [`crate::report`], so the file layer never uses ANSI colours.
//!
//! `RUST_LOG` overrides the default filter.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::RunMode;
use crate::error::{Error, Result};

/// Default filter: our own events at info, chatty dependencies quieted
pub const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,html5ever=error,selectors=warn";

/// Keeps the file writer flushing; drop it only when the process is done logging
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Get the run log ready for a run in `mode`.
///
/// Resume keeps the previous log and appends to it. Fresh and restart runs
/// start from an empty log.
pub fn prepare_log_file(path: &Path, mode: RunMode) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match mode {
        RunMode::Resume => Ok(()),
        RunMode::Fresh | RunMode::Restart => match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        },
    }
}

/// Install the global subscriber: stdout, plus the run log when `log_path` is set.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(log_path: Option<&Path>) -> Result<LogGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let (file_layer, guard) = match log_path {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to initialise logging: {e}")))?;

    Ok(LogGuard { _file: guard })
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::config(format!("invalid log path {}", path.display()), "storage_dir"))?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir, name))
}
