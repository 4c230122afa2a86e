//! Tracing initialization for the sync binary and tests.
//!
//! Every run logs to the console and to a plain-text file named `sync_<YYYYmmdd_HHMMSS>.log`
//! inside the configured log directory. File output goes through a non-blocking writer, so the
//! returned [`LogFlusher`] must be kept alive until the process exits.

use std::path::{Path, PathBuf};
use std::sync::Once;
use std::{fs, io};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix of the per-run log file.
const LOG_FILE_PREFIX: &str = "sync";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// The log directory could not be created.
    #[error("failed to create log directory `{path}`: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Keeps the background log writer alive and remembers where the log file lives.
///
/// Dropping it flushes buffered log lines to disk.
#[must_use = "dropping the flusher stops file logging"]
#[derive(Debug)]
pub struct LogFlusher {
    _guard: WorkerGuard,
    log_file: PathBuf,
}

impl LogFlusher {
    /// Returns the path of the log file written for this run.
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }
}

/// Returns the log file name for a run started at `started_at`.
pub fn log_file_name(started_at: DateTime<Local>) -> String {
    format!(
        "{LOG_FILE_PREFIX}_{}.log",
        started_at.format("%Y%m%d_%H%M%S")
    )
}

/// Installs the global subscriber with a console layer and a file layer under `log_dir`.
///
/// The filter is read from `RUST_LOG` and falls back to `info`.
pub fn init_tracing(app_name: &str, log_dir: &Path) -> Result<LogFlusher, TracingError> {
    fs::create_dir_all(log_dir).map_err(|source| TracingError::LogDirectory {
        path: log_dir.to_path_buf(),
        source,
    })?;

    let file_name = log_file_name(Local::now());
    let log_file = log_dir.join(&file_name);

    let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(env_filter()))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(env_filter()),
        )
        .try_init()?;

    ::tracing::info!(
        app = app_name,
        log_file = %log_file.display(),
        "tracing initialized"
    );

    Ok(LogFlusher {
        _guard: guard,
        log_file,
    })
}

/// Installs a console-only subscriber for tests.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer().with_filter(env_filter()))
            .try_init();
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
