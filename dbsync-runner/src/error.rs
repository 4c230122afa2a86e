use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use dbsync::error::SyncError;
use dbsync_telemetry::tracing::TracingError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that stop the binary before a run result exists.
///
/// Failures inside a run are reported through the run result and its exit code instead.
#[derive(Debug)]
pub enum RunnerError {
    /// The coordinator was driven out of order.
    Sync(SyncError),
    /// Logging could not be set up.
    Telemetry(TracingError, CapturedBacktrace),
    /// The async runtime could not be started.
    Io(std::io::Error, CapturedBacktrace),
}

impl RunnerError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            RunnerError::Sync(_) => "sync error",
            RunnerError::Telemetry(_, _) => "logging error",
            RunnerError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            RunnerError::Sync(err) => err.backtrace(),
            RunnerError::Telemetry(_, cb) => Some(&cb.0),
            RunnerError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("dbsync failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerError::Sync(err) => write!(f, "{err}"),
            RunnerError::Telemetry(source, _) => write!(f, "logging error: {source}"),
            RunnerError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for RunnerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RunnerError::Sync(err) => err.source(),
            RunnerError::Telemetry(source, _) => Some(source),
            RunnerError::Io(source, _) => Some(source),
        }
    }
}

impl From<SyncError> for RunnerError {
    fn from(err: SyncError) -> Self {
        RunnerError::Sync(err)
    }
}

impl From<TracingError> for RunnerError {
    fn from(err: TracingError) -> Self {
        RunnerError::Telemetry(err, CapturedBacktrace::capture())
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::Io(err, CapturedBacktrace::capture())
    }
}
