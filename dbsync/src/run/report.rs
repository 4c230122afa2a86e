use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{ErrorKind, SyncResult};
use crate::run::RunResult;
use crate::sync_error;

/// Name of the run log artifact inside the log directory.
pub const RUNS_FILE_NAME: &str = "sync_runs.jsonl";

/// Appends `result` as one JSON line to `<log_dir>/sync_runs.jsonl`.
///
/// Creates the directory and the file when needed and returns the file path.
pub async fn append_run_record(log_dir: &Path, result: &RunResult) -> SyncResult<PathBuf> {
    fs::create_dir_all(log_dir).await?;

    let path = log_dir.join(RUNS_FILE_NAME);
    let mut line = serde_json::to_vec(result).map_err(|err| {
        sync_error!(
            ErrorKind::SerializationError,
            "Run result could not be serialized",
            err
        )
    })?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await?;

    Ok(path)
}
