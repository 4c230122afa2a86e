//! `dbsync` binary.
//!
//! Reads a table from the configured database and uploads it to the configured API. The process
//! exit code reflects the run status: 0 on success, 1 on a fatal error, 2 on partial failure and
//! 130 when cancelled.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dbsync::run::RunResult;
use dbsync_telemetry::tracing::init_tracing;
use tracing::{error, info};

use crate::core::start_sync;
use crate::error::{RunnerError, RunnerResult};

mod core;
mod error;

/// Exit code used when the binary fails before a run result exists.
const EXIT_FAILURE: u8 = 1;

/// Synchronize a database table to a web API.
#[derive(Debug, Parser)]
#[command(name = "dbsync", version, about)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Directory receiving the run log and the run history file.
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_flusher = match init_tracing(env!("CARGO_BIN_NAME"), &args.log_dir) {
        Ok(log_flusher) => log_flusher,
        Err(err) => {
            eprint!("{}", RunnerError::from(err).render_report());
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match run(args) {
        Ok(result) => {
            info!(
                exit_code = result.exit_code(),
                log_file = %log_flusher.log_file().display(),
                "sync finished"
            );
            ExitCode::from(result.exit_code())
        }
        Err(err) => {
            error!("{err}");
            eprint!("{}", err.render_report());
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(args: Args) -> RunnerResult<RunResult> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_sync(args.config, args.log_dir))
}
