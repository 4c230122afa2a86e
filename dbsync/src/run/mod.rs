//! Orchestration of a complete sync run.

mod coordinator;
mod report;
mod result;

pub use coordinator::SyncCoordinator;
pub use report::{RUNS_FILE_NAME, append_run_record};
pub use result::{BatchSummary, RunPhase, RunResult, RunStatus, Stage, StageError};
