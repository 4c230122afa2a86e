use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::types::{BatchOutcome, BatchResult};

/// Maximum number of stage errors kept in a [`RunResult`]; further ones are only counted.
const MAX_RECORDED_ERRORS: usize = 100;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every row was read, transformed and uploaded.
    Success,
    /// The run completed but some rows or batches did not make it.
    PartialFailure,
    /// The run stopped early on a configuration or connection error.
    FatalError,
    /// The run was stopped by a shutdown signal or its deadline.
    Cancelled,
}

impl RunStatus {
    /// Returns the process exit code for this status.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::FatalError => 1,
            RunStatus::PartialFailure => 2,
            RunStatus::Cancelled => 130,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::FatalError => "fatal_error",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Phases of the run state machine.
///
/// ```text
/// Idle -> Loading -> Reading -> Uploading -> Finalizing -> Terminal
///            |          |                       ^
///            +----------+-----------------------+
/// ```
///
/// Fatal errors during `Loading` or `Reading` skip straight to `Finalizing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Loading,
    Reading,
    Uploading,
    Finalizing,
    Terminal(RunStatus),
}

impl RunPhase {
    /// Returns `next` if moving from `self` to `next` is allowed.
    pub fn transition(self, next: RunPhase) -> SyncResult<RunPhase> {
        let allowed = matches!(
            (self, next),
            (RunPhase::Idle, RunPhase::Loading)
                | (RunPhase::Loading, RunPhase::Reading | RunPhase::Finalizing)
                | (RunPhase::Reading, RunPhase::Uploading | RunPhase::Finalizing)
                | (RunPhase::Uploading, RunPhase::Finalizing)
                | (RunPhase::Finalizing, RunPhase::Terminal(_))
        );

        if !allowed {
            bail!(
                ErrorKind::InvalidState,
                "Invalid run phase transition",
                format!("cannot move from {self:?} to {next:?}")
            );
        }

        Ok(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Terminal(_))
    }
}

/// Stage of the run an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loading,
    Connecting,
    Reading,
    Transforming,
    Uploading,
}

/// An error recorded against a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageError {
    pub stage: Stage,
    /// Name of the [`ErrorKind`].
    pub kind: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageError {
    pub fn new(stage: Stage, error: &SyncError) -> Self {
        Self {
            stage,
            kind: format!("{:?}", error.kind()),
            description: error.description().to_string(),
            detail: error.detail().map(str::to_string),
        }
    }
}

/// Per-batch line of a [`RunResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub index: usize,
    pub record_count: usize,
    pub attempts: u32,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl From<&BatchResult> for BatchSummary {
    fn from(result: &BatchResult) -> Self {
        let status = match &result.outcome {
            BatchOutcome::Rejected { status, .. } => Some(*status),
            _ => None,
        };

        Self {
            index: result.index,
            record_count: result.record_count,
            attempts: result.attempts,
            outcome: result.outcome.label(),
            status,
        }
    }
}

/// Aggregate outcome of one run.
///
/// Built by the coordinator while the run progresses and handed out once finalized. This is
/// also the record appended to the run log artifact.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub rows_read: u64,
    /// Rows skipped because they did not match the expected schema.
    pub rows_skipped: u64,
    pub rows_uploaded: u64,
    /// Whether the source query failed after some rows were read.
    pub read_interrupted: bool,
    pub batches_uploaded: usize,
    pub batches_failed: usize,
    pub batches_rejected: usize,
    /// Batches never dispatched because the run was cancelled.
    pub batches_skipped: usize,
    pub batches: Vec<BatchSummary>,
    pub errors: Vec<StageError>,
    /// Errors beyond the recorded ones that were only counted.
    pub errors_omitted: usize,
}

impl RunResult {
    pub fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }

    /// Rows read and transformed that were not uploaded.
    pub fn rows_not_uploaded(&self) -> u64 {
        self.rows_read
            .saturating_sub(self.rows_skipped)
            .saturating_sub(self.rows_uploaded)
    }
}

/// Mutable state of a run in progress.
#[derive(Debug)]
pub(crate) struct RunAccumulator {
    started_at: DateTime<Utc>,
    rows_read: u64,
    rows_skipped: u64,
    rows_uploaded: u64,
    read_interrupted: bool,
    fatal: bool,
    cancelled: bool,
    batches_skipped: usize,
    batches: Vec<BatchResult>,
    errors: Vec<StageError>,
    errors_omitted: usize,
}

impl RunAccumulator {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            rows_read: 0,
            rows_skipped: 0,
            rows_uploaded: 0,
            read_interrupted: false,
            fatal: false,
            cancelled: false,
            batches_skipped: 0,
            batches: Vec::new(),
            errors: Vec::new(),
            errors_omitted: 0,
        }
    }

    pub(crate) fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub(crate) fn record_error(&mut self, stage: Stage, error: &SyncError) {
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(StageError::new(stage, error));
        } else {
            self.errors_omitted += 1;
        }
    }

    pub(crate) fn record_fatal(&mut self, stage: Stage, error: &SyncError) {
        self.fatal = true;
        self.record_error(stage, error);
    }

    pub(crate) fn record_row_read(&mut self) {
        self.rows_read += 1;
    }

    pub(crate) fn record_row_skipped(&mut self, error: &SyncError) {
        self.rows_skipped += 1;
        self.record_error(Stage::Transforming, error);
    }

    pub(crate) fn record_read_interrupted(&mut self, error: &SyncError) {
        self.read_interrupted = true;
        self.record_error(Stage::Reading, error);
    }

    pub(crate) fn record_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn record_skipped_batches(&mut self, batches: usize) {
        self.batches_skipped += batches;
    }

    pub(crate) fn record_batch(&mut self, result: BatchResult) {
        match &result.outcome {
            BatchOutcome::Uploaded => {
                self.rows_uploaded += result.record_count as u64;
            }
            BatchOutcome::Rejected { status, body } => {
                let error = crate::sync_error!(
                    ErrorKind::BatchRejected,
                    "API rejected the batch",
                    format!("batch {}: status {status}, body: {body}", result.index)
                );
                self.record_error(Stage::Uploading, &error);
            }
            BatchOutcome::Failed { error } => {
                self.record_error(Stage::Uploading, error);
            }
        }
        self.batches.push(result);
    }

    /// Returns the status the run would end with if it finished now.
    pub(crate) fn status(&self) -> RunStatus {
        if self.fatal {
            RunStatus::FatalError
        } else if self.cancelled {
            RunStatus::Cancelled
        } else if self.rows_skipped > 0
            || self.read_interrupted
            || self.batches.iter().any(|batch| !batch.is_uploaded())
        {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        }
    }

    pub(crate) fn finish(mut self) -> RunResult {
        let finished_at = Utc::now();
        self.batches.sort_by_key(|batch| batch.index);

        RunResult {
            status: self.status(),
            started_at: self.started_at,
            finished_at,
            duration_ms: (finished_at - self.started_at).num_milliseconds(),
            rows_read: self.rows_read,
            rows_skipped: self.rows_skipped,
            rows_uploaded: self.rows_uploaded,
            read_interrupted: self.read_interrupted,
            batches_uploaded: self.batches.iter().filter(|b| b.is_uploaded()).count(),
            batches_failed: self.batches.iter().filter(|b| b.is_failed()).count(),
            batches_rejected: self.batches.iter().filter(|b| b.is_rejected()).count(),
            batches_skipped: self.batches_skipped,
            batches: self.batches.iter().map(BatchSummary::from).collect(),
            errors: self.errors,
            errors_omitted: self.errors_omitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_error;

    fn batch(index: usize, outcome: BatchOutcome) -> BatchResult {
        BatchResult {
            index,
            record_count: 10,
            attempts: 1,
            outcome,
        }
    }

    #[test]
    fn exit_codes_are_zero_only_for_success() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::FatalError.exit_code(), 1);
        assert_eq!(RunStatus::PartialFailure.exit_code(), 2);
        assert_eq!(RunStatus::Cancelled.exit_code(), 130);
    }

    #[test]
    fn happy_path_transitions_are_allowed() {
        let phase = RunPhase::Idle
            .transition(RunPhase::Loading)
            .and_then(|p| p.transition(RunPhase::Reading))
            .and_then(|p| p.transition(RunPhase::Uploading))
            .and_then(|p| p.transition(RunPhase::Finalizing))
            .and_then(|p| p.transition(RunPhase::Terminal(RunStatus::Success)))
            .unwrap();

        assert!(phase.is_terminal());
    }

    #[test]
    fn fatal_paths_skip_to_finalizing() {
        assert!(RunPhase::Loading.transition(RunPhase::Finalizing).is_ok());
        assert!(RunPhase::Reading.transition(RunPhase::Finalizing).is_ok());
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        for (from, to) in [
            (RunPhase::Idle, RunPhase::Reading),
            (RunPhase::Uploading, RunPhase::Reading),
            (RunPhase::Terminal(RunStatus::Success), RunPhase::Loading),
            (RunPhase::Idle, RunPhase::Terminal(RunStatus::Success)),
        ] {
            let err = from.transition(to).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidState);
        }
    }

    #[test]
    fn failed_or_rejected_batches_demote_to_partial_failure() {
        let mut run = RunAccumulator::start();
        run.record_batch(batch(0, BatchOutcome::Uploaded));
        assert_eq!(run.status(), RunStatus::Success);

        run.record_batch(batch(
            1,
            BatchOutcome::Rejected {
                status: 422,
                body: "bad".to_string(),
            },
        ));
        assert_eq!(run.status(), RunStatus::PartialFailure);

        let result = run.finish();
        assert_eq!(result.rows_uploaded, 10);
        assert_eq!(result.batches_uploaded, 1);
        assert_eq!(result.batches_rejected, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, "BatchRejected");
        assert_eq!(result.batches[1].status, Some(422));
    }

    #[test]
    fn fatal_wins_over_cancelled() {
        let mut run = RunAccumulator::start();
        run.record_cancelled();
        assert_eq!(run.status(), RunStatus::Cancelled);

        run.record_fatal(
            Stage::Connecting,
            &sync_error!(ErrorKind::SourceConnectionFailed, "down"),
        );
        assert_eq!(run.status(), RunStatus::FatalError);
    }

    #[test]
    fn recorded_errors_are_capped() {
        let mut run = RunAccumulator::start();
        let error = sync_error!(ErrorKind::SchemaMismatch, "bad row");
        for _ in 0..MAX_RECORDED_ERRORS + 5 {
            run.record_row_read();
            run.record_row_skipped(&error);
        }

        let result = run.finish();
        assert_eq!(result.errors.len(), MAX_RECORDED_ERRORS);
        assert_eq!(result.errors_omitted, 5);
        assert_eq!(result.rows_skipped, (MAX_RECORDED_ERRORS + 5) as u64);
        assert_eq!(result.status, RunStatus::PartialFailure);
    }

    #[test]
    fn rows_not_uploaded_excludes_skipped_rows() {
        let mut run = RunAccumulator::start();
        let error = sync_error!(ErrorKind::SchemaMismatch, "bad row");
        for _ in 0..25 {
            run.record_row_read();
        }
        run.record_row_skipped(&error);
        run.record_batch(batch(0, BatchOutcome::Uploaded));
        run.record_batch(batch(
            1,
            BatchOutcome::Failed {
                error: sync_error!(ErrorKind::BatchFailed, "server error"),
            },
        ));

        let result = run.finish();
        assert_eq!(result.rows_uploaded, 10);
        assert_eq!(result.rows_not_uploaded(), 14);
    }

    #[test]
    fn serializes_status_in_snake_case() {
        let result = RunAccumulator::start().finish();
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["status"], "success");
        assert_eq!(value["rows_read"], 0);
    }
}
