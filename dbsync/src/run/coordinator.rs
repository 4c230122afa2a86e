use std::path::{Path, PathBuf};
use std::time::Duration;

use dbsync_config::load_config_file;
use dbsync_config::shared::SyncConfig;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx};
use crate::error::{SyncError, SyncResult};
use crate::run::report::append_run_record;
use crate::run::result::RunAccumulator;
use crate::run::{RunPhase, RunResult, Stage};
use crate::source::{Source, SourceConnection, TableQuery};
use crate::transform::transform;
use crate::types::UploadRecord;
use crate::upload::{BatchUploader, RetryPolicy};

/// Drives one sync run from configuration loading to the final [`RunResult`].
///
/// The coordinator is the only owner of the run's mutable state. Stages hand their output to the
/// coordinator, which counts and classifies failures:
///
/// - configuration and connection errors are fatal and end the run immediately;
/// - rows that do not match the expected schema are skipped and counted;
/// - a query failure after some rows were read keeps the rows read so far;
/// - failed or rejected batches are counted while the remaining batches carry on.
///
/// The current [`RunPhase`] can be observed through [`SyncCoordinator::subscribe_phase`].
#[derive(Debug)]
pub struct SyncCoordinator<S> {
    source: S,
    config_path: PathBuf,
    log_dir: PathBuf,
    shutdown_tx: ShutdownTx,
    phase_tx: watch::Sender<RunPhase>,
    retry_policy: Option<RetryPolicy>,
}

impl<S> SyncCoordinator<S>
where
    S: Source,
{
    /// Creates a coordinator reading its configuration from `config_path` and writing the run
    /// artifact into `log_dir`.
    ///
    /// Firing `shutdown_tx` cancels the run; the coordinator also fires it when the configured
    /// deadline passes.
    pub fn new(
        source: S,
        config_path: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        shutdown_tx: ShutdownTx,
    ) -> Self {
        let (phase_tx, _) = watch::channel(RunPhase::Idle);

        Self {
            source,
            config_path: config_path.into(),
            log_dir: log_dir.into(),
            shutdown_tx,
            phase_tx,
            retry_policy: None,
        }
    }

    /// Overrides the retry policy derived from the configuration.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    /// Returns the current phase.
    pub fn phase(&self) -> RunPhase {
        *self.phase_tx.borrow()
    }

    /// Returns a receiver notified on every phase change.
    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase_tx.subscribe()
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Runs the sync to completion.
    ///
    /// Run failures are reported through the returned [`RunResult`]. An error is only returned
    /// when the coordinator is used out of order, for example when `run` is called twice.
    pub async fn run(&mut self) -> SyncResult<RunResult> {
        self.advance(RunPhase::Loading)?;
        let mut run = RunAccumulator::start();
        info!(config = %self.config_path.display(), "sync run started");

        let config = match load_config_file::<SyncConfig>(&self.config_path) {
            Ok(config) => config,
            Err(err) => {
                let err = SyncError::from(err);
                error!(error = %err, "failed to load configuration");
                run.record_fatal(Stage::Loading, &err);

                return self.finalize(run).await;
            }
        };
        info!(
            table = %config.settings.table_name,
            upload_url = %config.api.upload_url(),
            batch_size = config.settings.batch_size,
            "configuration loaded"
        );

        let deadline = config
            .settings
            .deadline_secs
            .map(|secs| self.arm_deadline(Duration::from_secs(secs)));

        let executed = self.execute(&config, &mut run).await;

        if let Some(deadline) = deadline {
            deadline.abort();
        }
        executed?;

        self.finalize(run).await
    }

    async fn execute(&mut self, config: &SyncConfig, run: &mut RunAccumulator) -> SyncResult<()> {
        self.advance(RunPhase::Reading)?;
        let shutdown_rx = self.shutdown_tx.subscribe();

        if shutdown_rx.is_shutdown() {
            warn!("shutdown requested before reading, skipping run");
            run.record_cancelled();
            return Ok(());
        }

        let Some(records) = self.read(config, run, shutdown_rx.clone()).await else {
            return Ok(());
        };

        self.advance(RunPhase::Uploading)?;

        if records.is_empty() {
            info!("no records to upload");
            return Ok(());
        }

        let mut uploader = match BatchUploader::new(&config.api, &config.settings) {
            Ok(uploader) => uploader,
            Err(err) => {
                error!(error = %err, "failed to create api client");
                run.record_fatal(Stage::Uploading, &err);
                return Ok(());
            }
        };
        if let Some(retry_policy) = self.retry_policy {
            uploader = uploader.with_retry_policy(retry_policy);
        }

        let report = uploader.upload(records, shutdown_rx.clone()).await;

        let cut_short = report.skipped_batches > 0
            || (shutdown_rx.is_shutdown() && report.results.iter().any(|r| r.is_failed()));
        if cut_short {
            run.record_cancelled();
        }
        run.record_skipped_batches(report.skipped_batches);
        for result in report.results {
            run.record_batch(result);
        }

        Ok(())
    }

    /// Reads and transforms every row.
    ///
    /// Returns `None` when the run must end fatally. The connection is closed on every path.
    async fn read(
        &self,
        config: &SyncConfig,
        run: &mut RunAccumulator,
        shutdown_rx: ShutdownRx,
    ) -> Option<Vec<UploadRecord>> {
        let mut connection = match self.source.connect(&config.database).await {
            Ok(connection) => connection,
            Err(err) => {
                error!(source = S::name(), error = %err, "failed to connect to source database");
                run.record_fatal(Stage::Connecting, &err);
                return None;
            }
        };

        let query = TableQuery::from_settings(&config.settings);
        let records = read_records(&mut connection, &query, run, shutdown_rx).await;

        if let Err(err) = connection.close().await {
            warn!(error = %err, "failed to close source database connection");
            run.record_error(Stage::Reading, &err);
        }

        records
    }

    /// Starts a task that fires the shutdown signal once `deadline` has passed.
    fn arm_deadline(&self, deadline: Duration) -> JoinHandle<()> {
        let shutdown_tx = self.shutdown_tx.clone();
        info!(deadline_secs = deadline.as_secs(), "run deadline armed");

        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!("run deadline reached, cancelling");
            shutdown_tx.shutdown();
        })
    }

    async fn finalize(&mut self, run: RunAccumulator) -> SyncResult<RunResult> {
        self.advance(RunPhase::Finalizing)?;
        let result = run.finish();

        match append_run_record(&self.log_dir, &result).await {
            Ok(path) => debug!(path = %path.display(), "run result recorded"),
            Err(err) => error!(error = %err, "failed to record run result"),
        }

        self.advance(RunPhase::Terminal(result.status))?;

        info!(
            status = %result.status,
            rows_read = result.rows_read,
            rows_skipped = result.rows_skipped,
            rows_uploaded = result.rows_uploaded,
            rows_not_uploaded = result.rows_not_uploaded(),
            batches_uploaded = result.batches_uploaded,
            batches_failed = result.batches_failed,
            batches_rejected = result.batches_rejected,
            batches_skipped = result.batches_skipped,
            duration_ms = result.duration_ms,
            "sync run finished"
        );

        Ok(result)
    }

    fn advance(&mut self, next: RunPhase) -> SyncResult<()> {
        let next = self.phase().transition(next)?;
        self.phase_tx.send_replace(next);
        debug!(phase = ?next, "run phase changed");

        Ok(())
    }
}

/// Streams rows from `connection`, transforming each one.
///
/// Rows failing the transform are skipped and counted. A query error before the first row is
/// fatal (`None`); after that, the rows read so far are kept.
async fn read_records<C>(
    connection: &mut C,
    query: &TableQuery,
    run: &mut RunAccumulator,
    mut shutdown_rx: ShutdownRx,
) -> Option<Vec<UploadRecord>>
where
    C: SourceConnection,
{
    let mut records = Vec::new();
    let mut rows = connection.read_all(query);

    loop {
        let next = tokio::select! {
            biased;

            _ = shutdown_rx.wait() => {
                warn!(rows_read = run.rows_read(), "shutdown requested, stopping read");
                run.record_cancelled();
                break;
            }
            next = rows.next() => next,
        };

        let Some(next) = next else {
            break;
        };

        match next {
            Ok(row) => {
                run.record_row_read();
                match transform(&row) {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        warn!(
                            row_position = run.rows_read(),
                            error = %err,
                            "skipping row that does not match the expected schema"
                        );
                        run.record_row_skipped(&err);
                    }
                }
            }
            Err(err) if run.rows_read() == 0 => {
                error!(table = query.table(), error = %err, "failed to read source table");
                run.record_fatal(Stage::Reading, &err);
                return None;
            }
            Err(err) => {
                warn!(
                    rows_read = run.rows_read(),
                    error = %err,
                    "source query failed mid-read, remaining rows are lost"
                );
                run.record_read_interrupted(&err);
                break;
            }
        }
    }

    info!(
        rows_read = run.rows_read(),
        records = records.len(),
        "finished reading source table"
    );

    Some(records)
}
