use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dbsync_config::shared::{ApiConfig, SyncSettings};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;
use crate::types::{Batch, BatchOutcome, BatchResult, UploadRecord};
use crate::upload::{RetryPolicy, StatusClass, classify_status, into_batches};

/// Value of the `User-Agent` header sent with every request.
pub const USER_AGENT: &str = concat!("dbsync/", env!("CARGO_PKG_VERSION"));

/// Maximum number of response body bytes kept for a rejected batch.
const MAX_REJECTED_BODY_LEN: usize = 1024;

/// Everything the uploader did with one set of records.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Results of every dispatched batch, in batch-index order.
    pub results: Vec<BatchResult>,
    /// Batches never dispatched because the shutdown signal fired first.
    pub skipped_batches: usize,
    /// Records contained in the skipped batches.
    pub skipped_records: usize,
}

/// Uploads records to the API in bounded batches.
///
/// Each batch is sent as one `POST` with a JSON array body. A 2xx answer uploads the batch, a 4xx
/// answer rejects it without retrying, and 5xx answers, timeouts and transport errors are retried
/// with [`RetryPolicy`] backoff until the attempts run out. A failing batch never stops the
/// others.
#[derive(Debug, Clone)]
pub struct BatchUploader {
    client: reqwest::Client,
    upload_url: Arc<str>,
    retry_policy: RetryPolicy,
    batch_size: usize,
    max_concurrent_batches: usize,
}

impl BatchUploader {
    /// Creates an uploader for the configured API and batch settings.
    pub fn new(api: &ApiConfig, settings: &SyncSettings) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(api.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| {
                sync_error!(
                    ErrorKind::DestinationRequestFailed,
                    "HTTP client could not be created",
                    err
                )
            })?;

        Ok(Self {
            client,
            upload_url: Arc::from(api.upload_url()),
            retry_policy: RetryPolicy::from(&api.retry),
            batch_size: settings.batch_size,
            max_concurrent_batches: settings.max_concurrent_batches.max(1),
        })
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    /// Splits `records` into batches and uploads them.
    ///
    /// At most `max_concurrent_batches` requests are in flight. Once `shutdown_rx` fires, no new
    /// batch is dispatched, in-flight batches finish their current attempt, and the remaining
    /// batches are reported as skipped.
    pub async fn upload(&self, records: Vec<UploadRecord>, shutdown_rx: ShutdownRx) -> UploadReport {
        let batches = into_batches(records, self.batch_size);
        let batch_count = batches.len();
        info!(
            batch_count,
            batch_size = self.batch_size,
            max_concurrent_batches = self.max_concurrent_batches,
            url = %self.upload_url,
            "uploading records"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_batches));
        let mut join_set = JoinSet::new();
        let mut in_flight = HashMap::new();
        let mut report = UploadReport::default();

        let mut pending: VecDeque<Batch> = batches.into();
        while let Some(batch) = pending.pop_front() {
            let mut wait_rx = shutdown_rx.clone();
            let permit = tokio::select! {
                biased;

                _ = wait_rx.wait() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                report.skipped_batches = 1 + pending.len();
                report.skipped_records = batch.len() + pending.iter().map(Batch::len).sum::<usize>();
                warn!(
                    skipped_batches = report.skipped_batches,
                    skipped_records = report.skipped_records,
                    "shutdown requested, not dispatching remaining batches"
                );
                break;
            };

            in_flight.insert(batch.index, batch.len());
            let uploader = self.clone();
            let task_shutdown_rx = shutdown_rx.clone();
            join_set.spawn(async move {
                let result = uploader.upload_batch(batch, task_shutdown_rx).await;
                drop(permit);
                result
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    in_flight.remove(&result.index);
                    report.results.push(result);
                }
                Err(err) => error!(error = %err, "batch upload task failed"),
            }
        }

        // Batches whose task panicked never reported back.
        for (index, record_count) in in_flight {
            report.results.push(BatchResult {
                index,
                record_count,
                attempts: 0,
                outcome: BatchOutcome::Failed {
                    error: sync_error!(ErrorKind::BatchFailed, "Batch upload task failed"),
                },
            });
        }

        report.results.sort_by_key(|result| result.index);
        report
    }

    /// Uploads one batch, retrying transient failures.
    async fn upload_batch(&self, batch: Batch, mut shutdown_rx: ShutdownRx) -> BatchResult {
        let index = batch.index;
        let record_count = batch.len();
        let max_attempts = self.retry_policy.max_attempts();

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            debug!(batch_index = index, attempt, record_count, "sending batch");

            let error = match self.send(&batch).await {
                Ok(Sent::Accepted(status)) => {
                    info!(
                        batch_index = index,
                        attempt,
                        record_count,
                        status = status.as_u16(),
                        "batch uploaded"
                    );
                    break BatchOutcome::Uploaded;
                }
                Ok(Sent::Rejected { status, body }) => {
                    error!(
                        batch_index = index,
                        status,
                        body = %body,
                        "batch rejected by api, not retrying"
                    );
                    break BatchOutcome::Rejected { status, body };
                }
                Err(error) => error,
            };

            if !error.kind().is_retryable() || attempt >= max_attempts {
                error!(
                    batch_index = index,
                    attempt,
                    max_attempts,
                    error = %error,
                    "batch upload failed"
                );
                break BatchOutcome::Failed {
                    error: exhausted(index, attempt, error),
                };
            }

            let delay = self.retry_policy.delay_before_retry(attempt);
            warn!(
                batch_index = index,
                attempt,
                max_attempts,
                backoff_ms = delay.as_millis() as u64,
                error_kind = ?error.kind(),
                "transient upload failure, backing off before retry"
            );

            tokio::select! {
                biased;

                _ = shutdown_rx.wait() => {
                    warn!(batch_index = index, attempt, "shutdown requested, abandoning retries");
                    break BatchOutcome::Failed {
                        error: exhausted(index, attempt, error),
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        };

        BatchResult {
            index,
            record_count,
            attempts: attempt,
            outcome,
        }
    }

    /// Performs a single HTTP attempt.
    ///
    /// Returns an error for 5xx answers, unexpected statuses and transport failures.
    async fn send(&self, batch: &Batch) -> SyncResult<Sent> {
        let response = self
            .client
            .post(self.upload_url.as_ref())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(&batch.records)
            .send()
            .await?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => Ok(Sent::Accepted(status)),
            StatusClass::Rejected => {
                let body = response.text().await.unwrap_or_default();
                Ok(Sent::Rejected {
                    status: status.as_u16(),
                    body: truncate_body(body),
                })
            }
            StatusClass::Retryable => Err(sync_error!(
                ErrorKind::DestinationServerError,
                "API returned a server error",
                format!("status {status}")
            )),
            StatusClass::Unexpected => Err(sync_error!(
                ErrorKind::BatchFailed,
                "API returned an unexpected status",
                format!("status {status}")
            )),
        }
    }
}

/// Result of one HTTP attempt that reached the API.
enum Sent {
    Accepted(reqwest::StatusCode),
    Rejected { status: u16, body: String },
}

/// Wraps the last attempt error into the terminal batch failure.
fn exhausted(index: usize, attempts: u32, last_error: SyncError) -> SyncError {
    let detail = format!(
        "batch {index} failed after {attempts} attempt{}: {}{}",
        if attempts == 1 { "" } else { "s" },
        last_error.description(),
        last_error
            .detail()
            .map(|detail| format!(" ({detail})"))
            .unwrap_or_default()
    );

    sync_error!(
        ErrorKind::BatchFailed,
        "Batch upload failed",
        detail = detail,
        source: last_error
    )
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_REJECTED_BODY_LEN {
        let mut end = MAX_REJECTED_BODY_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }

    body
}
