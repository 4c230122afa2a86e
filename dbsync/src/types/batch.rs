use crate::error::SyncError;
use crate::types::UploadRecord;

/// A bounded, ordered group of records sent in a single upload request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Zero-based position of the batch within the run.
    pub index: usize,
    pub records: Vec<UploadRecord>,
}

impl Batch {
    pub fn new(index: usize, records: Vec<UploadRecord>) -> Self {
        Self { index, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Terminal outcome of uploading one [`Batch`].
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// The API answered with a 2xx status.
    Uploaded,
    /// The API answered with a 4xx status. Never retried.
    Rejected { status: u16, body: String },
    /// Every attempt failed with a retryable error, or the request could not be sent at all.
    Failed { error: SyncError },
}

impl BatchOutcome {
    /// Returns a short label for logs and the run artifact.
    pub fn label(&self) -> &'static str {
        match self {
            BatchOutcome::Uploaded => "uploaded",
            BatchOutcome::Rejected { .. } => "rejected",
            BatchOutcome::Failed { .. } => "failed",
        }
    }
}

/// Result of uploading one [`Batch`].
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub index: usize,
    pub record_count: usize,
    /// Number of HTTP attempts made, the first one included.
    pub attempts: u32,
    pub outcome: BatchOutcome,
}

impl BatchResult {
    pub fn is_uploaded(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Uploaded)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Rejected { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Failed { .. })
    }
}
