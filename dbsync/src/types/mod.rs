//! Values flowing between the stages of a run.

mod batch;
mod record;
mod row;

pub use batch::{Batch, BatchOutcome, BatchResult};
pub use record::UploadRecord;
pub use row::{SourceRow, SourceValue};
