use crate::types::{Batch, UploadRecord};

/// Splits `records` into consecutive batches of at most `max_batch_size` records.
///
/// Produces exactly `ceil(N / max_batch_size)` batches, indexed from zero, that together hold
/// every record once in the original order. A `max_batch_size` of zero is treated as one.
pub fn into_batches(records: Vec<UploadRecord>, max_batch_size: usize) -> Vec<Batch> {
    let max_batch_size = max_batch_size.max(1);
    let mut batches = Vec::with_capacity(records.len().div_ceil(max_batch_size));
    let mut records = records.into_iter().peekable();

    while records.peek().is_some() {
        let chunk: Vec<_> = records.by_ref().take(max_batch_size).collect();
        batches.push(Batch::new(batches.len(), chunk));
    }

    batches
}
