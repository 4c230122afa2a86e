//! Batched upload of records to the destination API.

mod batching;
mod client;
mod retry;

pub use batching::into_batches;
pub use client::{BatchUploader, USER_AGENT, UploadReport};
pub use retry::{RetryPolicy, StatusClass, classify_status};
