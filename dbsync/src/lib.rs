//! Database-to-API synchronization.
//!
//! A run reads every row of one source table, maps each row to the record shape expected by the
//! destination API, and uploads the records in bounded batches. The [`run::SyncCoordinator`]
//! drives the stages and produces a [`run::RunResult`] together with the process exit code.
//!
//! Stages, leaf first:
//!
//! - [`source`]: database connections and the ordered table read.
//! - [`transform`]: pure mapping from [`types::SourceRow`] to [`types::UploadRecord`].
//! - [`upload`]: batching, HTTP upload, retry with backoff.
//! - [`run`]: the state machine tying the stages together and the run log artifact.

pub mod concurrency;
pub mod error;
mod macros;
pub mod run;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod types;
pub mod upload;
