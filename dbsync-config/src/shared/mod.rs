//! Shared configuration types for sync runs.

mod api;
mod base;
mod database;
mod settings;
mod sync;

pub use api::{ApiConfig, RetryConfig};
pub use base::{ValidationError, is_sql_identifier};
pub use database::DatabaseConfig;
pub use settings::SyncSettings;
pub use sync::SyncConfig;
