//! Helpers for testing sync runs without external services.
//!
//! - [`database`] creates SQLite databases holding an `acc_users` table.
//! - [`config`] writes configuration files pointing at test databases and mock APIs.
//! - [`rows`] builds source rows and records in memory.

pub mod config;
pub mod database;
pub mod rows;
