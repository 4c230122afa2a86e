//! Source databases that rows are read from.
//!
//! [`Source`] opens connections and [`SourceConnection`] streams the rows of one table. The
//! [`sql::SqlSource`] implementation talks to real databases; [`memory::MemorySource`] serves
//! rows from memory for tests and dry runs.

mod base;
pub mod memory;
pub mod sql;

pub use base::{Source, SourceConnection, TableQuery};
