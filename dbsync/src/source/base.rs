use std::future::Future;

use dbsync_config::shared::{DatabaseConfig, SyncSettings};
use futures::stream::BoxStream;

use crate::error::SyncResult;
use crate::types::SourceRow;

/// A database that can be opened for reading.
///
/// Each call to [`Source::connect`] opens a new, exclusively owned connection. Connections are
/// never pooled or shared between runs.
pub trait Source {
    /// Connection type produced by [`Source::connect`].
    type Connection: SourceConnection + Send;

    /// Returns the name of the source.
    fn name() -> &'static str;

    /// Opens a connection with the configured DSN and credentials.
    ///
    /// Fails with [`crate::error::ErrorKind::SourceConnectionFailed`] on authentication or
    /// network failures.
    fn connect(
        &self,
        config: &DatabaseConfig,
    ) -> impl Future<Output = SyncResult<Self::Connection>> + Send;
}

/// An open connection to a source database.
pub trait SourceConnection {
    /// Streams every row matched by `query`, in query order.
    ///
    /// The stream is finite and one-shot; reading again requires a new call. A query failure is
    /// yielded as an [`crate::error::ErrorKind::SourceQueryFailed`] item and callers stop at the
    /// first error. Rows yielded before the failure stay valid.
    fn read_all<'a>(&'a mut self, query: &'a TableQuery) -> BoxStream<'a, SyncResult<SourceRow>>;

    /// Closes the connection, releasing it on the server side.
    fn close(self) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Describes which table and columns to read, and in which order.
///
/// The identifiers are validated by the configuration layer, so the statement is built by plain
/// concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    table: String,
    columns: Vec<String>,
    order_by: Option<String>,
    sql: String,
}

impl TableQuery {
    pub fn new(table: String, columns: Vec<String>, order_by: Option<String>) -> Self {
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);
        if let Some(order_by) = &order_by {
            sql.push_str(&format!(" ORDER BY {order_by} ASC"));
        }

        Self {
            table,
            columns,
            order_by,
            sql,
        }
    }

    /// Builds the query described by the run settings.
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            settings.table_name.clone(),
            settings.columns.clone(),
            settings.order_by.clone(),
        )
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn order_by(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    /// Returns the `SELECT` statement for this query.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}
