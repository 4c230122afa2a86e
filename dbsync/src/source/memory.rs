use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dbsync_config::shared::DatabaseConfig;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::source::{Source, SourceConnection, TableQuery};
use crate::sync_error;
use crate::types::SourceRow;

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// In-memory source serving a fixed set of rows.
///
/// Rows are returned in insertion order whatever the query says. Failures can be injected to
/// exercise the connection and query error paths. Clones share their counters, so a test can
/// keep a clone and inspect how the source was used after handing it to a coordinator.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Arc<Vec<SourceRow>>,
    fail_connect: bool,
    fail_after: Option<usize>,
    counters: Arc<Counters>,
}

impl MemorySource {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self {
            rows: Arc::new(rows),
            ..Self::default()
        }
    }

    /// Makes every connection attempt fail.
    pub fn fail_on_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Makes the query fail after `rows` rows were yielded.
    pub fn fail_after_rows(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    /// Returns how many connections were attempted.
    pub fn connect_attempts(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Returns how many connections were closed.
    pub fn closed_connections(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

impl Source for MemorySource {
    type Connection = MemoryConnection;

    fn name() -> &'static str {
        "memory"
    }

    async fn connect(&self, config: &DatabaseConfig) -> SyncResult<Self::Connection> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        if self.fail_connect {
            bail!(
                ErrorKind::SourceConnectionFailed,
                "Database connection failed",
                format!("memory source refused connection to `{}`", config.dsn)
            );
        }

        info!(rows = self.rows.len(), "connected to memory source");

        Ok(MemoryConnection {
            rows: self.rows.clone(),
            fail_after: self.fail_after,
            counters: self.counters.clone(),
        })
    }
}

/// Connection handed out by [`MemorySource`].
#[derive(Debug)]
pub struct MemoryConnection {
    rows: Arc<Vec<SourceRow>>,
    fail_after: Option<usize>,
    counters: Arc<Counters>,
}

impl SourceConnection for MemoryConnection {
    fn read_all<'a>(&'a mut self, query: &'a TableQuery) -> BoxStream<'a, SyncResult<SourceRow>> {
        let limit = self.fail_after.unwrap_or(self.rows.len()).min(self.rows.len());
        let rows = self.rows[..limit].iter().cloned().map(Ok);

        let failure = self.fail_after.map(|yielded| {
            Err(sync_error!(
                ErrorKind::SourceQueryFailed,
                "Database query failed",
                format!("memory source failed reading `{}` after {yielded} rows", query.table())
            ))
        });

        stream::iter(rows.chain(failure)).boxed()
    }

    async fn close(self) -> SyncResult<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}
