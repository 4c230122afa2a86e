use std::time::Duration;

use dbsync_config::shared::DatabaseConfig;
use futures::stream::{BoxStream, StreamExt};
use secrecy::ExposeSecret;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Column, Connection, Row, TypeInfo, ValueRef};
use tracing::{debug, info};
use url::Url;

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::source::{Source, SourceConnection, TableQuery};
use crate::types::{SourceRow, SourceValue};

/// Maximum time allowed for opening a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Source backed by the `sqlx` `Any` driver.
///
/// The DSN scheme picks the driver: `postgres://`, `mysql://` or `sqlite://`. Credentials from the
/// configuration are injected into network DSNs; SQLite DSNs are used as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlSource;

impl SqlSource {
    pub fn new() -> Self {
        Self
    }
}

impl Source for SqlSource {
    type Connection = SqlConnection;

    fn name() -> &'static str {
        "sql"
    }

    async fn connect(&self, config: &DatabaseConfig) -> SyncResult<Self::Connection> {
        sqlx::any::install_default_drivers();

        let url = connection_url(config)?;
        info!(dsn = %config.dsn, "connecting to source database");

        let connection = match tokio::time::timeout(CONNECT_TIMEOUT, AnyConnection::connect(&url))
            .await
        {
            Ok(connection) => connection.map_err(connection_failed)?,
            Err(_) => bail!(
                ErrorKind::SourceConnectionFailed,
                "Database connection timed out",
                format!("no connection after {}s", CONNECT_TIMEOUT.as_secs())
            ),
        };

        info!(backend = connection.backend_name(), "connected to source database");

        Ok(SqlConnection { connection })
    }
}

/// An open `sqlx` connection.
#[derive(Debug)]
pub struct SqlConnection {
    connection: AnyConnection,
}

impl SourceConnection for SqlConnection {
    fn read_all<'a>(&'a mut self, query: &'a TableQuery) -> BoxStream<'a, SyncResult<SourceRow>> {
        info!(query = query.sql(), "executing source query");

        sqlx::query(query.sql())
            .fetch(&mut self.connection)
            .map(|row| {
                let row = row.map_err(query_failed)?;
                decode_row(&row)
            })
            .boxed()
    }

    async fn close(self) -> SyncResult<()> {
        self.connection.close().await.map_err(connection_failed)?;
        debug!("source database connection closed");

        Ok(())
    }
}

/// Builds the driver URL, carrying the configured credentials for network databases.
fn connection_url(config: &DatabaseConfig) -> SyncResult<String> {
    let mut url = Url::parse(&config.dsn).map_err(|err| {
        crate::sync_error!(
            ErrorKind::SourceConnectionFailed,
            "Database DSN is not a valid URL",
            err
        )
    })?;

    if url.scheme().starts_with("sqlite") {
        return Ok(config.dsn.clone());
    }

    if url
        .set_username(config.username.expose_secret())
        .and_then(|_| url.set_password(Some(config.password.expose_secret())))
        .is_err()
    {
        bail!(
            ErrorKind::SourceConnectionFailed,
            "Database DSN cannot carry credentials",
            config.dsn.clone()
        );
    }

    Ok(url.into())
}

/// Classifies any failure while opening or closing as a connection failure.
fn connection_failed(err: sqlx::Error) -> SyncError {
    let detail = err.to_string();
    crate::sync_error!(
        ErrorKind::SourceConnectionFailed,
        "Database connection failed",
        detail = detail,
        source: err
    )
}

/// Classifies a failure while the statement runs as a query failure.
fn query_failed(err: sqlx::Error) -> SyncError {
    match err {
        err @ (sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_)) => {
            SyncError::from(err)
        }
        err => {
            let detail = err.to_string();
            crate::sync_error!(
                ErrorKind::SourceQueryFailed,
                "Database query failed",
                detail = detail,
                source: err
            )
        }
    }
}

fn decode_row(row: &AnyRow) -> SyncResult<SourceRow> {
    let mut columns = Vec::with_capacity(row.len());
    for column in row.columns() {
        let value = decode_value(row, column.ordinal())?;
        columns.push((column.name().to_string(), value));
    }

    Ok(SourceRow::new(columns))
}

/// Decodes one column by the type reported for its value.
///
/// Text is trimmed. Binary values are read as lossy UTF-8 text.
fn decode_value(row: &AnyRow, index: usize) -> SyncResult<SourceValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SourceValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let value = match type_name.as_str() {
        "NULL" => SourceValue::Null,
        "BOOLEAN" | "BOOL" => SourceValue::Bool(row.try_get::<bool, _>(index)?),
        "SMALLINT" | "INTEGER" | "INT" | "BIGINT" => {
            SourceValue::Int(row.try_get::<i64, _>(index)?)
        }
        "REAL" | "DOUBLE" | "FLOAT" => SourceValue::Float(row.try_get::<f64, _>(index)?),
        "BLOB" | "BYTEA" => {
            let bytes = row.try_get::<Vec<u8>, _>(index)?;
            SourceValue::Text(String::from_utf8_lossy(&bytes).trim().to_string())
        }
        _ => SourceValue::Text(row.try_get::<String, _>(index)?.trim().to_string()),
    };

    Ok(value)
}
