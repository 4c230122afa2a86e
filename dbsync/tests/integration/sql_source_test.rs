use dbsync::error::ErrorKind;
use dbsync::source::sql::SqlSource;
use dbsync::source::{Source, SourceConnection, TableQuery};
use dbsync::test_utils::database::{create_users_database, insert_raw_user};
use dbsync::test_utils::rows::TestUser;
use dbsync::types::SourceValue;
use dbsync_config::shared::{DatabaseConfig, SyncSettings};
use dbsync_telemetry::tracing::init_test_tracing;
use futures::{StreamExt, TryStreamExt};
use secrecy::SecretString;

fn database_config(dsn: &str) -> DatabaseConfig {
    DatabaseConfig {
        dsn: dsn.to_string(),
        username: SecretString::new("sync_user".to_string()),
        password: SecretString::new("sync_password".to_string()),
    }
}

fn default_query() -> TableQuery {
    TableQuery::from_settings(&SyncSettings::default())
}

#[tokio::test(flavor = "multi_thread")]
async fn reads_rows_ordered_by_id() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let users = vec![TestUser::new(3), TestUser::new(1), TestUser::new(2)];
    let dsn = create_users_database(dir.path(), &users).await;

    let mut connection = SqlSource::new()
        .connect(&database_config(&dsn))
        .await
        .unwrap();
    let query = default_query();
    let rows: Vec<_> = connection.read_all(&query).try_collect().await.unwrap();
    connection.close().await.unwrap();

    let ids: Vec<_> = rows.iter().map(|row| row.get("id").cloned()).collect();
    assert_eq!(
        ids,
        [1, 2, 3].map(|id| Some(SourceValue::Int(id)))
    );
    assert_eq!(rows[0], TestUser::new(1).to_row());
}

#[tokio::test(flavor = "multi_thread")]
async fn trims_text_and_keeps_nulls() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let dsn = create_users_database(dir.path(), &[]).await;
    insert_raw_user(&dsn, 7, Some("  secret  "), None, Some(" ACC7 ")).await;

    let mut connection = SqlSource::new()
        .connect(&database_config(&dsn))
        .await
        .unwrap();
    let query = default_query();
    let rows: Vec<_> = connection.read_all(&query).try_collect().await.unwrap();
    connection.close().await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("pass"),
        Some(&SourceValue::Text("secret".to_string()))
    );
    assert_eq!(rows[0].get("role"), Some(&SourceValue::Null));
    assert_eq!(
        rows[0].get("accountcode"),
        Some(&SourceValue::Text("ACC7".to_string()))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_table_is_query_failure() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let dsn = create_users_database(dir.path(), &[TestUser::new(1)]).await;

    let mut connection = SqlSource::new()
        .connect(&database_config(&dsn))
        .await
        .unwrap();
    let query = TableQuery::new("no_such_table".to_string(), vec!["id".to_string()], None);
    let first = connection.read_all(&query).next().await;
    connection.close().await.unwrap();

    let err = first.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_database_is_connection_failure() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let dsn = format!(
        "sqlite://{}?mode=ro",
        dir.path().join("missing.db").display()
    );

    let err = SqlSource::new()
        .connect(&database_config(&dsn))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
}
