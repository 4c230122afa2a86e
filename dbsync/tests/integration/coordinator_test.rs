use std::path::Path;
use std::time::Duration;

use dbsync::concurrency::shutdown::create_shutdown_channel;
use dbsync::error::ErrorKind;
use dbsync::run::{RUNS_FILE_NAME, RunPhase, RunResult, RunStatus, Stage, SyncCoordinator};
use dbsync::source::Source;
use dbsync::source::memory::MemorySource;
use dbsync::source::sql::SqlSource;
use dbsync::test_utils::config::{TEST_UPLOAD_ENDPOINT, test_config_json, write_config};
use dbsync::test_utils::database::{create_users_database, insert_raw_user};
use dbsync::test_utils::rows::{test_users, user_rows};
use dbsync_telemetry::tracing::init_test_tracing;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{FirstRecordId, received_batches};

async fn run_sync<S: Source>(source: S, dir: &TempDir, config: &Value) -> RunResult {
    let config_path = write_config(dir.path(), config);
    let (shutdown_tx, _) = create_shutdown_channel();
    let mut coordinator = SyncCoordinator::new(source, config_path, dir.path(), shutdown_tx);

    let result = coordinator.run().await.unwrap();
    assert_eq!(coordinator.phase(), RunPhase::Terminal(result.status));

    result
}

async fn mock_upload(server: &MockServer, status: u16, expected: u64) {
    Mock::given(method("POST"))
        .and(path(TEST_UPLOAD_ENDPOINT))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected)
        .mount(server)
        .await;
}

fn recorded_runs(log_dir: &Path) -> Vec<Value> {
    std::fs::read_to_string(log_dir.join(RUNS_FILE_NAME))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn three_rows_upload_successfully() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_upload(&server, 200, 1).await;
    let dsn = create_users_database(dir.path(), &test_users(3)).await;

    let result = run_sync(SqlSource::new(), &dir, &test_config_json(&dsn, &server.uri())).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.rows_read, 3);
    assert_eq!(result.rows_uploaded, 3);
    assert_eq!(result.batches_uploaded, 1);
    assert!(result.errors.is_empty());

    let batches = received_batches(&server).await;
    let ids: Vec<_> = batches[0].iter().map(|record| record["id"].clone()).collect();
    assert_eq!(ids, [json!("1"), json!("2"), json!("3")]);

    let runs = recorded_runs(dir.path());
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["status"], "success");
    assert_eq!(runs[0]["rows_uploaded"], 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_last_batch_is_partial_failure() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TEST_UPLOAD_ENDPOINT))
        .and(FirstRecordId("201"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .expect(3)
        .mount(&server)
        .await;
    mock_upload(&server, 200, 2).await;
    let dsn = create_users_database(dir.path(), &test_users(250)).await;

    let result = run_sync(SqlSource::new(), &dir, &test_config_json(&dsn, &server.uri())).await;

    assert_eq!(result.status, RunStatus::PartialFailure);
    assert_ne!(result.exit_code(), 0);
    assert_eq!(result.rows_read, 250);
    assert_eq!(result.rows_uploaded, 200);
    assert_eq!(result.batches_uploaded, 2);
    assert_eq!(result.batches_failed, 1);
    assert_eq!(result.batches[2].attempts, 3);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, Stage::Uploading);
    assert_eq!(result.errors[0].kind, "BatchFailed");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_base_url_fails_before_connecting() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config_json("memory://acc", "http://localhost:1");
    config["api"].as_object_mut().unwrap().remove("base_url");
    let source = MemorySource::new(user_rows(3));

    let result = run_sync(source.clone(), &dir, &config).await;

    assert_eq!(result.status, RunStatus::FatalError);
    assert_ne!(result.exit_code(), 0);
    assert_eq!(result.errors[0].stage, Stage::Loading);
    assert_eq!(result.errors[0].kind, format!("{:?}", ErrorKind::ConfigMalformed));
    assert_eq!(source.connect_attempts(), 0);
    assert_eq!(recorded_runs(dir.path())[0]["status"], "fatal_error");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_config_file_is_fatal() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (shutdown_tx, _) = create_shutdown_channel();
    let mut coordinator = SyncCoordinator::new(
        MemorySource::default(),
        dir.path().join("absent.json"),
        dir.path(),
        shutdown_tx,
    );

    let result = coordinator.run().await.unwrap();

    assert_eq!(result.status, RunStatus::FatalError);
    assert_eq!(result.errors[0].kind, "ConfigNotFound");
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_table_is_success() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_upload(&server, 200, 0).await;
    let dsn = create_users_database(dir.path(), &[]).await;

    let result = run_sync(SqlSource::new(), &dir, &test_config_json(&dsn, &server.uri())).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.rows_read, 0);
    assert!(result.batches.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn mismatched_rows_are_skipped() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_upload(&server, 200, 1).await;
    let dsn = create_users_database(dir.path(), &test_users(2)).await;
    insert_raw_user(&dsn, 3, None, Some("admin"), None).await;
    insert_raw_user(&dsn, 4, Some("   "), None, None).await;

    let result = run_sync(SqlSource::new(), &dir, &test_config_json(&dsn, &server.uri())).await;

    assert_eq!(result.status, RunStatus::PartialFailure);
    assert_eq!(result.rows_read, 4);
    assert_eq!(result.rows_skipped, 2);
    assert_eq!(result.rows_uploaded, 2);
    assert!(result.errors.iter().all(|error| error.stage == Stage::Transforming));
    assert!(result.errors.iter().all(|error| error.kind == "SchemaMismatch"));
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_failure_is_fatal_and_uploads_nothing() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_upload(&server, 200, 0).await;
    let source = MemorySource::new(user_rows(3)).fail_on_connect();

    let result = run_sync(
        source.clone(),
        &dir,
        &test_config_json("memory://acc", &server.uri()),
    )
    .await;

    assert_eq!(result.status, RunStatus::FatalError);
    assert_eq!(result.errors[0].stage, Stage::Connecting);
    assert_eq!(result.errors[0].kind, "SourceConnectionFailed");
    assert_eq!(source.closed_connections(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn query_failure_before_first_row_is_fatal() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_upload(&server, 200, 0).await;
    let dsn = create_users_database(dir.path(), &test_users(3)).await;
    let mut config = test_config_json(&dsn, &server.uri());
    config["settings"]["table_name"] = json!("missing_table");

    let result = run_sync(SqlSource::new(), &dir, &config).await;

    assert_eq!(result.status, RunStatus::FatalError);
    assert_eq!(result.errors[0].stage, Stage::Reading);
    assert_eq!(result.errors[0].kind, "SourceQueryFailed");
}

#[tokio::test(flavor = "multi_thread")]
async fn query_failure_mid_read_keeps_rows_read() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_upload(&server, 200, 1).await;
    let source = MemorySource::new(user_rows(5)).fail_after_rows(2);

    let result = run_sync(
        source.clone(),
        &dir,
        &test_config_json("memory://acc", &server.uri()),
    )
    .await;

    assert_eq!(result.status, RunStatus::PartialFailure);
    assert!(result.read_interrupted);
    assert_eq!(result.rows_read, 2);
    assert_eq!(result.rows_uploaded, 2);
    assert_eq!(source.closed_connections(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_before_reading_cancels_without_connecting() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(
        dir.path(),
        &test_config_json("memory://acc", "http://localhost:1"),
    );
    let source = MemorySource::new(user_rows(3));
    let (shutdown_tx, _) = create_shutdown_channel();
    shutdown_tx.shutdown();
    let mut coordinator =
        SyncCoordinator::new(source.clone(), config_path, dir.path(), shutdown_tx);

    let result = coordinator.run().await.unwrap();

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.exit_code(), 130);
    assert_eq!(source.connect_attempts(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_stops_dispatching_batches() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TEST_UPLOAD_ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;
    let mut config = test_config_json("memory://acc", &server.uri());
    config["settings"]["batch_size"] = json!(2);
    config["settings"]["deadline_secs"] = json!(1);

    let result = run_sync(MemorySource::new(user_rows(4)), &dir, &config).await;

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.batches_uploaded, 1);
    assert_eq!(result.batches_skipped, 1);
    assert_eq!(result.rows_uploaded, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn running_twice_is_invalid_state() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(
        dir.path(),
        &test_config_json("memory://acc", "http://localhost:1"),
    );
    let (shutdown_tx, _) = create_shutdown_channel();
    let mut coordinator =
        SyncCoordinator::new(MemorySource::default(), config_path, dir.path(), shutdown_tx);

    coordinator.run().await.unwrap();
    let err = coordinator.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(flavor = "multi_thread")]
async fn each_run_appends_to_the_artifact() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config_json("memory://acc", "http://localhost:1");

    run_sync(MemorySource::default(), &dir, &config).await;
    run_sync(MemorySource::default(), &dir, &config).await;

    assert_eq!(recorded_runs(dir.path()).len(), 2);
}
