use std::time::Duration;

use dbsync::concurrency::shutdown::create_shutdown_channel;
use dbsync::error::ErrorKind;
use dbsync::test_utils::rows::test_users;
use dbsync::types::{BatchOutcome, UploadRecord};
use dbsync::upload::{BatchUploader, USER_AGENT};
use dbsync_config::shared::{ApiConfig, RetryConfig, SyncSettings};
use dbsync_telemetry::tracing::init_test_tracing;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{FirstRecordId, RecordingResponder, received_batches};

const ENDPOINT: &str = "/api/users/sync";

fn api_config(server: &MockServer, timeout: i64, retry: RetryConfig) -> ApiConfig {
    ApiConfig {
        base_url: server.uri(),
        upload_endpoint: ENDPOINT.to_string(),
        timeout,
        retry,
    }
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 10,
        max_delay_ms: 100,
        backoff_multiplier: 2.0,
    }
}

fn settings(batch_size: usize, max_concurrent_batches: usize) -> SyncSettings {
    SyncSettings {
        batch_size,
        max_concurrent_batches,
        ..SyncSettings::default()
    }
}

fn records(count: usize) -> Vec<UploadRecord> {
    test_users(count).iter().map(|user| user.to_record()).collect()
}

#[tokio::test]
async fn uploads_batches_as_json_arrays() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("content-type", "application/json"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let uploader = BatchUploader::new(&api_config(&server, 5, fast_retry(3)), &settings(2, 1)).unwrap();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let report = uploader.upload(records(5), shutdown_rx).await;

    assert_eq!(report.results.len(), 3);
    assert!(report.results.iter().all(|result| result.is_uploaded()));
    assert_eq!(report.skipped_batches, 0);

    let batches = received_batches(&server).await;
    let sizes: Vec<_> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, [2, 2, 1]);
    assert_eq!(
        batches[0][0],
        serde_json::json!({ "id": "1", "pass": "pass-1", "role": "user", "accountcode": "ACC0001" })
    );
}

#[tokio::test]
async fn server_errors_are_retried_up_to_max_attempts() {
    init_test_tracing();
    let server = MockServer::start().await;
    let retry = RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 50,
        max_delay_ms: 1_000,
        backoff_multiplier: 2.0,
    };
    let responder = RecordingResponder::new(500);
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(responder.clone())
        .expect(3)
        .mount(&server)
        .await;

    let uploader = BatchUploader::new(&api_config(&server, 5, retry), &settings(100, 1)).unwrap();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let report = uploader.upload(records(3), shutdown_rx).await;

    let result = &report.results[0];
    assert_eq!(result.attempts, 3);
    let BatchOutcome::Failed { error } = &result.outcome else {
        panic!("expected failed batch, got {:?}", result.outcome);
    };
    assert_eq!(error.kind(), ErrorKind::BatchFailed);

    let arrivals = responder.arrivals();
    assert_eq!(arrivals.len(), 3);
    let first_gap = arrivals[1] - arrivals[0];
    let second_gap = arrivals[2] - arrivals[1];
    assert!(first_gap >= Duration::from_millis(50), "{first_gap:?}");
    assert!(second_gap >= Duration::from_millis(100), "{second_gap:?}");
}

#[tokio::test]
async fn client_errors_are_rejected_after_one_attempt() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid record"))
        .expect(1)
        .mount(&server)
        .await;

    let uploader = BatchUploader::new(&api_config(&server, 5, fast_retry(3)), &settings(100, 1)).unwrap();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let report = uploader.upload(records(3), shutdown_rx).await;

    let result = &report.results[0];
    assert_eq!(result.attempts, 1);
    match &result.outcome {
        BatchOutcome::Rejected { status, body } => {
            assert_eq!(*status, 422);
            assert_eq!(body, "invalid record");
        }
        other => panic!("expected rejected batch, got {other:?}"),
    }
}

#[tokio::test]
async fn one_failing_batch_does_not_stop_the_others() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(FirstRecordId("3"))
        .respond_with(ResponseTemplate::new(503))
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let uploader = BatchUploader::new(&api_config(&server, 5, fast_retry(2)), &settings(2, 3)).unwrap();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let report = uploader.upload(records(6), shutdown_rx).await;

    let outcomes: Vec<_> = report
        .results
        .iter()
        .map(|result| (result.index, result.outcome.label()))
        .collect();
    assert_eq!(outcomes, [(0, "uploaded"), (1, "failed"), (2, "uploaded")]);
}

#[tokio::test]
async fn timeouts_are_retried() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .expect(2)
        .mount(&server)
        .await;

    let uploader = BatchUploader::new(&api_config(&server, 1, fast_retry(2)), &settings(100, 1)).unwrap();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let report = uploader.upload(records(1), shutdown_rx).await;

    let result = &report.results[0];
    assert_eq!(result.attempts, 2);
    let BatchOutcome::Failed { error } = &result.outcome else {
        panic!("expected failed batch, got {:?}", result.outcome);
    };
    assert!(error.detail().unwrap().contains("timed out"), "{error}");
}

#[tokio::test]
async fn nothing_is_dispatched_after_shutdown() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let uploader = BatchUploader::new(&api_config(&server, 5, fast_retry(3)), &settings(2, 1)).unwrap();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    shutdown_tx.shutdown();
    let report = uploader.upload(records(5), shutdown_rx).await;

    assert!(report.results.is_empty());
    assert_eq!(report.skipped_batches, 3);
    assert_eq!(report.skipped_records, 5);
}
