//! Session tests in process mode against the fake runtime.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use stackql_client::config::{Config, OutputFormat};
use stackql_client::error::ClientError;
use stackql_client::query::{QueryResult, Record, Session};
use stackql_client::transport::TransportKind;

use super::common::{fake_config, install_fake_runtime, region_query};

async fn fake_session(customize: impl FnOnce(&mut Config)) -> (tempfile::TempDir, Session) {
    let dir = tempfile::tempdir().unwrap();
    let bin = install_fake_runtime(dir.path());
    let mut config = fake_config(&bin);
    customize(&mut config);
    let session = Session::new(config).await.unwrap();
    (dir, session)
}

fn regions(records: &[Record]) -> BTreeSet<String> {
    records
        .iter()
        .filter_map(|r| r.get("region").and_then(|v| v.as_str()).map(String::from))
        .collect()
}

#[tokio::test]
async fn test_session_uses_process_transport() {
    let (_dir, session) = fake_session(|_| {}).await;
    assert_eq!(session.transport_kind(), TransportKind::Process);
    assert_eq!(session.binary().unwrap().version, "v0.5.396");
}

#[tokio::test]
async fn test_execute_returns_records() {
    let (_dir, session) = fake_session(|_| {}).await;

    let result = session.execute(&region_query("us-east-1")).await.unwrap();
    let records = result.records().unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["instanceType"], json!("t2.micro"));
    assert_eq!(records[0]["num_instances"], json!(2));
    assert_eq!(regions(records), BTreeSet::from(["us-east-1".to_string()]));

    let columns: Vec<&str> = records[0].keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["region", "instanceType", "num_instances"]);
}

#[tokio::test]
async fn test_execute_empty_result() {
    let (_dir, session) = fake_session(|_| {}).await;
    let result = session.execute("SELECT EMPTY").await.unwrap();
    assert_eq!(result, QueryResult::Records(Vec::new()));
}

#[tokio::test]
async fn test_execute_malformed_output_is_parse_error() {
    let (_dir, session) = fake_session(|_| {}).await;
    let err = session.execute("SELECT GARBAGE").await.unwrap_err();
    assert!(matches!(err, ClientError::Parse(_)), "got {err:?}");
    assert!(err.to_string().contains("this is not json"));
}

#[tokio::test]
async fn test_execute_failure_is_execution_error() {
    let (_dir, session) = fake_session(|_| {}).await;
    let err = session.execute("SELECT FAIL").await.unwrap_err();
    assert!(matches!(err, ClientError::ExecutionFailed(_)), "got {err:?}");
    assert!(err.to_string().contains("access denied"));
}

#[tokio::test]
async fn test_stderr_only_success_is_execution_error() {
    let (_dir, session) = fake_session(|_| {}).await;

    let err = session.execute("SELECT STDERR_ONLY").await.unwrap_err();
    assert!(matches!(err, ClientError::ExecutionFailed(_)), "got {err:?}");
    assert!(err.to_string().contains("provider aws not installed"));

    let err = session
        .execute_statement("REGISTRY PULL STDERR_ONLY")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ExecutionFailed(_)), "got {err:?}");
}

#[tokio::test]
async fn test_execute_statement_returns_text() {
    let (_dir, session) = fake_session(|_| {}).await;
    let output = session.execute_statement("REGISTRY PULL aws").await.unwrap();
    assert!(output.contains("successfully installed"), "got {output}");
}

#[tokio::test]
async fn test_csv_output_passes_through() {
    let (_dir, session) = fake_session(|c| c.output = OutputFormat::Csv).await;

    let result = session.execute(&region_query("eu-west-1")).await.unwrap();
    let text = result.text().unwrap();
    assert!(text.starts_with("region,instanceType,num_instances"));
    assert!(text.contains("eu-west-1,m5.large,1"));
}

#[tokio::test]
async fn test_batch_concatenates_every_query() {
    let (_dir, session) = fake_session(|_| {}).await;

    let result = session
        .execute_batch([region_query("us-east-1"), region_query("ap-southeast-2")])
        .await
        .unwrap();
    let records = result.records().unwrap();

    assert_eq!(records.len(), 4);
    assert_eq!(
        regions(records),
        BTreeSet::from(["ap-southeast-2".to_string(), "us-east-1".to_string()])
    );

    // Rows of one query stay together and in order.
    for pair in records.chunks(2) {
        assert_eq!(pair[0]["region"], pair[1]["region"]);
        assert_eq!(pair[0]["instanceType"], json!("t2.micro"));
        assert_eq!(pair[1]["instanceType"], json!("m5.large"));
    }
}

#[tokio::test]
async fn test_batch_fails_when_any_query_fails() {
    let (_dir, session) = fake_session(|_| {}).await;

    let err = session
        .execute_batch([region_query("us-east-1"), "SELECT FAIL".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ExecutionFailed(_)), "got {err:?}");
}

#[tokio::test]
async fn test_batch_runs_queries_concurrently() {
    let (_dir, session) = fake_session(|_| {}).await;

    let start = Instant::now();
    let result = session
        .execute_batch(["NAP 1", "NAP 2", "NAP 3", "NAP 4"])
        .await
        .unwrap();

    assert_eq!(result.len(), 4);
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "batch took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_batch_respects_max_concurrency() {
    let (_dir, session) = fake_session(|c| c.max_concurrency = Some(1)).await;

    let start = Instant::now();
    let result = session.execute_batch(["NAP 1", "NAP 2"]).await.unwrap();

    assert_eq!(result.len(), 2);
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn test_properties_report_binary() {
    let (dir, session) = fake_session(|_| {}).await;

    let props = serde_json::to_value(session.properties()).unwrap();
    assert_eq!(props["transport"], json!("process"));
    assert_eq!(props["binary"]["version"], json!("v0.5.396"));
    assert_eq!(props["binary"]["sha"], json!("8f1d6f5"));
    assert_eq!(
        props["binary"]["path"],
        json!(dir.path().join("stackql").display().to_string())
    );
    assert_eq!(props["execution_timeout_secs"], json!(300));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_binary_is_binary_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        download_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };

    let err = Session::new(config).await.unwrap_err();
    assert!(matches!(err, ClientError::Binary(_)), "got {err:?}");
}
