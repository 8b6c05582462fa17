//! Server mode tests.
//!
//! These need a running StackQL server with the aws provider available. Set
//! `STACKQL_SERVER=host:port` to run them; otherwise they are skipped.

use std::collections::BTreeSet;

use futures::future::join_all;
use serde_json::json;
use stackql_client::config::{Config, ServerConfig};
use stackql_client::error::ClientError;
use stackql_client::query::Session;
use stackql_client::transport::{ConnectionTransport, TransportKind};

const SERVER_ENV: &str = "STACKQL_SERVER";

fn server_config() -> Option<ServerConfig> {
    let address = std::env::var(SERVER_ENV).ok()?;
    let (host, port) = address.rsplit_once(':')?;
    Some(ServerConfig {
        host: host.to_string(),
        port: port.parse().ok()?,
        ..Default::default()
    })
}

async fn server_session() -> Option<Session> {
    let Some(server) = server_config() else {
        eprintln!("Skipping: {SERVER_ENV} not set");
        return None;
    };
    let config = Config {
        server_mode: true,
        server,
        ..Default::default()
    };
    Some(Session::new(config).await.expect("connect to server"))
}

#[tokio::test]
async fn test_server_session_has_no_binary() {
    let Some(session) = server_session().await else {
        return;
    };
    assert_eq!(session.transport_kind(), TransportKind::Connection);
    assert!(session.binary().is_none());
    assert!(session.properties().server.is_some());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_statement_without_rows_returns_empty_marker() {
    let Some(session) = server_session().await else {
        return;
    };
    let output = session.execute_statement("REGISTRY PULL aws").await.unwrap();
    assert_eq!(output, "[]");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_queries_share_one_connection() {
    let Some(session) = server_session().await else {
        return;
    };

    let queries: Vec<String> = (0..10).map(|i| format!("SELECT '{i}' as tag")).collect();
    let results = join_all(queries.iter().map(|q| session.execute(q))).await;

    for (i, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        let records = result.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["tag"], json!(i.to_string()));
    }
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_batch_over_connection() {
    let Some(session) = server_session().await else {
        return;
    };

    let result = session
        .execute_batch(["SELECT 'a' as tag", "SELECT 'b' as tag"])
        .await
        .unwrap();
    let tags: BTreeSet<String> = result
        .records()
        .unwrap()
        .iter()
        .filter_map(|r| r["tag"].as_str().map(String::from))
        .collect();
    assert_eq!(tags, BTreeSet::from(["a".to_string(), "b".to_string()]));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_closed_connection_rejects_queries() {
    let Some(server) = server_config() else {
        eprintln!("Skipping: {SERVER_ENV} not set");
        return;
    };

    let connection = ConnectionTransport::connect(&server, None).await.unwrap();
    assert!(connection.is_open().await);
    connection.close().await.unwrap();
    assert!(!connection.is_open().await);

    let err = connection.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionLost(_)), "got {err:?}");
}
