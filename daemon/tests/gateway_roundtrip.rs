//! End-to-end exchanges against an in-process gateway on a real socket.

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

use gateway_common::{DaemonClient, ErrorCode, Response};
use toolgate_daemon::config::DaemonConfig;
use toolgate_daemon::dispatch::Dispatcher;
use toolgate_daemon::handlers::build_registry;
use toolgate_daemon::resources::WarmResources;
use toolgate_daemon::server::GatewayServer;
use toolgate_daemon::store::MessageStore;

/// Create and seed an archive file the daemon can open.
fn provision_db(path: &Path) {
    std::fs::File::create(path).unwrap();
    let mut store = MessageStore::open(path).unwrap();
    store.init_schema().unwrap();
    drop(store);

    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute(
        "INSERT INTO conversations (id, contact, display_name, last_active)
         VALUES (1, '+15550001234', 'Ada', '2026-08-20T10:00:00')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO messages (conversation_id, contact, text, sent_at, is_from_me, is_read)
         VALUES (1, '+15550001234', ?1, '2026-08-20T09:00:00', 0, 0)",
        [format!("lunch tomorrow? {}", "x".repeat(300))],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO messages (conversation_id, contact, text, sent_at, is_from_me, is_read)
         VALUES (1, '+15550001234', 'also bring the charger', '2026-08-20T09:05:00', 0, 0)",
        [],
    )
    .unwrap();
}

async fn start_gateway(dir: &Path) -> (DaemonConfig, JoinHandle<()>) {
    let cfg = DaemonConfig::new(
        dir.join("daemon.sock"),
        dir.join("daemon.pid"),
        dir.join("messages.db"),
    );
    provision_db(&cfg.db_path);

    let resources = WarmResources::open(&cfg).unwrap();
    let server = GatewayServer::new(cfg.clone(), Dispatcher::new(build_registry()), resources);
    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Wait for the listener to come up.
    let client = DaemonClient::new(cfg.socket_path.clone());
    for _ in 0..50 {
        if client.is_listening().await {
            return (cfg, handle);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("gateway did not start listening");
}

#[tokio::test]
async fn test_health_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, handle) = start_gateway(dir.path()).await;

    let client = DaemonClient::new(cfg.socket_path.clone());
    let resp = client.call("health", json!({})).await.unwrap();
    assert!(resp.ok);
    let result = resp.result.unwrap();
    assert_eq!(result["protocol_version"], 1);
    assert_eq!(result["resources"]["message-store"]["reachable"], true);
    assert!(resp.meta.server_ms >= 0.0);

    handle.abort();
}

#[tokio::test]
async fn test_malformed_frame_then_daemon_keeps_serving() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, handle) = start_gateway(dir.path()).await;

    // Raw garbage on the wire yields a PROTOCOL_ERROR envelope with no id.
    let stream = UnixStream::connect(&cfg.socket_path).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    writer.write_all(b"this is not json\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await.unwrap();
    let resp: Response = serde_json::from_str(&line).unwrap();
    assert!(!resp.ok);
    assert_eq!(resp.id, None);
    assert_eq!(resp.error.unwrap().code, ErrorCode::ProtocolError);

    // The daemon is still up for the next caller.
    let client = DaemonClient::new(cfg.socket_path.clone());
    let resp = client.call("unread_count", json!({})).await.unwrap();
    assert!(resp.ok);
    assert_eq!(resp.result.unwrap()["count"], 2);

    handle.abort();
}

#[tokio::test]
async fn test_blank_frame_gets_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, handle) = start_gateway(dir.path()).await;

    let stream = UnixStream::connect(&cfg.socket_path).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    writer.write_all(b"\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await.unwrap();
    let resp: Response = serde_json::from_str(&line).unwrap();
    assert!(!resp.ok);
    assert_eq!(resp.error.unwrap().code, ErrorCode::ProtocolError);

    let client = DaemonClient::new(cfg.socket_path.clone());
    assert!(client.call("health", json!({})).await.unwrap().ok);

    handle.abort();
}

#[tokio::test]
async fn test_unknown_method_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, handle) = start_gateway(dir.path()).await;

    let client = DaemonClient::new(cfg.socket_path.clone());
    let resp = client.call("export_all", json!({})).await.unwrap();
    assert!(!resp.ok);
    assert_eq!(resp.error.unwrap().code, ErrorCode::MethodNotFound);

    handle.abort();
}

#[tokio::test]
async fn test_mark_read_mutates_store() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, handle) = start_gateway(dir.path()).await;

    let client = DaemonClient::new(cfg.socket_path.clone());
    let resp = client
        .call("mark_read", json!({"contact": "+15550001234"}))
        .await
        .unwrap();
    assert!(resp.ok);
    assert_eq!(resp.result.unwrap()["updated"], 2);

    let resp = client.call("unread_count", json!({})).await.unwrap();
    assert_eq!(resp.result.unwrap()["count"], 0);

    handle.abort();
}

#[tokio::test]
async fn test_shaping_controls_apply_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, handle) = start_gateway(dir.path()).await;

    let client = DaemonClient::new(cfg.socket_path.clone());
    let resp = client
        .call("unread", json!({"minimal": true}))
        .await
        .unwrap();
    assert!(resp.ok);
    let messages = resp.result.unwrap()["messages"].clone();
    let first = &messages[0];
    let keys: Vec<&String> = first.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["date", "contact", "text"]);
    // Minimal preset implies truncation at 120 chars plus the marker.
    let long = messages
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["text"].as_str().unwrap().ends_with("..."))
        .expect("the 300-char message should be truncated");
    assert_eq!(long["text"].as_str().unwrap().chars().count(), 123);

    handle.abort();
}

#[tokio::test]
async fn test_socket_is_owner_only() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, handle) = start_gateway(dir.path()).await;

    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(&cfg.socket_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    handle.abort();
}
