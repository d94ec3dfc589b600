//! Manager lifecycle against fake MCP servers

mod common;

use std::time::{Duration, Instant};

use common::{Behavior, FakeServer};
use kvmcp_client::{
    BackoffStrategy, ClientConfig, ClientState, Manager, ManagerError, RetryConfig,
};
use kvmcp_protocol::ErrorCode;
use pretty_assertions::assert_eq;

fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn quick_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        backoff: BackoffStrategy::Constant,
        initial_wait: Duration::from_millis(100),
        max_wait: Duration::from_secs(1),
    }
}

#[tokio::test]
async fn test_start_all_reports_partial_failure() {
    let server = FakeServer::start().await;
    let manager = Manager::new([
        ("good".to_string(), server.config("")),
        (
            "bad".to_string(),
            ClientConfig::tcp("", "127.0.0.1", unused_port()).with_timeout(Duration::from_secs(2)),
        ),
        (
            "missing".to_string(),
            ClientConfig::stdio("", "kvmcp-no-such-server-binary", ["--stdio"]),
        ),
    ]);

    let err = manager.start_all().await.unwrap_err();
    assert_eq!(err.failed_clients(), vec!["bad", "missing"]);
    assert!(err.to_string().starts_with("failed to start some clients: bad: "));
    let ManagerError::Partial { failures, .. } = &err else {
        panic!("expected a partial failure, got {err:?}");
    };
    let spawn = failures[1].1.mcp_error().unwrap();
    assert_eq!(spawn.code, ErrorCode::ConnectionFailed);
    assert!(spawn.message.contains("kvmcp-no-such-server-binary"));
    assert_eq!(
        manager.client_status("missing").state,
        ClientState::Disconnected
    );

    let good = manager.client_status("good");
    assert_eq!(good.state, ClientState::Connected);
    assert!(good.initialized);
    assert_eq!(good.server_info.unwrap().name, "test-server");

    let bad = manager.client_status("bad");
    assert_eq!(bad.state, ClientState::Disconnected);
    assert!(bad.server_info.is_none());

    let health = manager.health_check_all().await;
    assert_eq!(health.get("good"), Some(&true));
    assert_eq!(health.get("bad"), Some(&false));

    manager.stop_all().await.unwrap();
    assert_eq!(manager.client_status("good").state, ClientState::Disconnected);
    assert!(!manager.health_check("good").await);
}

#[tokio::test]
async fn test_start_client_twice() {
    let server = FakeServer::start().await;
    let manager = Manager::new([("kv".to_string(), server.config(""))]);

    manager.start_client("kv").await.unwrap();
    let err = manager.start_client("kv").await.unwrap_err();
    assert!(matches!(err, ManagerError::AlreadyConnected(ref name) if name == "kv"));

    manager.shutdown().await.unwrap();
    // stopping an already stopped client is fine
    manager.stop_client("kv").await.unwrap();
}

#[tokio::test]
async fn test_failed_initialize_disconnects() {
    let server = FakeServer::with_behavior(Behavior {
        protocol_version: "1999-01-01".into(),
        ..Behavior::default()
    })
    .await;
    let manager = Manager::new([("kv".to_string(), server.config(""))]);

    let err = manager.start_client("kv").await.unwrap_err();
    assert!(matches!(err, ManagerError::Initialize { .. }));
    assert_eq!(err.mcp_error().unwrap().code, ErrorCode::ProtocolMismatch);

    let status = manager.client_status("kv");
    assert_eq!(status.state, ClientState::Disconnected);
    assert!(!status.initialized);
}

#[tokio::test]
async fn test_retry_gives_up_on_permanent_failure() {
    let server = FakeServer::with_behavior(Behavior {
        protocol_version: "1999-01-01".into(),
        ..Behavior::default()
    })
    .await;
    let manager = Manager::new([(
        "kv".to_string(),
        server.config("").with_retry(quick_retry(3)),
    )]);

    let err = manager.start_client_with_retry("kv").await.unwrap_err();
    assert!(matches!(err, ManagerError::Initialize { .. }));
    let handshakes = server
        .seen_methods()
        .iter()
        .filter(|m| *m == "initialize")
        .count();
    assert_eq!(handshakes, 1);
}

#[tokio::test]
async fn test_retry_repeats_connection_failures() {
    let config = ClientConfig::tcp("", "127.0.0.1", unused_port())
        .with_timeout(Duration::from_secs(1))
        .with_retry(quick_retry(3));
    let manager = Manager::new([("down".to_string(), config)]);

    let started = Instant::now();
    let err = manager.start_client_with_retry("down").await.unwrap_err();
    assert!(matches!(err, ManagerError::Connect { .. }));
    // two waits between three attempts
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_status_serializes_snake_case() {
    let server = FakeServer::start().await;
    let manager = Manager::new([("kv".to_string(), server.config(""))]);
    manager.start_client("kv").await.unwrap();

    let status = serde_json::to_value(manager.client_status("kv")).unwrap();
    assert_eq!(status["state"], "connected");
    assert_eq!(status["server_info"]["version"], "1.0.0");
    assert!(status.get("error").is_none());

    let missing = serde_json::to_value(manager.client_status("ghost")).unwrap();
    assert_eq!(missing["state"], "not_found");
    assert_eq!(missing["error"], "client not found");

    manager.shutdown().await.unwrap();
}
