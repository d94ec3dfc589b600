//! The `kvmcp-server` binary driven by a `StdioClient`

use std::time::Duration;

use kvmcp_client::{Client, ClientConfig, StdioClient};
use kvmcp_protocol::{ErrorCode, PROTOCOL_VERSION};
use serde_json::{Map, Value};

fn server_config(env: &[(&str, &str)]) -> ClientConfig {
    let mut config = ClientConfig::stdio(
        "kv",
        env!("CARGO_BIN_EXE_kvmcp-server"),
        Vec::<String>::new(),
    );
    config.timeout = Duration::from_secs(10);
    config.env = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    config
}

fn text(value: &str) -> Option<Map<String, Value>> {
    let mut args = Map::new();
    args.insert("text".into(), value.into());
    Some(args)
}

#[tokio::test]
async fn test_stdio_session() {
    let client = StdioClient::new(server_config(&[("KVMCP_LOGGING__OUTPUT", "none")]));
    client.connect().await.unwrap();

    let result = client.initialize().await.unwrap();
    assert_eq!(result.protocol_version, PROTOCOL_VERSION);
    assert_eq!(result.server_info.name, kvmcp_server::SERVER_NAME);

    let tools = client.list_tools(None).await.unwrap();
    let names: Vec<&str> = tools.tools.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"local.echo"));

    let result = client.call_tool("echo", text("from stdio")).await.unwrap();
    assert_eq!(result.content[0].as_text(), Some("from stdio"));

    let err = client.call_tool("missing", None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ToolNotFound);

    client.ping().await.unwrap();
    client.disconnect().await.unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_environment_configures_binary() {
    let client = StdioClient::new(server_config(&[
        ("KVMCP_LOGGING__OUTPUT", "none"),
        ("KVMCP_NAME", "kv-from-env"),
        ("KVMCP_ENABLE_ALL_TOOLS", "false"),
    ]));
    client.connect().await.unwrap();

    let result = client.initialize().await.unwrap();
    assert_eq!(result.server_info.name, "kv-from-env");

    let err = client.call_tool("echo", text("x")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ToolNotFound);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_stdio_ignores_idle_deadline() {
    let client = StdioClient::new(server_config(&[
        ("KVMCP_LOGGING__OUTPUT", "none"),
        ("KVMCP_TRANSPORT__TIMEOUT", "1.0"),
    ]));
    client.connect().await.unwrap();
    client.initialize().await.unwrap();
    client.ping().await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;

    client.ping().await.unwrap();
    let result = client.call_tool("echo", text("still here")).await.unwrap();
    assert_eq!(result.content[0].as_text(), Some("still here"));
    client.disconnect().await.unwrap();
}
