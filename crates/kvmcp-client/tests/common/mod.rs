//! Shared fake MCP server for client integration tests
//!
//! Listens on an ephemeral loopback port and answers the handful of methods
//! the client uses. Every request is answered from its own task, so a slow
//! call does not hold back faster ones. Two tool names are special: `slow`
//! is never answered and `hangup` closes the connection.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kvmcp_client::ClientConfig;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// How the fake server behaves
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Revision answered to `initialize`
    pub protocol_version: String,
    /// Never answer anything
    pub mute: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            protocol_version: kvmcp_protocol::PROTOCOL_VERSION.to_string(),
            mute: false,
        }
    }
}

/// Running fake server
pub struct FakeServer {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<Value>>>,
}

impl FakeServer {
    pub async fn start() -> Self {
        Self::with_behavior(Behavior::default()).await
    }

    pub async fn with_behavior(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let accepted = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, behavior.clone(), Arc::clone(&accepted)));
            }
        });

        Self { addr, seen }
    }

    /// Client configuration pointing at this server
    pub fn config(&self, name: &str) -> ClientConfig {
        ClientConfig::tcp(name, "127.0.0.1", self.addr.port())
    }

    /// Every message received so far, in arrival order
    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().clone()
    }

    /// Methods of the received messages
    pub fn seen_methods(&self) -> Vec<String> {
        self.seen()
            .iter()
            .filter_map(|m| m.get("method").and_then(Value::as_str).map(String::from))
            .collect()
    }
}

async fn serve(stream: TcpStream, behavior: Behavior, seen: Arc<Mutex<Vec<Value>>>) {
    let (read, mut write) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Option<Value>>();

    tokio::spawn(async move {
        while let Some(Some(message)) = rx.recv().await {
            let mut line = serde_json::to_vec(&message).unwrap();
            line.push(b'\n');
            if write.write_all(&line).await.is_err() {
                return;
            }
        }
        // a `None` or a closed channel hangs up
        let _ = write.shutdown().await;
    });

    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        seen.lock().push(message.clone());
        if behavior.mute {
            continue;
        }

        let Some(id) = message.get("id").cloned() else {
            continue;
        };
        let method = message["method"].as_str().unwrap_or_default().to_string();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        if params["name"] == "hangup" {
            let _ = tx.send(None);
            return;
        }

        let tx = tx.clone();
        let version = behavior.protocol_version.clone();
        tokio::spawn(async move {
            if let Some(reply) = respond(&method, &params, id, &version).await {
                let _ = tx.send(Some(reply));
            }
        });
    }
}

async fn respond(method: &str, params: &Value, id: Value, version: &str) -> Option<Value> {
    let reply = match method {
        "initialize" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": version,
                "serverInfo": { "name": "test-server", "version": "1.0.0" },
                "capabilities": { "tools": { "listChanged": true } }
            }
        }),
        // result deliberately omitted
        "ping" => json!({ "jsonrpc": "2.0", "id": id }),
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "tools": [{
                    "name": "echo",
                    "description": "Echo the text argument",
                    "inputSchema": {
                        "type": "object",
                        "properties": { "text": { "type": "string" } }
                    }
                }]
            }
        }),
        "tools/call" if params["name"] == "slow" => return None,
        "tools/call" => {
            let arguments = &params["arguments"];
            if let Some(delay) = arguments.get("delay_ms").and_then(Value::as_u64) {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let text = arguments
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or("success");
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{ "type": "text", "text": text }] }
            })
        }
        other => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": format!("method not found: {other}") }
        }),
    };
    Some(reply)
}

/// Arguments object for `tools/call`
pub fn args(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}
