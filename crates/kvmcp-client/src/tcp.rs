//! TCP client
//!
//! Dials `host:port` and exchanges JSON-RPC messages over the socket. Incoming
//! bytes may be newline-delimited or simply successive JSON values; every
//! outgoing message is followed by a newline.

use std::sync::Arc;

use async_trait::async_trait;
use kvmcp_protocol::types::{
    CallToolResult, GetPromptResult, InitializeResult, ListPromptsResult, ListResourcesResult,
    ListToolsResult, ReadResourceResult,
};
use kvmcp_protocol::{McpError, McpResult};
use serde_json::{Map, Value};
use tokio::net::TcpStream;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::connection::ClientCore;
use crate::state::BaseClient;

/// MCP client over a TCP connection
#[derive(Debug)]
pub struct TcpClient {
    core: Arc<ClientCore>,
}

impl TcpClient {
    /// Create a disconnected client; nothing is dialed until `connect`
    pub fn new(config: ClientConfig) -> Self {
        Self {
            core: ClientCore::new(config),
        }
    }

    async fn dial(&self) -> McpResult<TcpStream> {
        let address = self.core.config.address().ok_or_else(|| {
            McpError::connection_failed(format!(
                "client {} has no valid port configured",
                self.core.name()
            ))
        })?;
        let timeout = self.core.timeout();

        match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => {
                tracing::error!(client = %self.core.name(), %address, error = %e, "tcp dial failed");
                Err(
                    McpError::connection_failed(format!("failed to connect to {address}: {e}"))
                        .with_data(serde_json::json!({ "address": address })),
                )
            }
            Err(_) => {
                tracing::error!(client = %self.core.name(), %address, ?timeout, "tcp dial timed out");
                Err(McpError::connection_timeout(format!(
                    "timed out connecting to {address} after {timeout:?}"
                ))
                .with_data(serde_json::json!({ "address": address })))
            }
        }
    }
}

#[async_trait]
impl Client for TcpClient {
    fn base(&self) -> &BaseClient {
        &self.core.base
    }

    fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    async fn connect(&self) -> McpResult<()> {
        let _lifecycle = self.core.lifecycle.lock().await;
        if self.core.base.is_connected() {
            return Err(self.core.already_connected());
        }

        let stream = self.dial().await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(client = %self.core.name(), error = %e, "could not set TCP_NODELAY");
        }
        let peer = stream.peer_addr().ok();
        let (read, write) = stream.into_split();
        self.core.attach(Box::new(read), Box::new(write));

        tracing::info!(client = %self.core.name(), peer = ?peer, "connected over tcp");
        Ok(())
    }

    async fn disconnect(&self) -> McpResult<()> {
        let _lifecycle = self.core.lifecycle.lock().await;
        if let Some(session) = self.core.take_session() {
            session.close().await;
            tracing::info!(client = %self.core.name(), "disconnected");
        }
        self.core.base.set_connected(false);
        Ok(())
    }

    async fn initialize(&self) -> McpResult<InitializeResult> {
        self.core.initialize().await
    }

    async fn ping(&self) -> McpResult<()> {
        self.core.ping().await
    }

    async fn list_tools(&self, cursor: Option<String>) -> McpResult<ListToolsResult> {
        self.core.list_tools(cursor).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        self.core.call_tool(name, arguments).await
    }

    async fn list_prompts(&self, cursor: Option<String>) -> McpResult<ListPromptsResult> {
        self.core.list_prompts(cursor).await
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<GetPromptResult> {
        self.core.get_prompt(name, arguments).await
    }

    async fn list_resources(&self, cursor: Option<String>) -> McpResult<ListResourcesResult> {
        self.core.list_resources(cursor).await
    }

    async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        self.core.read_resource(uri).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmcp_protocol::ErrorCode;
    use std::time::Duration;

    #[tokio::test]
    async fn test_refused_dial_stays_disconnected() {
        // bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = TcpClient::new(
            ClientConfig::tcp("down", "127.0.0.1", port).with_timeout(Duration::from_secs(2)),
        );
        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err.code,
            ErrorCode::ConnectionFailed | ErrorCode::ConnectionTimeout
        ));
        assert!(err.message.contains(&format!("127.0.0.1:{port}")));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_missing_port() {
        let mut config = ClientConfig::tcp("noport", "127.0.0.1", 0);
        config.port = None;
        let client = TcpClient::new(config);
        let err = client.connect().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConnectionFailed);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_idempotent() {
        let client = TcpClient::new(ClientConfig::tcp("idle", "127.0.0.1", 9));
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }
}
