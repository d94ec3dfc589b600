//! The `Client` capability trait and the transport factory

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kvmcp_protocol::types::{
    CallToolResult, GetPromptResult, InitializeResult, ListPromptsResult, ListResourcesResult,
    ListToolsResult, ReadResourceResult, ServerInfo,
};
use kvmcp_protocol::{McpError, McpResult};
use serde_json::{Map, Value};

use crate::config::{ClientConfig, ConfigError, TransportKind};
use crate::state::BaseClient;
use crate::stdio::StdioClient;
use crate::tcp::TcpClient;

/// An MCP client connection.
///
/// Implementors provide [`base`](Client::base) and [`config`](Client::config);
/// every lifecycle and protocol operation has a default that fails with
/// `UnsupportedMethod`, so a transport only overrides what it supports.
///
/// ```rust,no_run
/// use kvmcp_client::{Client, ClientConfig, create_client};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = create_client(ClientConfig::tcp("kv", "127.0.0.1", 7070))?;
/// client.connect().await?;
/// client.initialize().await?;
/// let tools = client.list_tools(None).await?;
/// println!("{} tools", tools.tools.len());
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Client: Send + Sync + fmt::Debug {
    /// Shared connection state
    fn base(&self) -> &BaseClient;

    /// Static configuration
    fn config(&self) -> &ClientConfig;

    /// Client name
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Whether a connection is open
    fn is_connected(&self) -> bool {
        self.base().is_connected()
    }

    /// Whether the handshake completed
    fn is_initialized(&self) -> bool {
        self.base().is_initialized()
    }

    /// Server identity from the handshake
    fn server_info(&self) -> Option<ServerInfo> {
        self.base().server_info()
    }

    /// Open the transport
    async fn connect(&self) -> McpResult<()> {
        Err(McpError::not_implemented("connect"))
    }

    /// Close the transport; succeeds when already closed
    async fn disconnect(&self) -> McpResult<()> {
        Err(McpError::not_implemented("disconnect"))
    }

    /// Run the `initialize` handshake
    async fn initialize(&self) -> McpResult<InitializeResult> {
        Err(McpError::not_implemented("initialize"))
    }

    /// Liveness probe
    async fn ping(&self) -> McpResult<()> {
        Err(McpError::not_implemented("ping"))
    }

    /// List the server's tools
    async fn list_tools(&self, _cursor: Option<String>) -> McpResult<ListToolsResult> {
        Err(McpError::not_implemented("list_tools"))
    }

    /// Invoke a tool
    async fn call_tool(
        &self,
        _name: &str,
        _arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        Err(McpError::not_implemented("call_tool"))
    }

    /// List the server's prompts
    async fn list_prompts(&self, _cursor: Option<String>) -> McpResult<ListPromptsResult> {
        Err(McpError::not_implemented("list_prompts"))
    }

    /// Render a prompt
    async fn get_prompt(
        &self,
        _name: &str,
        _arguments: Option<Map<String, Value>>,
    ) -> McpResult<GetPromptResult> {
        Err(McpError::not_implemented("get_prompt"))
    }

    /// List the server's resources
    async fn list_resources(&self, _cursor: Option<String>) -> McpResult<ListResourcesResult> {
        Err(McpError::not_implemented("list_resources"))
    }

    /// Read one resource
    async fn read_resource(&self, _uri: &str) -> McpResult<ReadResourceResult> {
        Err(McpError::not_implemented("read_resource"))
    }
}

/// Build the client variant for `config.transport`.
///
/// # Errors
///
/// [`ConfigError::UnsupportedTransport`] for transports without a client
/// implementation (`websocket`, `unix`).
pub fn create_client(config: ClientConfig) -> Result<Arc<dyn Client>, ConfigError> {
    match config.transport {
        TransportKind::Stdio => Ok(Arc::new(StdioClient::new(config))),
        TransportKind::Tcp => Ok(Arc::new(TcpClient::new(config))),
        kind @ (TransportKind::Websocket | TransportKind::Unix) => {
            Err(ConfigError::UnsupportedTransport(kind))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmcp_protocol::ErrorCode;

    #[derive(Debug)]
    struct Bare {
        base: BaseClient,
        config: ClientConfig,
    }

    impl Client for Bare {
        fn base(&self) -> &BaseClient {
            &self.base
        }

        fn config(&self) -> &ClientConfig {
            &self.config
        }
    }

    #[tokio::test]
    async fn test_defaults_are_not_implemented() {
        let client = Bare {
            base: BaseClient::new("bare"),
            config: ClientConfig::default(),
        };
        assert_eq!(client.name(), "bare");
        assert!(!client.is_connected());

        let err = client.connect().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedMethod);
        assert_eq!(err.message, "connect not implemented");
        assert!(client.disconnect().await.is_err());
        assert!(client.initialize().await.is_err());
        assert!(client.ping().await.is_err());
        assert!(client.list_tools(None).await.is_err());
        let err = client.call_tool("echo", None).await.unwrap_err();
        assert_eq!(err.message, "call_tool not implemented");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_factory_by_transport() {
        let client = create_client(ClientConfig::stdio("a", "true", Vec::<String>::new())).unwrap();
        assert_eq!(client.name(), "a");
        let client = create_client(ClientConfig::tcp("b", "localhost", 1)).unwrap();
        assert_eq!(client.config().port, Some(1));

        let config = ClientConfig {
            name: "c".into(),
            transport: TransportKind::Websocket,
            ..ClientConfig::default()
        };
        assert_eq!(
            create_client(config).unwrap_err(),
            ConfigError::UnsupportedTransport(TransportKind::Websocket)
        );
    }
}
