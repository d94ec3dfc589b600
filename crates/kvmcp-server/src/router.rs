//! JSON-RPC request routing
//!
//! Maps decoded messages onto the tool, resource and prompt registries.
//!
//! - Notifications (messages without `id`) never produce a response
//! - Handler failures become JSON-RPC errors carrying the `McpError` code
//! - `initialize` advertises only the capabilities that have something
//!   registered behind them; `logging` is always advertised

use std::sync::Arc;

use kvmcp_client::Manager;
use kvmcp_protocol::jsonrpc::IncomingMessage;
use kvmcp_protocol::methods;
use kvmcp_protocol::types::{
    CallToolRequest, CallToolResult, Capabilities, EmptyResult, GetPromptRequest,
    InitializeRequest, InitializeResult, ListPromptsRequest, ListPromptsResult,
    ListResourcesRequest, ListResourcesResult, ListToolsRequest, ListToolsResult, LogLevel,
    LoggingCapability, PromptsCapability, ReadResourceRequest, ResourcesCapability,
    ServerInfo, SetLevelRequest, SubscribeRequest, ToolsCapability, UnsubscribeRequest,
};
use kvmcp_protocol::{JsonRpcResponse, McpError, McpResult, PROTOCOL_VERSION, RequestId};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::ServerConfig;
use crate::handlers::{PromptHandler, ResourceHandler, ToolHandler};
use crate::prompts::PromptRegistry;
use crate::proxy::RemoteProxy;
use crate::registry::{LOCAL_NAMESPACE, RegistryError, ToolRegistry};
use crate::resources::ResourceRegistry;

/// Routes requests to registered handlers
#[derive(Debug)]
pub struct Router {
    config: ServerConfig,
    tools: Arc<ToolRegistry>,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
    proxy: Option<RemoteProxy>,
    log_level: RwLock<Option<LogLevel>>,
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(|e| McpError::invalid_params(e.to_string()))
}

fn parse_optional_params<T: DeserializeOwned + Default>(params: Option<Value>) -> McpResult<T> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(params) => {
            serde_json::from_value(params).map_err(|e| McpError::invalid_params(e.to_string()))
        }
    }
}

fn to_value<T: Serialize>(result: T) -> McpResult<Value> {
    serde_json::to_value(result).map_err(|e| McpError::internal(e.to_string()))
}

impl Router {
    /// Router with local handlers only
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            tools: Arc::new(ToolRegistry::new()),
            resources: ResourceRegistry::new(),
            prompts: PromptRegistry::new(),
            proxy: None,
            log_level: RwLock::new(None),
        }
    }

    /// Router that also forwards `<client>.<tool>` calls to `manager`
    pub fn with_proxy(config: ServerConfig, manager: Arc<Manager>) -> Self {
        let mut router = Self::new(config);
        router.proxy = Some(RemoteProxy::new(Arc::clone(&router.tools), manager));
        router
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared tool registry
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Resource registry
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Prompt registry
    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    /// Remote proxy, when built with [`with_proxy`](Self::with_proxy)
    pub fn proxy(&self) -> Option<&RemoteProxy> {
        self.proxy.as_ref()
    }

    /// Level last set through `logging/setLevel`
    pub fn log_level(&self) -> Option<LogLevel> {
        *self.log_level.read()
    }

    /// Register a local tool unless the configuration disables it.
    ///
    /// Returns the namespaced name, or `None` when the tool was filtered out.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] for duplicate names.
    pub fn register_tool<T>(&self, tool: T) -> Result<Option<String>, RegistryError>
    where
        T: ToolHandler + 'static,
    {
        let name = tool.tool_definition().name;
        if !self.config.is_tool_enabled(&name) {
            tracing::debug!(tool = %name, "tool disabled by configuration");
            return Ok(None);
        }
        self.tools.register_local(Arc::new(tool)).map(Some)
    }

    /// Register a resource; a no-op when resources are disabled.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateResource`] for duplicate URIs.
    pub fn register_resource<R>(&self, resource: R) -> Result<(), RegistryError>
    where
        R: ResourceHandler + 'static,
    {
        if !self.config.enable_resources {
            tracing::debug!("resources disabled by configuration");
            return Ok(());
        }
        self.resources.register(Arc::new(resource))
    }

    /// Register a prompt.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicatePrompt`] for duplicate names.
    pub fn register_prompt<P>(&self, prompt: P) -> Result<(), RegistryError>
    where
        P: PromptHandler + 'static,
    {
        self.prompts.register(Arc::new(prompt))
    }

    /// Route a raw JSON value.
    ///
    /// Values that are not a valid request or notification are answered
    /// with `-32600`, echoing the id when one can be recovered.
    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let id = value
            .get("id")
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
        match serde_json::from_value::<IncomingMessage>(value) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                tracing::warn!(error = %e, "invalid request");
                Some(JsonRpcResponse::error(
                    id,
                    McpError::invalid_request(e.to_string()),
                ))
            }
        }
    }

    /// Route one message; notifications return `None`
    pub async fn handle(&self, message: IncomingMessage) -> Option<JsonRpcResponse> {
        let IncomingMessage {
            id, method, params, ..
        } = message;

        let Some(id) = id else {
            tracing::debug!(%method, "notification");
            return None;
        };

        tracing::debug!(%method, ?id, "routing request");
        let response = match self.dispatch(&method, params).await {
            Ok(result) => JsonRpcResponse::success(Some(id), result),
            Err(err) => {
                tracing::debug!(%method, code = err.jsonrpc_code(), error = %err, "request failed");
                JsonRpcResponse::error(Some(id), err)
            }
        };
        Some(response)
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        match method {
            methods::INITIALIZE => {
                let request: InitializeRequest = parse_params(params)?;
                if request.protocol_version != PROTOCOL_VERSION {
                    tracing::warn!(
                        requested = %request.protocol_version,
                        supported = PROTOCOL_VERSION,
                        "client requested a different protocol version"
                    );
                }
                tracing::info!(
                    client = %request.client_info.name,
                    version = %request.client_info.version,
                    "client initialized"
                );
                to_value(self.initialize_result())
            }
            methods::PING => to_value(EmptyResult {}),

            methods::TOOLS_LIST => {
                let _: ListToolsRequest = parse_optional_params(params)?;
                to_value(ListToolsResult {
                    tools: self.tools.list_tools(None),
                    next_cursor: None,
                })
            }
            methods::TOOLS_CALL => {
                let request: CallToolRequest = parse_params(params)?;
                let result = self
                    .call_tool(&request.name, request.arguments.unwrap_or_default())
                    .await?;
                to_value(result)
            }

            methods::RESOURCES_LIST => {
                let _: ListResourcesRequest = parse_optional_params(params)?;
                to_value(ListResourcesResult {
                    resources: self.resources.list(),
                    next_cursor: None,
                })
            }
            methods::RESOURCES_READ => {
                let request: ReadResourceRequest = parse_params(params)?;
                to_value(self.resources.read(&request.uri).await?)
            }
            methods::RESOURCES_SUBSCRIBE => {
                let request: SubscribeRequest = parse_params(params)?;
                self.resources.subscribe(&request.uri)?;
                to_value(EmptyResult {})
            }
            methods::RESOURCES_UNSUBSCRIBE => {
                let request: UnsubscribeRequest = parse_params(params)?;
                self.resources.unsubscribe(&request.uri);
                to_value(EmptyResult {})
            }

            methods::PROMPTS_LIST => {
                let _: ListPromptsRequest = parse_optional_params(params)?;
                to_value(ListPromptsResult {
                    prompts: self.prompts.list(),
                    next_cursor: None,
                })
            }
            methods::PROMPTS_GET => {
                let request: GetPromptRequest = parse_params(params)?;
                let result = self
                    .prompts
                    .get(&request.name, request.arguments.unwrap_or_default())
                    .await?;
                to_value(result)
            }

            methods::LOGGING_SET_LEVEL => {
                let request: SetLevelRequest = parse_params(params)?;
                tracing::info!(level = request.level.as_filter(), "log level changed");
                *self.log_level.write() = Some(request.level);
                to_value(EmptyResult {})
            }

            _ => Err(McpError::method_not_found(method)),
        }
    }

    /// Resolve and run a tool.
    ///
    /// Lookup order: exact local name, `local.<name>`, then a remote tool
    /// through the proxy.
    ///
    /// # Errors
    ///
    /// `ToolNotFound` when nothing matches, otherwise the handler or remote
    /// failure.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> McpResult<CallToolResult> {
        if self.tools.is_local(name) {
            return self.tools.execute(name, arguments).await;
        }
        let local = format!("{LOCAL_NAMESPACE}.{name}");
        if self.tools.is_local(&local) {
            return self.tools.execute(&local, arguments).await;
        }
        match &self.proxy {
            Some(proxy) if self.tools.get_tool(name).is_some() => {
                Ok(proxy.execute(name, arguments).await?)
            }
            _ => Err(McpError::tool_not_found(name)),
        }
    }

    /// Result of `initialize`
    pub fn initialize_result(&self) -> InitializeResult {
        let capabilities = Capabilities {
            tools: (self.tools.count() > 0 || self.proxy.is_some()).then(|| ToolsCapability {
                list_changed: self.proxy.is_some(),
            }),
            prompts: (!self.prompts.is_empty()).then(PromptsCapability::default),
            resources: (!self.resources.is_empty()).then(|| ResourcesCapability {
                subscribe: true,
                list_changed: false,
            }),
            logging: Some(LoggingCapability::default()),
            completion: None,
        };
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            server_info: ServerInfo::new(&self.config.name, &self.config.version),
            instructions: self.config.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{FnTool, echo_tool};
    use kvmcp_protocol::ErrorCode;
    use kvmcp_protocol::types::Tool;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn router() -> Router {
        let config = ServerConfig::builder()
            .name("test-server")
            .version("1.0.0")
            .disabled_tools(["secret"])
            .build();
        let router = Router::new(config);
        router.register_tool(echo_tool()).unwrap();
        let secret = FnTool::new(Tool::new("secret"), |_| async {
            Ok(CallToolResult::text("hidden"))
        });
        assert_eq!(router.register_tool(secret).unwrap(), None);
        router
    }

    async fn request(router: &Router, method: &str, params: Value) -> Value {
        let response = router
            .handle_value(json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
            .await
            .unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let router = router();
        let response = request(
            &router,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "kvmcp", "version": "0.1.0"}
            }),
        )
        .await;
        assert_eq!(
            response["result"],
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}, "logging": {}},
                "serverInfo": {"name": "test-server", "version": "1.0.0"}
            })
        );

        let response = request(&router, "initialize", json!({})).await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_tools() {
        let router = router();
        let response = request(&router, "tools/list", Value::Null).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "local.echo");

        for name in ["echo", "local.echo"] {
            let response = request(
                &router,
                "tools/call",
                json!({"name": name, "arguments": {"text": "hi"}}),
            )
            .await;
            assert_eq!(response["result"]["content"][0]["text"], "hi");
        }

        let response = request(&router, "tools/call", json!({"name": "secret"})).await;
        assert_eq!(response["error"]["code"], ErrorCode::ToolNotFound.code());
    }

    #[tokio::test]
    async fn test_ping_and_unknown_method() {
        let router = router();
        let response = request(&router, "ping", Value::Null).await;
        assert_eq!(response["result"], json!({}));
        assert_eq!(response["id"], 1);

        let response = request(&router, "sampling/createMessage", json!({})).await;
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_notifications_have_no_reply() {
        let router = router();
        let reply = router
            .handle_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(reply.is_none());
        let reply = router
            .handle_value(json!({"jsonrpc": "2.0", "method": "tools/list"}))
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_echoes_id() {
        let router = router();
        let response = router
            .handle_value(json!({"jsonrpc": "2.0", "id": "abc"}))
            .await
            .unwrap();
        let response = serde_json::to_value(response).unwrap();
        assert_eq!(response["id"], "abc");
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_set_level() {
        let router = router();
        assert_eq!(router.log_level(), None);
        let response = request(&router, "logging/setLevel", json!({"level": "warning"})).await;
        assert_eq!(response["result"], json!({}));
        assert_eq!(router.log_level(), Some(LogLevel::Warning));

        let response = request(&router, "logging/setLevel", json!({"level": "loud"})).await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_empty_resources_and_prompts() {
        let router = router();
        let response = request(&router, "resources/list", json!({})).await;
        assert_eq!(response["result"], json!({"resources": []}));
        let response = request(&router, "resources/read", json!({"uri": "kv://x"})).await;
        assert_eq!(response["error"]["code"], ErrorCode::ResourceNotFound.code());
        let response = request(&router, "prompts/get", json!({"name": "p"})).await;
        assert_eq!(response["error"]["code"], ErrorCode::PromptNotFound.code());
    }
}
