//! Transport-independent half of a client
//!
//! [`ClientCore`] is what the stdio and TCP clients have in common: the
//! connection flags, the id counter, the current [`RpcSession`] and the typed
//! MCP operations built on top of it. A transport only has to produce a byte
//! stream and hand it to [`ClientCore::attach`].

use std::sync::atomic::AtomicI64;
use std::sync::{Arc, Weak};
use std::time::Duration;

use kvmcp_protocol::methods;
use kvmcp_protocol::types::{
    Capabilities, CallToolRequest, CallToolResult, ClientInfo, GetPromptRequest, GetPromptResult,
    InitializeRequest, InitializeResult, ListPromptsRequest, ListPromptsResult,
    ListResourcesRequest, ListResourcesResult, ListToolsRequest, ListToolsResult,
    ReadResourceRequest, ReadResourceResult,
};
use kvmcp_protocol::{McpError, McpResult, PROTOCOL_VERSION};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::session::{BoxedReader, BoxedWriter, RpcSession};
use crate::state::BaseClient;
use crate::{CLIENT_NAME, CLIENT_VERSION};

#[derive(Debug)]
pub(crate) struct ClientCore {
    pub(crate) base: BaseClient,
    pub(crate) config: ClientConfig,
    /// Serializes connect and disconnect
    pub(crate) lifecycle: tokio::sync::Mutex<()>,
    next_id: Arc<AtomicI64>,
    session: Mutex<Option<Arc<RpcSession>>>,
}

fn to_params<T: Serialize>(params: &T) -> McpResult<Option<Value>> {
    serde_json::to_value(params)
        .map(Some)
        .map_err(|e| McpError::internal(format!("failed to encode params: {e}")))
}

impl ClientCore {
    pub(crate) fn new(config: ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            base: BaseClient::new(config.name.clone()),
            config,
            lifecycle: tokio::sync::Mutex::new(()),
            next_id: Arc::new(AtomicI64::new(1)),
            session: Mutex::new(None),
        })
    }

    pub(crate) fn name(&self) -> &str {
        self.base.name()
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.config.request_timeout()
    }

    pub(crate) fn already_connected(&self) -> McpError {
        McpError::connection_failed(format!("client {} is already connected", self.name()))
    }

    /// Start a session over a freshly opened stream and mark the client
    /// connected. When the stream later dies on its own the client flips back
    /// to disconnected.
    pub(crate) fn attach(
        self: &Arc<Self>,
        reader: BoxedReader,
        writer: BoxedWriter,
    ) -> Arc<RpcSession> {
        let session = RpcSession::start(
            self.name(),
            reader,
            writer,
            Arc::clone(&self.next_id),
            self.timeout(),
        );

        {
            let mut slot = self.session.lock();
            *slot = Some(Arc::clone(&session));
            self.base.set_connected(true);
        }

        let core = Arc::downgrade(self);
        let watched = Arc::downgrade(&session);
        let closed = session.closed_token();
        tokio::spawn(async move {
            closed.cancelled().await;
            if let Some(core) = core.upgrade() {
                core.detach_if_current(&watched);
            }
        });

        session
    }

    fn detach_if_current(&self, session: &Weak<RpcSession>) {
        let mut slot = self.session.lock();
        let current = slot
            .as_ref()
            .is_some_and(|s| std::ptr::eq(Arc::as_ptr(s), session.as_ptr()));
        if current {
            *slot = None;
            self.base.set_connected(false);
            tracing::info!(client = %self.name(), "connection lost, client marked disconnected");
        }
    }

    /// Remove the current session; the caller is responsible for closing it.
    pub(crate) fn take_session(&self) -> Option<Arc<RpcSession>> {
        self.session.lock().take()
    }

    fn session(&self) -> McpResult<Arc<RpcSession>> {
        self.base.check_connected()?;
        let session = self
            .session
            .lock()
            .clone()
            .ok_or_else(|| McpError::connection_closed(format!("client {} has no open connection", self.name())))?;
        Ok(session)
    }

    fn initialized_session(&self) -> McpResult<Arc<RpcSession>> {
        let session = self.session()?;
        self.base.check_initialized()?;
        Ok(session)
    }

    /// Run the `initialize` handshake.
    ///
    /// The client only becomes initialized when the server speaks the same
    /// protocol revision and the `initialized` notification went out.
    pub(crate) async fn initialize(&self) -> McpResult<InitializeResult> {
        let session = self.session()?;
        let request = InitializeRequest {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities::default(),
            client_info: ClientInfo::new(CLIENT_NAME, CLIENT_VERSION),
        };

        let result: InitializeResult = session
            .request(methods::INITIALIZE, to_params(&request)?)
            .await?;

        if result.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                client = %self.name(),
                expected = PROTOCOL_VERSION,
                actual = %result.protocol_version,
                "server speaks a different protocol version"
            );
            return Err(McpError::protocol_mismatch(
                PROTOCOL_VERSION,
                result.protocol_version,
            ));
        }

        session.notify(methods::INITIALIZED, None).await?;

        self.base.set_server_info(Some(result.server_info.clone()));
        self.base.set_initialized(true);
        tracing::info!(
            client = %self.name(),
            server = %result.server_info.name,
            server_version = %result.server_info.version,
            "client initialized"
        );
        Ok(result)
    }

    pub(crate) async fn ping(&self) -> McpResult<()> {
        let session = self.session()?;
        let _: Value = session.request(methods::PING, None).await?;
        Ok(())
    }

    pub(crate) async fn list_tools(&self, cursor: Option<String>) -> McpResult<ListToolsResult> {
        let session = self.initialized_session()?;
        session
            .request(methods::TOOLS_LIST, to_params(&ListToolsRequest { cursor })?)
            .await
    }

    pub(crate) async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        let session = self.initialized_session()?;
        let request = CallToolRequest {
            name: name.to_string(),
            arguments,
        };
        session
            .request(methods::TOOLS_CALL, to_params(&request)?)
            .await
    }

    pub(crate) async fn list_prompts(
        &self,
        cursor: Option<String>,
    ) -> McpResult<ListPromptsResult> {
        let session = self.initialized_session()?;
        session
            .request(methods::PROMPTS_LIST, to_params(&ListPromptsRequest { cursor })?)
            .await
    }

    pub(crate) async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<GetPromptResult> {
        let session = self.initialized_session()?;
        let request = GetPromptRequest {
            name: name.to_string(),
            arguments,
        };
        session
            .request(methods::PROMPTS_GET, to_params(&request)?)
            .await
    }

    pub(crate) async fn list_resources(
        &self,
        cursor: Option<String>,
    ) -> McpResult<ListResourcesResult> {
        let session = self.initialized_session()?;
        session
            .request(
                methods::RESOURCES_LIST,
                to_params(&ListResourcesRequest { cursor })?,
            )
            .await
    }

    pub(crate) async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        let session = self.initialized_session()?;
        let request = ReadResourceRequest {
            uri: uri.to_string(),
        };
        session
            .request(methods::RESOURCES_READ, to_params(&request)?)
            .await
    }
}
