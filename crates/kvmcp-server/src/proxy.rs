//! Remote tool proxy
//!
//! Pulls `tools/list` from managed clients into the [`ToolRegistry`] under
//! the client's namespace and forwards `<client>.<tool>` calls back to the
//! owning client.

use std::sync::Arc;

use kvmcp_client::{Client, Manager};
use kvmcp_protocol::types::{CallToolResult, Tool};
use kvmcp_protocol::{ErrorCode, McpError};
use serde_json::{Map, Value};

use crate::registry::ToolRegistry;

/// Proxy operation errors
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The manager has no client with this name
    #[error("client {0} not found")]
    ClientNotFound(String),

    /// Tool sync needs a completed handshake
    #[error("client {0} is not connected or initialized")]
    NotReady(String),

    /// Forwarding needs an open connection
    #[error("client {0} is not connected")]
    NotConnected(String),

    /// Name is not of the form `<client>.<tool>`
    #[error("invalid tool name {0}: expected <client>.<tool>")]
    InvalidName(String),

    /// The remote call itself failed
    #[error("client {client}: {source}")]
    Client {
        /// Client name
        client: String,
        /// Failure reported by the client
        #[source]
        source: McpError,
    },

    /// Some clients failed during a bulk sync
    #[error("failed to sync tools for {}", joined_names(.failures))]
    Partial {
        /// Per-client failures
        failures: Vec<(String, ProxyError)>,
    },
}

impl From<ProxyError> for McpError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Client { source, .. } => source,
            ProxyError::InvalidName(name) => McpError::tool_not_found(name),
            ProxyError::ClientNotFound(_) | ProxyError::Partial { .. } => {
                McpError::new(ErrorCode::InternalError, err.to_string())
            }
            ProxyError::NotReady(_) | ProxyError::NotConnected(_) => {
                McpError::connection_closed(err.to_string())
            }
        }
    }
}

fn joined_names(failures: &[(String, ProxyError)]) -> String {
    failures
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split `<client>.<tool>` at the first dot; both halves must be non-empty
fn split_name(name: &str) -> Option<(&str, &str)> {
    name.split_once('.')
        .filter(|(client, tool)| !client.is_empty() && !tool.is_empty())
}

/// Bridges managed clients into a tool registry
#[derive(Debug, Clone)]
pub struct RemoteProxy {
    registry: Arc<ToolRegistry>,
    manager: Arc<Manager>,
}

impl RemoteProxy {
    /// Proxy over `manager`'s clients, registering into `registry`
    pub fn new(registry: Arc<ToolRegistry>, manager: Arc<Manager>) -> Self {
        Self { registry, manager }
    }

    /// The underlying client manager
    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    fn client(&self, name: &str) -> Result<Arc<dyn Client>, ProxyError> {
        self.manager
            .get_client(name)
            .ok_or_else(|| ProxyError::ClientNotFound(name.to_string()))
    }

    /// Fetch a client's tools and register the ones its filters allow.
    ///
    /// Returns the number of tools registered.
    ///
    /// # Errors
    ///
    /// `ClientNotFound`, `NotReady` unless the client is connected and
    /// initialized, or the `tools/list` failure.
    pub async fn sync_tools(&self, name: &str) -> Result<usize, ProxyError> {
        let client = self.client(name)?;
        if !client.is_connected() || !client.is_initialized() {
            return Err(ProxyError::NotReady(name.to_string()));
        }

        let listed = client
            .list_tools(None)
            .await
            .map_err(|source| ProxyError::Client {
                client: name.to_string(),
                source,
            })?;
        let tools: Vec<Tool> = listed
            .tools
            .into_iter()
            .filter(|t| client.config().is_tool_enabled(&t.name))
            .collect();

        self.registry.register_remote(name, &tools);
        tracing::info!(client = name, count = tools.len(), "synced remote tools");
        Ok(tools.len())
    }

    /// Sync every client that is connected and initialized.
    ///
    /// # Errors
    ///
    /// `Partial` listing every client whose sync failed; the others are
    /// still registered.
    pub async fn sync_all_tools(&self) -> Result<(), ProxyError> {
        let mut failures = Vec::new();
        for name in self.manager.list_clients() {
            let Some(client) = self.manager.get_client(&name) else {
                continue;
            };
            if !client.is_connected() || !client.is_initialized() {
                continue;
            }
            if let Err(e) = self.sync_tools(&name).await {
                tracing::warn!(client = %name, error = %e, "tool sync failed");
                failures.push((name, e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProxyError::Partial { failures })
        }
    }

    /// Drop a client's tools and sync them again
    ///
    /// # Errors
    ///
    /// Same as [`sync_tools`](Self::sync_tools).
    pub async fn refresh_tools(&self, name: &str) -> Result<usize, ProxyError> {
        // nothing registered yet is fine
        let _ = self.registry.unregister_remote(name);
        self.sync_tools(name).await
    }

    /// Forward a namespaced call to its client.
    ///
    /// # Errors
    ///
    /// `InvalidName`, `ClientNotFound`, `NotConnected`, or the remote
    /// failure.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, ProxyError> {
        let (client_name, tool) =
            split_name(name).ok_or_else(|| ProxyError::InvalidName(name.to_string()))?;
        let client = self.client(client_name)?;
        if !client.is_connected() {
            return Err(ProxyError::NotConnected(client_name.to_string()));
        }

        tracing::debug!(client = client_name, tool, "forwarding tool call");
        client
            .call_tool(tool, Some(arguments))
            .await
            .map_err(|source| ProxyError::Client {
                client: client_name.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kvmcp_client::{BaseClient, ClientConfig};
    use kvmcp_protocol::McpResult;
    use kvmcp_protocol::types::ListToolsResult;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Fake {
        base: BaseClient,
        config: ClientConfig,
    }

    impl Fake {
        fn new(name: &str, ready: bool, config: ClientConfig) -> Arc<dyn Client> {
            let base = BaseClient::new(name);
            if ready {
                base.set_connected(true);
                base.set_initialized(true);
            }
            Arc::new(Self { base, config })
        }
    }

    #[async_trait]
    impl Client for Fake {
        fn base(&self) -> &BaseClient {
            &self.base
        }

        fn config(&self) -> &ClientConfig {
            &self.config
        }

        async fn list_tools(&self, _cursor: Option<String>) -> McpResult<ListToolsResult> {
            Ok(ListToolsResult {
                tools: vec![Tool::new("get"), Tool::new("put"), Tool::new("drop")],
                next_cursor: None,
            })
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Option<Map<String, Value>>,
        ) -> McpResult<CallToolResult> {
            let count = arguments.map(|a| a.len()).unwrap_or_default();
            Ok(CallToolResult::text(format!("{}:{name}:{count}", self.name())))
        }
    }

    fn proxy() -> (RemoteProxy, Arc<ToolRegistry>) {
        let filtered = ClientConfig {
            disabled_tools: vec!["drop".into()],
            ..ClientConfig::default()
        };
        let manager = Manager::from_clients([
            Fake::new("kv", true, filtered),
            Fake::new("idle", false, ClientConfig::default()),
        ]);
        let registry = Arc::new(ToolRegistry::new());
        (RemoteProxy::new(Arc::clone(&registry), Arc::new(manager)), registry)
    }

    fn names(registry: &ToolRegistry) -> Vec<String> {
        registry.list_tools(None).into_iter().map(|t| t.name).collect()
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("kv.get"), Some(("kv", "get")));
        assert_eq!(split_name("kv.ns.get"), Some(("kv", "ns.get")));
        assert_eq!(split_name("kv."), None);
        assert_eq!(split_name(".get"), None);
        assert_eq!(split_name("get"), None);
    }

    #[tokio::test]
    async fn test_sync_honours_filters() {
        let (proxy, registry) = proxy();
        assert_eq!(proxy.sync_tools("kv").await.unwrap(), 2);
        assert_eq!(names(&registry), vec!["kv.get", "kv.put"]);

        assert!(matches!(
            proxy.sync_tools("idle").await,
            Err(ProxyError::NotReady(_))
        ));
        assert!(matches!(
            proxy.sync_tools("nope").await,
            Err(ProxyError::ClientNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_all_skips_unready() {
        let (proxy, registry) = proxy();
        proxy.sync_all_tools().await.unwrap();
        assert_eq!(registry.namespaces(), vec!["kv"]);

        assert_eq!(proxy.refresh_tools("kv").await.unwrap(), 2);
        assert_eq!(registry.count(), 2);
    }

    #[tokio::test]
    async fn test_execute_forwards() {
        let (proxy, _) = proxy();
        let mut args = Map::new();
        args.insert("key".into(), "a".into());
        let result = proxy.execute("kv.get", args).await.unwrap();
        assert_eq!(result.content[0].as_text(), Some("kv:get:1"));

        assert!(matches!(
            proxy.execute("kv", Map::new()).await,
            Err(ProxyError::InvalidName(_))
        ));
        assert!(matches!(
            proxy.execute("idle.get", Map::new()).await,
            Err(ProxyError::NotConnected(_))
        ));
        let err: McpError = proxy.execute("nope.get", Map::new()).await.unwrap_err().into();
        assert_eq!(err.code, ErrorCode::InternalError);
    }
}
