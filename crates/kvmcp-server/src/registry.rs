//! Namespaced tool registry
//!
//! Local tools live under `local.<name>`; tools pulled from a remote client
//! live under `<client>.<tool>`. Only local tools are executed here, remote
//! ones go through [`RemoteProxy`](crate::RemoteProxy).

use std::collections::BTreeMap;
use std::sync::Arc;

use kvmcp_protocol::types::{CallToolResult, Tool};
use kvmcp_protocol::{McpError, McpResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::handlers::ToolHandler;

/// Namespace of locally registered tools
pub const LOCAL_NAMESPACE: &str = "local";

/// Errors from the tool, resource and prompt registries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A local tool with this namespaced name exists
    #[error("tool {0} already registered")]
    AlreadyRegistered(String),

    /// No tools registered for this client
    #[error("client {0} not found")]
    ClientNotFound(String),

    /// A resource with this URI exists
    #[error("resource {0} already registered")]
    DuplicateResource(String),

    /// A prompt with this name exists
    #[error("prompt {0} already registered")]
    DuplicatePrompt(String),
}

struct LocalTool {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
}

#[derive(Default)]
struct Inner {
    local: BTreeMap<String, LocalTool>,
    remote: BTreeMap<String, Vec<Tool>>,
}

/// Local and remote tools by namespaced name
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ToolRegistry")
            .field("local", &inner.local.keys().collect::<Vec<_>>())
            .field("remote", &inner.remote.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn namespaced(namespace: &str, tool: &Tool) -> Tool {
    Tool {
        name: format!("{namespace}.{}", tool.name),
        ..tool.clone()
    }
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local tool as `local.<name>`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] if the name is taken.
    pub fn register_local(&self, handler: Arc<dyn ToolHandler>) -> Result<String, RegistryError> {
        let tool = namespaced(LOCAL_NAMESPACE, &handler.tool_definition());
        let name = tool.name.clone();

        let mut inner = self.inner.write();
        if inner.local.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        inner.local.insert(name.clone(), LocalTool { tool, handler });
        tracing::debug!(tool = %name, "registered local tool");
        Ok(name)
    }

    /// Set the tools of a remote client, replacing any earlier set
    pub fn register_remote(&self, client: &str, tools: &[Tool]) {
        let tools: Vec<Tool> = tools.iter().map(|t| namespaced(client, t)).collect();
        tracing::debug!(client, count = tools.len(), "registered remote tools");
        self.inner.write().remote.insert(client.to_string(), tools);
    }

    /// Drop every tool of a remote client.
    ///
    /// # Errors
    ///
    /// [`RegistryError::ClientNotFound`] if nothing was registered for it.
    pub fn unregister_remote(&self, client: &str) -> Result<(), RegistryError> {
        self.inner
            .write()
            .remote
            .remove(client)
            .map(|_| ())
            .ok_or_else(|| RegistryError::ClientNotFound(client.to_string()))
    }

    /// Tools in one namespace, or all of them for `None`.
    ///
    /// Local tools come first, then remote tools ordered by client name.
    pub fn list_tools(&self, namespace: Option<&str>) -> Vec<Tool> {
        let inner = self.inner.read();
        let local = inner.local.values().map(|t| t.tool.clone());
        match namespace {
            None => local
                .chain(inner.remote.values().flatten().cloned())
                .collect(),
            Some(LOCAL_NAMESPACE) => local.collect(),
            Some(client) => inner.remote.get(client).cloned().unwrap_or_default(),
        }
    }

    /// Look up a tool by namespaced name
    pub fn get_tool(&self, name: &str) -> Option<Tool> {
        let inner = self.inner.read();
        if let Some(local) = inner.local.get(name) {
            return Some(local.tool.clone());
        }
        let (client, _) = name.split_once('.')?;
        inner
            .remote
            .get(client)?
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    /// Whether `name` is a registered local tool
    pub fn is_local(&self, name: &str) -> bool {
        self.inner.read().local.contains_key(name)
    }

    /// Run a local tool.
    ///
    /// # Errors
    ///
    /// `ToolNotFound` unless `name` is a registered local tool, otherwise
    /// whatever the handler returns.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> McpResult<CallToolResult> {
        let handler = self
            .inner
            .read()
            .local
            .get(name)
            .map(|t| Arc::clone(&t.handler))
            .ok_or_else(|| McpError::tool_not_found(name))?;
        handler.call(arguments).await
    }

    /// Total number of tools
    pub fn count(&self) -> usize {
        let inner = self.inner.read();
        inner.local.len() + inner.remote.values().map(Vec::len).sum::<usize>()
    }

    /// `local` (when any local tool exists) followed by client names
    pub fn namespaces(&self) -> Vec<String> {
        let inner = self.inner.read();
        let local = (!inner.local.is_empty()).then(|| LOCAL_NAMESPACE.to_string());
        local.into_iter().chain(inner.remote.keys().cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{FnTool, echo_tool};
    use kvmcp_protocol::ErrorCode;
    use pretty_assertions::assert_eq;

    fn names(tools: &[Tool]) -> Vec<&str> {
        tools.iter().map(|t| t.name.as_str()).collect()
    }

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register_local(Arc::new(echo_tool())).unwrap();
        registry.register_remote("files", &[Tool::new("read"), Tool::new("write")]);
        registry.register_remote("kv", &[Tool::new("get")]);
        registry
    }

    #[test]
    fn test_namespacing() {
        let registry = registry();
        assert_eq!(
            names(&registry.list_tools(None)),
            vec!["local.echo", "files.read", "files.write", "kv.get"]
        );
        assert_eq!(names(&registry.list_tools(Some("local"))), vec!["local.echo"]);
        assert_eq!(names(&registry.list_tools(Some("kv"))), vec!["kv.get"]);
        assert!(registry.list_tools(Some("nope")).is_empty());
        assert_eq!(registry.count(), 4);
        assert_eq!(registry.namespaces(), vec!["local", "files", "kv"]);
    }

    #[test]
    fn test_duplicate_local_rejected() {
        let registry = registry();
        let err = registry.register_local(Arc::new(echo_tool())).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered("local.echo".into()));
    }

    #[test]
    fn test_remote_replace_and_unregister() {
        let registry = registry();
        registry.register_remote("files", &[Tool::new("stat")]);
        assert_eq!(names(&registry.list_tools(Some("files"))), vec!["files.stat"]);
        assert!(registry.get_tool("files.read").is_none());
        assert_eq!(registry.get_tool("files.stat").unwrap().name, "files.stat");

        registry.unregister_remote("files").unwrap();
        assert_eq!(
            registry.unregister_remote("files").unwrap_err(),
            RegistryError::ClientNotFound("files".into())
        );
        assert_eq!(registry.namespaces(), vec!["local", "kv"]);
    }

    #[test]
    fn test_get_tool() {
        let registry = registry();
        assert!(registry.get_tool("local.echo").is_some());
        assert!(registry.get_tool("echo").is_none());
        assert!(registry.get_tool("kv.put").is_none());
        assert!(registry.is_local("local.echo"));
        assert!(!registry.is_local("kv.get"));
    }

    #[tokio::test]
    async fn test_execute_local_only() {
        let registry = registry();
        let upper = FnTool::new(Tool::new("upper"), |args| async move {
            let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
            Ok(CallToolResult::text(text.to_uppercase()))
        });
        registry.register_local(Arc::new(upper)).unwrap();

        let mut args = Map::new();
        args.insert("text".into(), "abc".into());
        let result = registry.execute("local.upper", args).await.unwrap();
        assert_eq!(result.content[0].as_text(), Some("ABC"));

        let err = registry.execute("kv.get", Map::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolNotFound);
    }
}
