//! Resource registry and subscriptions

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kvmcp_protocol::types::{ReadResourceResult, Resource};
use kvmcp_protocol::{McpError, McpResult};
use parking_lot::RwLock;

use crate::handlers::ResourceHandler;
use crate::registry::RegistryError;

/// Resources by URI, plus the set of subscribed URIs
#[derive(Default)]
pub struct ResourceRegistry {
    handlers: RwLock<BTreeMap<String, Arc<dyn ResourceHandler>>>,
    subscriptions: RwLock<BTreeSet<String>>,
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.handlers.read().keys().collect::<Vec<_>>())
            .field("subscriptions", &*self.subscriptions.read())
            .finish()
    }
}

impl ResourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under its URI.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateResource`] if the URI is taken.
    pub fn register(&self, handler: Arc<dyn ResourceHandler>) -> Result<(), RegistryError> {
        let uri = handler.resource_definition().uri;
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&uri) {
            return Err(RegistryError::DuplicateResource(uri));
        }
        tracing::debug!(%uri, "registered resource");
        handlers.insert(uri, handler);
        Ok(())
    }

    /// Definitions ordered by URI
    pub fn list(&self) -> Vec<Resource> {
        self.handlers
            .read()
            .values()
            .map(|h| h.resource_definition())
            .collect()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    fn handler(&self, uri: &str) -> McpResult<Arc<dyn ResourceHandler>> {
        self.handlers
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| McpError::resource_not_found(uri))
    }

    /// Read a resource.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for unknown URIs, otherwise whatever the handler
    /// returns.
    pub async fn read(&self, uri: &str) -> McpResult<ReadResourceResult> {
        self.handler(uri)?.read(uri).await
    }

    /// Record interest in change notifications for `uri`.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for unknown URIs.
    pub fn subscribe(&self, uri: &str) -> McpResult<()> {
        self.handler(uri)?;
        self.subscriptions.write().insert(uri.to_string());
        Ok(())
    }

    /// Drop interest in `uri`; unknown or unsubscribed URIs are fine
    pub fn unsubscribe(&self, uri: &str) {
        self.subscriptions.write().remove(uri);
    }

    /// Whether `uri` has a subscription
    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.read().contains(uri)
    }
}
