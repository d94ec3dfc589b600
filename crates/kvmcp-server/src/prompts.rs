//! Prompt registry

use std::collections::BTreeMap;
use std::sync::Arc;

use kvmcp_protocol::types::{GetPromptResult, Prompt};
use kvmcp_protocol::{McpError, McpResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::handlers::PromptHandler;
use crate::registry::RegistryError;

/// Prompts by name
#[derive(Default)]
pub struct PromptRegistry {
    handlers: RwLock<BTreeMap<String, Arc<dyn PromptHandler>>>,
}

impl std::fmt::Debug for PromptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRegistry")
            .field("prompts", &self.handlers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PromptRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt under its name.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicatePrompt`] if the name is taken.
    pub fn register(&self, handler: Arc<dyn PromptHandler>) -> Result<(), RegistryError> {
        let name = handler.prompt_definition().name;
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&name) {
            return Err(RegistryError::DuplicatePrompt(name));
        }
        tracing::debug!(prompt = %name, "registered prompt");
        handlers.insert(name, handler);
        Ok(())
    }

    /// Definitions ordered by name
    pub fn list(&self) -> Vec<Prompt> {
        self.handlers
            .read()
            .values()
            .map(|h| h.prompt_definition())
            .collect()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Render a prompt after checking its required arguments.
    ///
    /// # Errors
    ///
    /// `PromptNotFound` for unknown names, `InvalidPromptArgs` when a
    /// required argument is missing, otherwise whatever the handler returns.
    pub async fn get(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> McpResult<GetPromptResult> {
        let handler = self
            .handlers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::prompt_not_found(name))?;

        let definition = handler.prompt_definition();
        let missing: Vec<&str> = definition
            .arguments
            .iter()
            .filter(|a| a.required && !arguments.contains_key(&a.name))
            .map(|a| a.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(McpError::invalid_prompt_args(format!(
                "prompt {name} is missing required arguments: {}",
                missing.join(", ")
            )));
        }

        handler.get(arguments).await
    }
}
