//! Handler traits for tools, resources and prompts
//!
//! Hosts implement these to put their own functionality behind the router.
//! [`FnTool`] adapts an async closure for the common case.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use kvmcp_protocol::McpResult;
use kvmcp_protocol::types::{
    CallToolResult, GetPromptResult, Prompt, ReadResourceResult, Resource, Tool,
};
use serde_json::{Map, Value};

/// A tool the server executes itself
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Tool definition as advertised in `tools/list`
    fn tool_definition(&self) -> Tool;

    /// Run the tool.
    ///
    /// A tool that ran but failed should return a result with `is_error`
    /// set; an `Err` is reserved for calls that could not run at all.
    async fn call(&self, arguments: Map<String, Value>) -> McpResult<CallToolResult>;
}

/// A readable resource
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Resource definition as advertised in `resources/list`
    fn resource_definition(&self) -> Resource;

    /// Read the current contents
    async fn read(&self, uri: &str) -> McpResult<ReadResourceResult>;
}

/// A prompt template
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Prompt definition as advertised in `prompts/list`
    fn prompt_definition(&self) -> Prompt;

    /// Render the prompt; required arguments are checked beforehand
    async fn get(&self, arguments: Map<String, Value>) -> McpResult<GetPromptResult>;
}

type ToolFn = dyn Fn(Map<String, Value>) -> BoxFuture<'static, McpResult<CallToolResult>>
    + Send
    + Sync;

/// Tool backed by an async closure
///
/// ```rust
/// use kvmcp_protocol::types::{CallToolResult, Tool};
/// use kvmcp_server::FnTool;
///
/// let tool = FnTool::new(Tool::new("now"), |_args| async {
///     Ok(CallToolResult::text("12:00"))
/// });
/// ```
#[derive(Clone)]
pub struct FnTool {
    tool: Tool,
    handler: Arc<ToolFn>,
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool").field("tool", &self.tool.name).finish()
    }
}

impl FnTool {
    /// Wrap `handler` under the given definition
    pub fn new<F, Fut>(tool: Tool, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<CallToolResult>> + Send + 'static,
    {
        Self {
            tool,
            handler: Arc::new(move |args| Box::pin(handler(args)) as BoxFuture<'static, _>),
        }
    }
}

#[async_trait]
impl ToolHandler for FnTool {
    fn tool_definition(&self) -> Tool {
        self.tool.clone()
    }

    async fn call(&self, arguments: Map<String, Value>) -> McpResult<CallToolResult> {
        (self.handler)(arguments).await
    }
}

/// Built-in `echo` tool: returns its `text` argument
pub fn echo_tool() -> FnTool {
    let tool = Tool::new("echo")
        .with_description("Echo the text argument back")
        .with_input_schema(serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }));
    FnTool::new(tool, |args| async move {
        match args.get("text").and_then(Value::as_str) {
            Some(text) => Ok(CallToolResult::text(text)),
            None => Ok(CallToolResult::error_text("missing string argument: text")),
        }
    })
}
