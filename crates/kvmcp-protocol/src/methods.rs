//! MCP method names and protocol constants.

/// JSON-RPC version carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision exchanged during `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Capability handshake request
pub const INITIALIZE: &str = "initialize";
/// Sent by the client once `initialize` has completed
pub const INITIALIZED: &str = "notifications/initialized";
/// Liveness probe
pub const PING: &str = "ping";

/// List the tools a server exposes
pub const TOOLS_LIST: &str = "tools/list";
/// Invoke a tool
pub const TOOLS_CALL: &str = "tools/call";

/// List the prompts a server exposes
pub const PROMPTS_LIST: &str = "prompts/list";
/// Render a prompt
pub const PROMPTS_GET: &str = "prompts/get";

/// List readable resources
pub const RESOURCES_LIST: &str = "resources/list";
/// Read one resource
pub const RESOURCES_READ: &str = "resources/read";
/// Subscribe to updates of a resource
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
/// Cancel a resource subscription
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

/// Adjust the server's log level
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// The resource list changed
pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
/// The tool list changed
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// The prompt list changed
pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

/// Returns true for methods in the `notifications/` family.
pub fn is_notification(method: &str) -> bool {
    method.starts_with("notifications/")
}
