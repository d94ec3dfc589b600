//! Unified MCP error handling.
//!
//! Every failure in kvmcp is an [`McpError`]: a numeric [`ErrorCode`], a
//! human-readable message and optional structured data. The code alone decides
//! how the error is classified, so [`is_retryable`] is a pure function of the
//! numeric value and gives the same answer whether the error was raised locally
//! or decoded from a peer's JSON-RPC error object.
//!
//! ## Code ranges
//!
//! | Range | Family |
//! |-------|--------|
//! | -32700, -32600..-32603 | JSON-RPC standard |
//! | -32000..-32002 | Connection (failed, timeout, closed) |
//! | -32010..-32012 | Protocol (mismatch, unsupported method, invalid response) |
//! | -32020..-32023 | Tool (not found, execution failed, timeout, invalid input) |
//! | -32030..-32032 | Resource (not found, access denied, timeout) |
//! | -32040..-32041 | Prompt (not found, invalid arguments) |
//!
//! ## Example
//!
//! ```rust
//! use kvmcp_protocol::error::{ErrorCode, McpError, is_retryable};
//!
//! let err = McpError::connection_timeout("ping timed out");
//! assert_eq!(err.code, ErrorCode::ConnectionTimeout);
//! assert!(err.is_retryable());
//! assert!(!is_retryable(ErrorCode::ToolNotFound.code()));
//! ```

use serde_json::Value;
use std::fmt;

use crate::jsonrpc::JsonRpcError;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Error classification keyed by JSON-RPC error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // === JSON-RPC Standard Errors ===
    /// Parse error (-32700)
    ParseError,
    /// Invalid request (-32600)
    InvalidRequest,
    /// Method not found (-32601)
    MethodNotFound,
    /// Invalid params (-32602)
    InvalidParams,
    /// Internal error (-32603)
    InternalError,

    // === Connection Errors ===
    /// Dial/spawn failure or write failure (-32000)
    ConnectionFailed,
    /// Request or dial deadline exceeded (-32001)
    ConnectionTimeout,
    /// Connection closed while the request was in flight (-32002)
    ConnectionClosed,

    // === Protocol Errors ===
    /// Peers disagree on the protocol version (-32010)
    ProtocolMismatch,
    /// Operation not supported by this client or transport (-32011)
    UnsupportedMethod,
    /// Peer sent a response that could not be decoded (-32012)
    InvalidResponse,

    // === Tool Errors ===
    /// Tool not found (-32020)
    ToolNotFound,
    /// Tool execution failed (-32021)
    ToolExecutionFailed,
    /// Tool execution timed out (-32022)
    ToolTimeout,
    /// Tool arguments rejected (-32023)
    InvalidToolInput,

    // === Resource Errors ===
    /// Resource not found (-32030)
    ResourceNotFound,
    /// Resource access denied (-32031)
    ResourceAccessDenied,
    /// Resource read timed out (-32032)
    ResourceTimeout,

    // === Prompt Errors ===
    /// Prompt not found (-32040)
    PromptNotFound,
    /// Prompt arguments rejected (-32041)
    InvalidPromptArgs,

    /// Any code outside the table, preserved as received
    Application(i32),
}

impl ErrorCode {
    /// Get the numeric JSON-RPC error code
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ConnectionFailed => -32000,
            Self::ConnectionTimeout => -32001,
            Self::ConnectionClosed => -32002,
            Self::ProtocolMismatch => -32010,
            Self::UnsupportedMethod => -32011,
            Self::InvalidResponse => -32012,
            Self::ToolNotFound => -32020,
            Self::ToolExecutionFailed => -32021,
            Self::ToolTimeout => -32022,
            Self::InvalidToolInput => -32023,
            Self::ResourceNotFound => -32030,
            Self::ResourceAccessDenied => -32031,
            Self::ResourceTimeout => -32032,
            Self::PromptNotFound => -32040,
            Self::InvalidPromptArgs => -32041,
            Self::Application(code) => code,
        }
    }

    /// Map a numeric code back to its classification
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32000 => Self::ConnectionFailed,
            -32001 => Self::ConnectionTimeout,
            -32002 => Self::ConnectionClosed,
            -32010 => Self::ProtocolMismatch,
            -32011 => Self::UnsupportedMethod,
            -32012 => Self::InvalidResponse,
            -32020 => Self::ToolNotFound,
            -32021 => Self::ToolExecutionFailed,
            -32022 => Self::ToolTimeout,
            -32023 => Self::InvalidToolInput,
            -32030 => Self::ResourceNotFound,
            -32031 => Self::ResourceAccessDenied,
            -32032 => Self::ResourceTimeout,
            -32040 => Self::PromptNotFound,
            -32041 => Self::InvalidPromptArgs,
            other => Self::Application(other),
        }
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Whether a failure with this numeric code is worth retrying.
///
/// Only transient conditions qualify: connection timeout, connection closed,
/// tool timeout and resource timeout.
#[must_use]
pub const fn is_retryable(code: i32) -> bool {
    matches!(
        ErrorCode::from_code(code),
        ErrorCode::ConnectionTimeout
            | ErrorCode::ConnectionClosed
            | ErrorCode::ToolTimeout
            | ErrorCode::ResourceTimeout
    )
}

/// Unified MCP error type
#[derive(Debug, Clone, PartialEq)]
pub struct McpError {
    /// Error classification
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional structured context
    pub data: Option<Value>,
}

impl McpError {
    /// Create a new error with code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Create a parse error
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// Create an invalid request error
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Create a method not found error
    #[must_use]
    pub fn method_not_found(method: impl AsRef<str>) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method.as_ref()),
        )
    }

    /// Create an invalid params error
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a connection failure carrying the target and cause
    #[must_use]
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionFailed, message)
    }

    /// Create a connection timeout error
    #[must_use]
    pub fn connection_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionTimeout, message)
    }

    /// Create a connection closed error
    #[must_use]
    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionClosed, message)
    }

    /// Create a protocol version mismatch error
    #[must_use]
    pub fn protocol_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        let expected = expected.into();
        let actual = actual.into();
        Self::new(
            ErrorCode::ProtocolMismatch,
            format!("protocol version mismatch: expected {expected}, got {actual}"),
        )
        .with_data(serde_json::json!({ "expected": expected, "actual": actual }))
    }

    /// Create an error for an operation a client variant does not provide
    #[must_use]
    pub fn not_implemented(operation: impl AsRef<str>) -> Self {
        Self::new(
            ErrorCode::UnsupportedMethod,
            format!("{} not implemented", operation.as_ref()),
        )
    }

    /// Create an invalid response error
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidResponse, message)
    }

    /// Create a tool not found error
    #[must_use]
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(ErrorCode::ToolNotFound, format!("tool not found: {tool}"))
            .with_data(serde_json::json!({ "tool": tool }))
    }

    /// Create a tool execution failed error
    #[must_use]
    pub fn tool_execution_failed(tool: impl Into<String>, reason: impl fmt::Display) -> Self {
        let tool = tool.into();
        Self::new(
            ErrorCode::ToolExecutionFailed,
            format!("tool execution failed: {tool}"),
        )
        .with_data(serde_json::json!({ "tool": tool, "error": reason.to_string() }))
    }

    /// Create a tool timeout error
    #[must_use]
    pub fn tool_timeout(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(ErrorCode::ToolTimeout, format!("tool timed out: {tool}"))
            .with_data(serde_json::json!({ "tool": tool }))
    }

    /// Create an invalid tool input error
    #[must_use]
    pub fn invalid_tool_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToolInput, message)
    }

    /// Create a resource not found error
    #[must_use]
    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("resource not found: {uri}"),
        )
        .with_data(serde_json::json!({ "uri": uri }))
    }

    /// Create a resource access denied error
    #[must_use]
    pub fn resource_access_denied(uri: impl Into<String>, reason: impl fmt::Display) -> Self {
        let uri = uri.into();
        Self::new(
            ErrorCode::ResourceAccessDenied,
            format!("access denied to '{uri}': {reason}"),
        )
        .with_data(serde_json::json!({ "uri": uri }))
    }

    /// Create a resource timeout error
    #[must_use]
    pub fn resource_timeout(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self::new(ErrorCode::ResourceTimeout, format!("resource timed out: {uri}"))
            .with_data(serde_json::json!({ "uri": uri }))
    }

    /// Create a prompt not found error
    #[must_use]
    pub fn prompt_not_found(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        Self::new(
            ErrorCode::PromptNotFound,
            format!("prompt not found: {prompt}"),
        )
        .with_data(serde_json::json!({ "prompt": prompt }))
    }

    /// Create an invalid prompt arguments error
    #[must_use]
    pub fn invalid_prompt_args(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPromptArgs, message)
    }

    /// Numeric JSON-RPC code
    #[must_use]
    pub const fn jsonrpc_code(&self) -> i32 {
        self.code.code()
    }

    /// Check if this error is retryable
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        is_retryable(self.code.code())
    }

    /// Check if this error is a timeout of any kind
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConnectionTimeout | ErrorCode::ToolTimeout | ErrorCode::ResourceTimeout
        )
    }

    /// Convert into the wire representation
    #[must_use]
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.code.code(),
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MCP error {}: {}", self.code.code(), self.message)?;
        if let Some(data) = &self.data {
            write!(f, " (data: {data})")?;
        }
        Ok(())
    }
}

impl std::error::Error for McpError {}

impl From<JsonRpcError> for McpError {
    fn from(error: JsonRpcError) -> Self {
        Self {
            code: ErrorCode::from_code(error.code),
            message: error.message,
            data: error.data,
        }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(error: McpError) -> Self {
        Self {
            code: error.code.code(),
            message: error.message,
            data: error.data,
        }
    }
}
