//! # kvmcp protocol
//!
//! Wire-level building blocks shared by the kvmcp client and server crates:
//!
//! - **JSON-RPC 2.0**: request, notification, response and error envelopes ([`jsonrpc`])
//! - **MCP messages**: initialize, tools, prompts, resources and logging shapes ([`types`])
//! - **Method names**: the fixed method-name table and protocol version ([`methods`])
//! - **Errors**: the numeric error taxonomy and retryability predicate ([`error`])
//! - **Framing**: a `tokio-util` codec that turns a byte stream into JSON values ([`codec`])
//!
//! ## Example
//!
//! ```rust
//! use kvmcp_protocol::jsonrpc::{JsonRpcRequest, RequestId};
//! use kvmcp_protocol::methods;
//!
//! let request = JsonRpcRequest::new(RequestId::Number(1), methods::PING, None);
//! let wire = serde_json::to_string(&request)?;
//! assert_eq!(wire, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
//! # Ok::<(), serde_json::Error>(())
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod types;

pub use codec::{CodecError, Frame, JsonCodec};
pub use error::{ErrorCode, McpError, McpResult, is_retryable};
pub use jsonrpc::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcVersion, RequestId,
};
pub use methods::{JSONRPC_VERSION, PROTOCOL_VERSION};
