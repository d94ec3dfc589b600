//! # kvmcp Client
//!
//! Outbound MCP connections to external tool servers over a child process
//! (stdio) or a TCP socket, plus a [`Manager`] that runs many of them.
//!
//! ## Architecture
//!
//! ```text
//! Manager ──▶ Arc<dyn Client> ──▶ StdioClient / TcpClient
//!                                      │
//!                                      ▼
//!                               RpcSession (per connection)
//!                      writer lock ─┬─ pending table ─┬─ reader task
//!                                   ▼                 ▼
//!                              request(id) ◀──── response(id)
//! ```
//!
//! Every request gets a fresh integer id from a per-client counter. The caller
//! registers a one-shot waiter before writing, then waits for the response,
//! the configured deadline, or the connection closing, whichever happens
//! first. Responses are matched by id only, so they may arrive in any order.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kvmcp_client::{Client, ClientConfig, StdioClient};
//!
//! # async fn example() -> kvmcp_protocol::McpResult<()> {
//! let client = StdioClient::new(ClientConfig::stdio("kv", "kvmcp-server", Vec::<String>::new()));
//! client.connect().await?;
//! let init = client.initialize().await?;
//! println!("connected to {} {}", init.server_info.name, init.server_info.version);
//!
//! let mut args = serde_json::Map::new();
//! args.insert("text".into(), "hello".into());
//! let result = client.call_tool("echo", Some(args)).await?;
//! println!("{:?}", result.content);
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

mod client;
pub mod config;
mod connection;
pub mod manager;
mod pending;
mod session;
mod state;
mod stdio;
mod tcp;

pub use client::{Client, create_client};
pub use config::{BackoffStrategy, ClientConfig, ConfigError, RetryConfig, TransportKind};
pub use manager::{ClientState, ClientStatus, Manager, ManagerError};
pub use state::BaseClient;
pub use stdio::StdioClient;
pub use tcp::TcpClient;

/// Client name sent in `initialize`
pub const CLIENT_NAME: &str = "kvmcp";

/// Client version sent in `initialize`
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
