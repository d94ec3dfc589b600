//! # kvmcp Server
//!
//! Exposes locally registered tools, resources and prompts, plus tools proxied
//! from remote MCP servers, over stdio, TCP or a unix domain socket.
//!
//! ## Architecture
//!
//! ```text
//! TransportManager ── accept ──▶ connection task ──▶ Router ──┬─▶ ToolRegistry ──▶ ToolHandler
//!   (stdio/tcp/unix)              (JsonCodec frames)          ├─▶ RemoteProxy ──▶ kvmcp_client::Manager
//!                                                             ├─▶ ResourceRegistry
//!                                                             └─▶ PromptRegistry
//! ```
//!
//! Each connection is served by its own task: it decodes one message, routes
//! it, writes the reply (if any) and moves on to the next one. A malformed
//! message is answered with a parse error and does not end the connection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kvmcp_server::{Router, ServerConfig, TransportManager, handlers};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::builder().name("kv").tcp("127.0.0.1", 7070).build();
//! let router = Arc::new(Router::new(config.clone()));
//! router.register_tool(handlers::echo_tool())?;
//!
//! let transport = TransportManager::new(config.transport, router);
//! transport.start().await?;
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

pub mod config;
pub mod handlers;
pub mod logging;
pub mod prompts;
pub mod proxy;
pub mod registry;
pub mod resources;
pub mod router;
pub mod transport;

pub use config::{
    ConfigError, ConfigurationBuilder, LogOutput, LogRotation, LoggingConfig, ServerConfig,
    TransportConfig,
};
pub use handlers::{FnTool, PromptHandler, ResourceHandler, ToolHandler};
pub use logging::LoggingGuard;
pub use prompts::PromptRegistry;
pub use proxy::{ProxyError, RemoteProxy};
pub use registry::{RegistryError, ToolRegistry};
pub use resources::ResourceRegistry;
pub use router::Router;
pub use transport::{TransportError, TransportManager};

/// Server name reported in `initialize` unless configured otherwise
pub const SERVER_NAME: &str = "kvmcp-server";

/// Server version reported in `initialize` unless configured otherwise
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
