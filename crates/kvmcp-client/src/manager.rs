//! Multi-client manager
//!
//! Owns one [`Client`] per configured endpoint and coordinates their
//! lifecycles:
//!
//! - **Start**: connect, then run the `initialize` handshake; a failed
//!   handshake disconnects again so no half-open client is left behind
//! - **Bulk operations**: `start_all`/`stop_all` run one task per client and
//!   collect every failure without aborting the others
//! - **Observability**: status snapshots and ping-based health checks never
//!   fail; problems are reported as data
//!
//! # Examples
//!
//! ```rust,no_run
//! use kvmcp_client::{ClientConfig, Manager};
//!
//! # async fn example() -> Result<(), kvmcp_client::ManagerError> {
//! let manager = Manager::new([
//!     ("kv".to_string(), ClientConfig::tcp("", "127.0.0.1", 7070)),
//!     ("files".to_string(), ClientConfig::stdio("", "files-mcp", ["--stdio"])),
//! ]);
//! manager.start_all().await?;
//! for (name, healthy) in manager.health_check_all().await {
//!     println!("{name}: {healthy}");
//! }
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use kvmcp_protocol::types::ServerInfo;
use kvmcp_protocol::{ErrorCode, McpError};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::client::{Client, create_client};
use crate::config::ClientConfig;

/// Manager operation errors
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// No client with this name
    #[error("client {0} not found")]
    NotFound(String),

    /// `start_client` on a client that is already connected
    #[error("client {0} is already connected")]
    AlreadyConnected(String),

    /// Transport connection failed
    #[error("failed to connect client {name}: {source}")]
    Connect {
        /// Client name
        name: String,
        /// Underlying failure
        #[source]
        source: McpError,
    },

    /// Handshake failed; the client was disconnected again
    #[error("failed to initialize client {name}: {source}")]
    Initialize {
        /// Client name
        name: String,
        /// Underlying failure
        #[source]
        source: McpError,
    },

    /// Disconnect failed
    #[error("failed to stop client {name}: {source}")]
    Stop {
        /// Client name
        name: String,
        /// Underlying failure
        #[source]
        source: McpError,
    },

    /// Some clients of a bulk operation failed
    #[error("failed to {operation} some clients: {}", FailureList(.failures))]
    Partial {
        /// `start` or `stop`
        operation: &'static str,
        /// Failed client names with their errors, sorted by name
        failures: Vec<(String, ManagerError)>,
    },
}

struct FailureList<'a>(&'a [(String, ManagerError)]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, error)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{name}: {error}")?;
        }
        Ok(())
    }
}

impl ManagerError {
    /// Names of the clients a bulk operation failed for
    pub fn failed_clients(&self) -> Vec<&str> {
        match self {
            Self::Partial { failures, .. } => failures.iter().map(|(n, _)| n.as_str()).collect(),
            Self::NotFound(name) | Self::AlreadyConnected(name) => vec![name.as_str()],
            Self::Connect { name, .. } | Self::Initialize { name, .. } | Self::Stop { name, .. } => {
                vec![name.as_str()]
            }
        }
    }

    /// Underlying protocol error, when there is one
    pub fn mcp_error(&self) -> Option<&McpError> {
        match self {
            Self::Connect { source, .. }
            | Self::Initialize { source, .. }
            | Self::Stop { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether another attempt could succeed
    fn is_transient(&self) -> bool {
        self.mcp_error().is_some_and(|e| {
            e.is_retryable() || e.code == ErrorCode::ConnectionFailed
        })
    }
}

/// Coarse client state for status reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// Transport open
    Connected,
    /// Transport closed
    Disconnected,
    /// No client with the requested name
    NotFound,
}

/// Snapshot of one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    /// Client name
    pub name: String,
    /// Coarse state
    pub state: ClientState,
    /// Transport open
    pub connected: bool,
    /// Handshake completed
    pub initialized: bool,
    /// Server identity, when connected and initialized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Owns and coordinates named clients
#[derive(Debug, Default)]
pub struct Manager {
    clients: BTreeMap<String, Arc<dyn Client>>,
}

impl Manager {
    /// Build clients from `name -> config` pairs.
    ///
    /// The key becomes the client name. Disabled entries, invalid
    /// configurations and transports without a client implementation are
    /// skipped with a log line.
    pub fn new<I>(configs: I) -> Self
    where
        I: IntoIterator<Item = (String, ClientConfig)>,
    {
        let mut clients: BTreeMap<String, Arc<dyn Client>> = BTreeMap::new();
        for (name, mut config) in configs {
            if !config.enabled {
                tracing::debug!(client = %name, "skipping disabled client");
                continue;
            }
            config.name.clone_from(&name);
            if let Err(e) = config.validate() {
                tracing::warn!(client = %name, error = %e, "skipping invalid client configuration");
                continue;
            }
            match create_client(config) {
                Ok(client) => {
                    clients.insert(name, client);
                }
                Err(e) => tracing::warn!(client = %name, error = %e, "skipping client"),
            }
        }
        tracing::debug!(count = clients.len(), "client manager ready");
        Self { clients }
    }

    /// Manage already-built clients, keyed by their own names
    pub fn from_clients<I>(clients: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Client>>,
    {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.name().to_string(), c))
                .collect(),
        }
    }

    /// Names of all managed clients, sorted
    pub fn list_clients(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    /// Look up a client
    pub fn get_client(&self, name: &str) -> Option<Arc<dyn Client>> {
        self.clients.get(name).cloned()
    }

    fn client(&self, name: &str) -> Result<Arc<dyn Client>, ManagerError> {
        self.get_client(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))
    }

    /// Connect and initialize one client.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AlreadyConnected`, or the connect/initialize failure.
    pub async fn start_client(&self, name: &str) -> Result<(), ManagerError> {
        start(self.client(name)?).await
    }

    /// `start_client`, retried per the client's retry policy while the
    /// failure is transient.
    ///
    /// # Errors
    ///
    /// The last failure once attempts are exhausted, or the first
    /// non-transient failure.
    pub async fn start_client_with_retry(&self, name: &str) -> Result<(), ManagerError> {
        let client = self.client(name)?;
        let retry = client.config().retry.clone();
        let attempts = retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            match start(Arc::clone(&client)).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts && e.is_transient() => {
                    let delay = retry.delay_for(attempt);
                    tracing::warn!(
                        client = %name,
                        attempt,
                        max_attempts = attempts,
                        ?delay,
                        error = %e,
                        "start failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Disconnect one client.
    ///
    /// # Errors
    ///
    /// `NotFound` or the disconnect failure.
    pub async fn stop_client(&self, name: &str) -> Result<(), ManagerError> {
        stop(self.client(name)?).await
    }

    /// Start every client concurrently.
    ///
    /// # Errors
    ///
    /// `Partial` listing every client that failed; the others stay started.
    pub async fn start_all(&self) -> Result<(), ManagerError> {
        let mut tasks = JoinSet::new();
        for client in self.clients.values() {
            let client = Arc::clone(client);
            tasks.spawn(async move { (client.name().to_string(), start(client).await) });
        }
        collect("start", tasks).await
    }

    /// Stop every client concurrently.
    ///
    /// # Errors
    ///
    /// `Partial` listing every client that failed to stop.
    pub async fn stop_all(&self) -> Result<(), ManagerError> {
        let mut tasks = JoinSet::new();
        for client in self.clients.values() {
            let client = Arc::clone(client);
            tasks.spawn(async move { (client.name().to_string(), stop(client).await) });
        }
        collect("stop", tasks).await
    }

    /// Status snapshot of one client
    pub fn client_status(&self, name: &str) -> ClientStatus {
        let Some(client) = self.clients.get(name) else {
            return ClientStatus {
                name: name.to_string(),
                state: ClientState::NotFound,
                connected: false,
                initialized: false,
                server_info: None,
                error: Some("client not found".to_string()),
            };
        };

        let connected = client.is_connected();
        ClientStatus {
            name: name.to_string(),
            state: if connected {
                ClientState::Connected
            } else {
                ClientState::Disconnected
            },
            connected,
            initialized: client.is_initialized(),
            server_info: if connected { client.server_info() } else { None },
            error: None,
        }
    }

    /// Status snapshot of every client
    pub fn all_status(&self) -> BTreeMap<String, ClientStatus> {
        self.clients
            .keys()
            .map(|name| (name.clone(), self.client_status(name)))
            .collect()
    }

    /// `true` when the client is connected and answers `ping`
    pub async fn health_check(&self, name: &str) -> bool {
        match self.clients.get(name) {
            Some(client) => probe(Arc::clone(client)).await,
            None => false,
        }
    }

    /// Ping every client concurrently
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let mut tasks = JoinSet::new();
        for client in self.clients.values() {
            let client = Arc::clone(client);
            tasks.spawn(async move { (client.name().to_string(), probe(client).await) });
        }

        let mut results: BTreeMap<String, bool> =
            self.clients.keys().map(|n| (n.clone(), false)).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, healthy)) => {
                    results.insert(name, healthy);
                }
                Err(e) => tracing::error!(error = %e, "health check task failed"),
            }
        }
        results
    }

    /// Stop every client.
    ///
    /// # Errors
    ///
    /// Same as [`stop_all`](Self::stop_all).
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        tracing::info!(clients = self.clients.len(), "shutting down client manager");
        self.stop_all().await
    }
}

async fn start(client: Arc<dyn Client>) -> Result<(), ManagerError> {
    let name = client.name().to_string();
    if client.is_connected() {
        return Err(ManagerError::AlreadyConnected(name));
    }

    client
        .connect()
        .await
        .map_err(|source| ManagerError::Connect {
            name: name.clone(),
            source,
        })?;

    if let Err(source) = client.initialize().await {
        if let Err(e) = client.disconnect().await {
            tracing::warn!(client = %name, error = %e, "disconnect after failed initialize also failed");
        }
        return Err(ManagerError::Initialize { name, source });
    }

    tracing::info!(client = %name, "client started");
    Ok(())
}

async fn stop(client: Arc<dyn Client>) -> Result<(), ManagerError> {
    client.disconnect().await.map_err(|source| ManagerError::Stop {
        name: client.name().to_string(),
        source,
    })
}

async fn probe(client: Arc<dyn Client>) -> bool {
    if !client.is_connected() {
        return false;
    }
    match client.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(client = %client.name(), error = %e, "health check failed");
            false
        }
    }
}

async fn collect(
    operation: &'static str,
    mut tasks: JoinSet<(String, Result<(), ManagerError>)>,
) -> Result<(), ManagerError> {
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((name, Err(e))) => {
                tracing::error!(client = %name, error = %e, "failed to {operation} client");
                failures.push((name, e));
            }
            Err(e) => tracing::error!(error = %e, "{operation} task failed"),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        Err(ManagerError::Partial {
            operation,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use pretty_assertions::assert_eq;

    fn configs() -> Vec<(String, ClientConfig)> {
        let disabled = ClientConfig {
            enabled: false,
            ..ClientConfig::stdio("", "cat", Vec::<String>::new())
        };
        let websocket = ClientConfig {
            transport: TransportKind::Websocket,
            port: Some(80),
            ..ClientConfig::default()
        };
        let no_command = ClientConfig::default();
        vec![
            ("files".into(), ClientConfig::stdio("", "cat", Vec::<String>::new())),
            ("kv".into(), ClientConfig::tcp("ignored", "127.0.0.1", 7070)),
            ("off".into(), disabled),
            ("ws".into(), websocket),
            ("broken".into(), no_command),
        ]
    }

    #[test]
    fn test_construction_skips_entries() {
        let manager = Manager::new(configs());
        assert_eq!(manager.list_clients(), vec!["files", "kv"]);
        let kv = manager.get_client("kv").unwrap();
        assert_eq!(kv.name(), "kv");
        assert!(manager.get_client("ws").is_none());
    }

    #[test]
    fn test_unknown_status() {
        let manager = Manager::new(configs());
        let status = manager.client_status("nope");
        assert_eq!(status.state, ClientState::NotFound);
        assert_eq!(status.error.as_deref(), Some("client not found"));

        let status = manager.client_status("kv");
        assert_eq!(status.state, ClientState::Disconnected);
        assert!(!status.connected && !status.initialized);
        assert_eq!(manager.all_status().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_client_operations() {
        let manager = Manager::new(configs());
        assert!(matches!(
            manager.start_client("nope").await,
            Err(ManagerError::NotFound(_))
        ));
        assert!(matches!(
            manager.stop_client("nope").await,
            Err(ManagerError::NotFound(_))
        ));
        assert!(!manager.health_check("nope").await);
        assert!(!manager.health_check("kv").await);
    }

    #[test]
    fn test_partial_error_names_clients() {
        let err = ManagerError::Partial {
            operation: "start",
            failures: vec![
                ("a".into(), ManagerError::NotFound("a".into())),
                (
                    "b".into(),
                    ManagerError::Connect {
                        name: "b".into(),
                        source: McpError::connection_failed("refused"),
                    },
                ),
            ],
        };
        assert_eq!(
            err.to_string(),
            "failed to start some clients: a: client a not found; b: failed to connect client b: MCP error -32000: refused"
        );
        assert_eq!(err.failed_clients(), vec!["a", "b"]);
    }
}
