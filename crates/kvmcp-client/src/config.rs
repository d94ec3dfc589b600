//! Client connection configuration
//!
//! One [`ClientConfig`] describes one remote MCP endpoint. Configurations are
//! usually deserialized as part of a larger file (see the server crate) and then
//! passed through [`ClientConfig::validate`], which fills defaults and rejects
//! incomplete transport settings.
//!
//! Durations are written as (fractional) seconds:
//!
//! ```rust
//! use kvmcp_client::{ClientConfig, TransportKind};
//! use std::time::Duration;
//!
//! let mut config: ClientConfig = serde_json::from_value(serde_json::json!({
//!     "transport": "tcp",
//!     "port": 7070,
//!     "timeout": 2.5,
//! }))
//! .unwrap();
//! config.name = "kv".into();
//! config.validate().unwrap();
//!
//! assert_eq!(config.transport, TransportKind::Tcp);
//! assert_eq!(config.host.as_deref(), Some("localhost"));
//! assert_eq!(config.timeout, Duration::from_millis(2500));
//! ```

use serde::{Deserialize, Serialize};
use serde_with::formats::Flexible;
use serde_with::{DurationSecondsWithFrac, serde_as};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Request and dial deadline used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default websocket endpoint path
pub const DEFAULT_WEBSOCKET_PATH: &str = "/mcp";

/// Default host for socket transports
pub const DEFAULT_HOST: &str = "localhost";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The client has no name
    #[error("client name is required")]
    MissingName,

    /// stdio transport without a command
    #[error("command is required for stdio transport")]
    MissingCommand,

    /// Socket transport without a usable port
    #[error("valid port number is required for {0} transport")]
    InvalidPort(TransportKind),

    /// unix transport without a socket path
    #[error("socket path is required for unix socket transport")]
    MissingSocketPath,

    /// The retry policy is unusable
    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),

    /// No client implementation exists for this transport
    #[error("unsupported transport type: {0}")]
    UnsupportedTransport(TransportKind),
}

/// Wire transport used to reach a server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process stdin/stdout
    #[default]
    Stdio,
    /// Plain TCP socket
    Tcp,
    /// WebSocket (configuration only)
    Websocket,
    /// Unix domain socket
    Unix,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdio => "stdio",
            Self::Tcp => "tcp",
            Self::Websocket => "websocket",
            Self::Unix => "unix",
        })
    }
}

/// Delay growth between connection attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay every time
    Constant,
    /// `initial_wait * attempt`
    Linear,
    /// `initial_wait * 2^(attempt - 1)`
    #[default]
    Exponential,
}

/// Reconnection policy for one client
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// How the delay grows
    pub backoff: BackoffStrategy,
    /// Delay before the second attempt
    #[serde_as(as = "DurationSecondsWithFrac<f64, Flexible>")]
    pub initial_wait: Duration,
    /// Upper bound for any delay
    #[serde_as(as = "DurationSecondsWithFrac<f64, Flexible>")]
    pub max_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential,
            initial_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            BackoffStrategy::Constant => self.initial_wait,
            BackoffStrategy::Linear => self.initial_wait.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 2_u32.saturating_pow(attempt - 1);
                self.initial_wait.saturating_mul(factor)
            }
        };
        delay.min(self.max_wait)
    }
}

/// Static configuration for one remote MCP endpoint
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client name; the manager sets it from the configuration key
    pub name: String,
    /// Disabled clients are skipped by the manager
    pub enabled: bool,
    /// Transport kind
    pub transport: TransportKind,

    /// Executable to spawn (stdio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments for the executable (stdio)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Extra environment for the child, merged over the inherited one (stdio)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Remote host (tcp, websocket)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Remote port (tcp, websocket)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Endpoint path (websocket)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Socket file (unix)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    /// Per-request and dial deadline
    #[serde_as(as = "DurationSecondsWithFrac<f64, Flexible>")]
    pub timeout: Duration,
    /// Reconnection policy
    pub retry: RetryConfig,

    /// When non-empty, only these tools are exposed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enabled_tools: Vec<String>,
    /// Tools that are never exposed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disabled_tools: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            transport: TransportKind::Stdio,
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            host: None,
            port: None,
            path: None,
            socket_path: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
            enabled_tools: Vec::new(),
            disabled_tools: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// stdio configuration spawning `command` with `args`
    pub fn stdio<I, S>(name: impl Into<String>, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: Some(command.into()),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// TCP configuration dialing `host:port`
    pub fn tcp(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Tcp,
            host: Some(host.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fill defaults and reject incomplete transport settings.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first missing or invalid field.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }

        match self.transport {
            TransportKind::Stdio => {
                if self.command.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingCommand);
                }
            }
            TransportKind::Tcp | TransportKind::Websocket => {
                if self.host.as_deref().is_none_or(str::is_empty) {
                    self.host = Some(DEFAULT_HOST.to_string());
                }
                if self.port.unwrap_or(0) == 0 {
                    return Err(ConfigError::InvalidPort(self.transport));
                }
                if self.transport == TransportKind::Websocket
                    && self.path.as_deref().is_none_or(str::is_empty)
                {
                    self.path = Some(DEFAULT_WEBSOCKET_PATH.to_string());
                }
            }
            TransportKind::Unix => {
                if self
                    .socket_path
                    .as_ref()
                    .is_none_or(|p| p.as_os_str().is_empty())
                {
                    return Err(ConfigError::MissingSocketPath);
                }
            }
        }

        let defaults = RetryConfig::default();
        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = defaults.max_attempts;
        }
        if self.retry.initial_wait.is_zero() {
            self.retry.initial_wait = defaults.initial_wait;
        }
        if self.retry.max_wait.is_zero() {
            self.retry.max_wait = defaults.max_wait;
        }
        if self.retry.max_wait < self.retry.initial_wait {
            return Err(ConfigError::InvalidRetry(format!(
                "max_wait {:?} is shorter than initial_wait {:?}",
                self.retry.max_wait, self.retry.initial_wait
            )));
        }

        Ok(())
    }

    /// Deadline for dialing and for each request
    pub fn request_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }

    /// `host:port` for socket transports
    pub fn address(&self) -> Option<String> {
        let port = self.port.filter(|p| *p != 0)?;
        let host = self
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_HOST);
        Some(format!("{host}:{port}"))
    }

    /// Whether the tool filters expose `tool`.
    ///
    /// The disabled list always wins; a non-empty enabled list is an allow-list.
    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        if self.disabled_tools.iter().any(|t| t == tool) {
            return false;
        }
        self.enabled_tools.is_empty() || self.enabled_tools.iter().any(|t| t == tool)
    }
}
