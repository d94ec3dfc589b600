//! Server configuration management
//!
//! Configuration is layered: built-in defaults, then an optional file
//! (`.toml`, `.yaml`/`.yml` or `.json`), then `KVMCP_`-prefixed environment
//! variables with `__` separating nested keys:
//!
//! ```text
//! KVMCP_NAME=kv-server
//! KVMCP_TRANSPORT__TYPE=tcp
//! KVMCP_TRANSPORT__PORT=7070
//! KVMCP_LOGGING__LEVEL=debug
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kvmcp_client::{ClientConfig, TransportKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DurationSecondsWithFrac, formats::Flexible, serde_as};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "KVMCP";

/// Default per-connection idle and write deadline
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
    /// Usage hints returned from `initialize`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Listener configuration
    pub transport: TransportConfig,
    /// Expose every tool not named in `disabled_tools`
    pub enable_all_tools: bool,
    /// Tools to expose when `enable_all_tools` is off
    pub enabled_tools: Vec<String>,
    /// Tools never exposed when `enable_all_tools` is on
    pub disabled_tools: Vec<String>,
    /// Serve `resources/*`
    pub enable_resources: bool,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Outbound MCP servers whose tools are proxied, keyed by client name
    pub clients: BTreeMap<String, ClientConfig>,
}

/// Listener configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// `stdio`, `tcp`, `unix` or `websocket`
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// Bind host (tcp, websocket)
    pub host: String,
    /// Bind port (tcp, websocket); 0 picks a free port
    pub port: u16,
    /// Endpoint path (websocket)
    pub path: String,
    /// Socket file (unix)
    pub socket_path: PathBuf,
    /// Idle deadline for reads and bound on every write; zero disables it
    #[serde_as(as = "DurationSecondsWithFrac<f64, Flexible>")]
    pub timeout: Duration,
}

/// Where log records go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    /// Standard error only
    #[default]
    Stderr,
    /// Rolling files only
    File,
    /// Standard error and rolling files
    Both,
    /// Logging disabled
    None,
}

/// Log file rotation period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    /// New file every minute
    Minute,
    /// New file every hour
    Hourly,
    /// New file every day
    Daily,
    /// Single file
    #[default]
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// JSON records instead of human-readable lines
    pub structured: bool,
    /// Output target
    pub output: LogOutput,
    /// Directory for log files (file, both)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Log file name prefix
    pub file_prefix: String,
    /// Log file rotation
    pub rotation: LogRotation,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: crate::SERVER_NAME.to_string(),
            version: crate::SERVER_VERSION.to_string(),
            description: None,
            transport: TransportConfig::default(),
            enable_all_tools: true,
            enabled_tools: Vec::new(),
            disabled_tools: Vec::new(),
            enable_resources: true,
            logging: LoggingConfig::default(),
            clients: BTreeMap::new(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Stdio,
            host: "127.0.0.1".to_string(),
            port: 0,
            path: kvmcp_client::config::DEFAULT_WEBSOCKET_PATH.to_string(),
            socket_path: PathBuf::new(),
            timeout: DEFAULT_TRANSPORT_TIMEOUT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
            output: LogOutput::Stderr,
            directory: None,
            file_prefix: crate::SERVER_NAME.to_string(),
            rotation: LogRotation::Never,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("unsupported configuration file format, use .toml, .yaml, .yml or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// Values that parse but cannot work
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ServerConfig {
    /// Load defaults, then `path` if given, then `KVMCP_*` environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, has an unknown extension,
    /// does not parse, or the merged configuration fails
    /// [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file, with `KVMCP_*` overrides.
    ///
    /// ```rust,no_run
    /// use kvmcp_server::ServerConfig;
    ///
    /// let config = ServerConfig::from_file("kvmcp.toml")?;
    /// # Ok::<(), kvmcp_server::ConfigError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(Some(path.as_ref()))
    }

    /// [`load`](Self::load) with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml" | "yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(ConfigError::UnsupportedFormat),
            };
            let name = path.to_str().ok_or(ConfigError::UnsupportedFormat)?;
            builder = builder.add_source(File::new(name, format));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration builder
    ///
    /// ```rust
    /// use kvmcp_server::ServerConfig;
    ///
    /// let config = ServerConfig::builder()
    ///     .name("kv")
    ///     .tcp("0.0.0.0", 7070)
    ///     .build();
    /// assert_eq!(config.transport.port, 7070);
    /// ```
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    /// Reject transport settings that cannot be served.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when a unix transport has no socket path or a
    /// network transport has no host.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let transport = &self.transport;
        match transport.kind {
            TransportKind::Unix if transport.socket_path.as_os_str().is_empty() => Err(
                ConfigError::Invalid("unix transport requires socket_path".to_string()),
            ),
            TransportKind::Tcp | TransportKind::Websocket if transport.host.is_empty() => Err(
                ConfigError::Invalid(format!("{} transport requires host", transport.kind)),
            ),
            _ => Ok(()),
        }
    }

    /// Whether a local tool is exposed
    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        if self.enable_all_tools {
            !self.disabled_tools.iter().any(|t| t == tool)
        } else {
            self.enabled_tools.iter().any(|t| t == tool)
        }
    }
}

impl TransportConfig {
    /// Summary of the listener settings for status output
    pub fn info(&self) -> BTreeMap<String, Value> {
        let mut info = BTreeMap::new();
        info.insert("type".to_string(), Value::from(self.kind.to_string()));
        info.insert("timeout".to_string(), Value::from(format!("{:?}", self.timeout)));
        match self.kind {
            TransportKind::Tcp | TransportKind::Websocket => {
                info.insert("host".to_string(), Value::from(self.host.clone()));
                info.insert("port".to_string(), Value::from(self.port));
                if self.kind == TransportKind::Websocket {
                    info.insert("path".to_string(), Value::from(self.path.clone()));
                }
            }
            TransportKind::Unix => {
                info.insert(
                    "socket_path".to_string(),
                    Value::from(self.socket_path.display().to_string()),
                );
            }
            TransportKind::Stdio => {}
        }
        info
    }
}

/// Configuration builder
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    config: ServerConfig,
}

impl ConfigurationBuilder {
    /// Start from the defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set server version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Set the usage hints returned from `initialize`
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = Some(description.into());
        self
    }

    /// Serve over stdin/stdout
    pub fn stdio(mut self) -> Self {
        self.config.transport.kind = TransportKind::Stdio;
        self
    }

    /// Listen on a TCP address
    pub fn tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.transport.kind = TransportKind::Tcp;
        self.config.transport.host = host.into();
        self.config.transport.port = port;
        self
    }

    /// Listen on a unix domain socket
    pub fn unix(mut self, socket_path: impl Into<PathBuf>) -> Self {
        self.config.transport.kind = TransportKind::Unix;
        self.config.transport.socket_path = socket_path.into();
        self
    }

    /// Set the per-connection deadline
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.timeout = timeout;
        self
    }

    /// Only expose the named tools
    pub fn enabled_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.enable_all_tools = false;
        self.config.enabled_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Never expose the named tools
    pub fn disabled_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.disabled_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Add an outbound client whose tools are proxied
    pub fn client(mut self, name: impl Into<String>, config: ClientConfig) -> Self {
        self.config.clients.insert(name.into(), config);
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.name, crate::SERVER_NAME);
        assert_eq!(config.transport.kind, TransportKind::Stdio);
        assert_eq!(config.transport.timeout, Duration::from_secs(30));
        assert!(config.enable_all_tools);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tool_filters() {
        let config = ServerConfig::builder().disabled_tools(["drop"]).build();
        assert!(config.is_tool_enabled("echo"));
        assert!(!config.is_tool_enabled("drop"));

        let config = ServerConfig::builder().enabled_tools(["echo"]).build();
        assert!(config.is_tool_enabled("echo"));
        assert!(!config.is_tool_enabled("scan"));

        let config = ServerConfig::builder().enabled_tools(Vec::<String>::new()).build();
        assert!(!config.is_tool_enabled("echo"));
    }

    #[test]
    fn test_unix_requires_socket_path() {
        let mut config = ServerConfig::builder().unix("").build();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.transport.socket_path = PathBuf::from("/tmp/kvmcp.sock");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transport_info() {
        let info = ServerConfig::builder().tcp("0.0.0.0", 7070).build().transport.info();
        assert_eq!(info["type"], "tcp");
        assert_eq!(info["host"], "0.0.0.0");
        assert_eq!(info["port"], 7070);
        assert_eq!(info["timeout"], "30s");
        assert!(!info.contains_key("path"));

        let mut config = ServerConfig::default().transport;
        config.kind = TransportKind::Websocket;
        assert_eq!(config.info()["path"], "/mcp");

        let info = ServerConfig::builder().unix("/run/kv.sock").build().transport.info();
        assert_eq!(info["socket_path"], "/run/kv.sock");
        assert!(!info.contains_key("port"));

        let info = ServerConfig::default().transport.info();
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ServerConfig = serde_json::from_value(serde_json::json!({
            "name": "kv",
            "transport": { "type": "unix", "socket_path": "/tmp/kv.sock", "timeout": 2.5 }
        }))
        .unwrap();
        assert_eq!(config.transport.kind, TransportKind::Unix);
        assert_eq!(config.transport.timeout, Duration::from_millis(2500));
        assert_eq!(config.version, crate::SERVER_VERSION);
        assert_eq!(config.logging.output, LogOutput::Stderr);
    }

    proptest! {
        #[test]
        fn test_builder_keeps_tcp_port(port in 1u16..u16::MAX) {
            let config = ServerConfig::builder().tcp("localhost", port).build();
            prop_assert_eq!(config.transport.port, port);
            prop_assert_eq!(config.transport.kind, TransportKind::Tcp);
        }
    }
}
