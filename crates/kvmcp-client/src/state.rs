//! Connection state shared by every client variant

use kvmcp_protocol::types::ServerInfo;
use kvmcp_protocol::{ErrorCode, McpError, McpResult};
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct Flags {
    connected: bool,
    initialized: bool,
    server_info: Option<ServerInfo>,
}

/// Connected/initialized flags and negotiated server identity.
///
/// Reads take a shared lock; the three setters are the only writers.
/// Clearing `connected` also clears `initialized` and the server info, so an
/// uninitialized client is the only possible disconnected state.
#[derive(Debug)]
pub struct BaseClient {
    name: String,
    flags: RwLock<Flags>,
}

impl BaseClient {
    /// Fresh, disconnected state for the named client
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: RwLock::new(Flags::default()),
        }
    }

    /// Client name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a transport connection is open
    pub fn is_connected(&self) -> bool {
        self.flags.read().connected
    }

    /// Whether the `initialize` handshake completed
    pub fn is_initialized(&self) -> bool {
        self.flags.read().initialized
    }

    /// Identity the server reported during `initialize`
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.flags.read().server_info.clone()
    }

    /// Update the connection flag
    pub fn set_connected(&self, connected: bool) {
        let mut flags = self.flags.write();
        flags.connected = connected;
        if !connected {
            flags.initialized = false;
            flags.server_info = None;
        }
    }

    /// Update the initialization flag
    pub fn set_initialized(&self, initialized: bool) {
        let mut flags = self.flags.write();
        flags.initialized = initialized && flags.connected;
    }

    /// Record the server identity
    pub fn set_server_info(&self, info: Option<ServerInfo>) {
        self.flags.write().server_info = info;
    }

    /// Guard for operations that need an open connection.
    ///
    /// # Errors
    ///
    /// `client <name> is not connected`
    pub fn check_connected(&self) -> McpResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(McpError::new(
                ErrorCode::ConnectionFailed,
                format!("client {} is not connected", self.name),
            ))
        }
    }

    /// Guard for operations that need a completed handshake.
    ///
    /// # Errors
    ///
    /// `client <name> is not initialized`
    pub fn check_initialized(&self) -> McpResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(McpError::invalid_request(format!(
                "client {} is not initialized",
                self.name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_clears_session_state() {
        let base = BaseClient::new("kv");
        base.set_connected(true);
        base.set_initialized(true);
        base.set_server_info(Some(ServerInfo::new("test-server", "1.0.0")));
        assert!(base.is_initialized());

        base.set_connected(false);
        assert!(!base.is_connected());
        assert!(!base.is_initialized());
        assert_eq!(base.server_info(), None);
    }

    #[test]
    fn test_cannot_initialize_while_disconnected() {
        let base = BaseClient::new("kv");
        base.set_initialized(true);
        assert!(!base.is_initialized());
    }

    #[test]
    fn test_guards() {
        let base = BaseClient::new("kv");
        let err = base.check_connected().unwrap_err();
        assert_eq!(err.message, "client kv is not connected");
        let err = base.check_initialized().unwrap_err();
        assert_eq!(err.message, "client kv is not initialized");

        base.set_connected(true);
        assert!(base.check_connected().is_ok());
        assert!(base.check_initialized().is_err());
    }
}
