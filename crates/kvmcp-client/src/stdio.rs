//! Child-process client
//!
//! Spawns the configured command and speaks newline-delimited JSON-RPC over
//! its stdin/stdout. stderr is drained into the log at debug level. A monitor
//! task owns the child: it notices when the process exits on its own and
//! performs the graceful stop sequence on disconnect.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kvmcp_protocol::types::{
    CallToolResult, GetPromptResult, InitializeResult, ListPromptsResult, ListResourcesResult,
    ListToolsResult, ReadResourceResult,
};
use kvmcp_protocol::{McpError, McpResult};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::connection::ClientCore;
use crate::state::BaseClient;

/// Time the child gets to exit after its stdin is closed
const EXIT_GRACE: Duration = Duration::from_secs(1);
/// Time to wait for the child after it was killed
const KILL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct ChildHandle {
    pid: Option<u32>,
    stop: oneshot::Sender<()>,
    monitor: JoinHandle<Option<ExitStatus>>,
}

/// MCP client over a spawned process
#[derive(Debug)]
pub struct StdioClient {
    core: Arc<ClientCore>,
    child: Mutex<Option<ChildHandle>>,
}

impl StdioClient {
    /// Create a disconnected client; nothing is spawned until `connect`
    pub fn new(config: ClientConfig) -> Self {
        Self {
            core: ClientCore::new(config),
            child: Mutex::new(None),
        }
    }

    /// OS process id of the running child
    pub fn pid(&self) -> Option<u32> {
        self.child.lock().as_ref().and_then(|c| c.pid)
    }

    fn spawn(&self) -> McpResult<Child> {
        let config = &self.core.config;
        let command = config
            .command
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                McpError::connection_failed(format!(
                    "client {} has no command configured",
                    self.core.name()
                ))
            })?;

        Command::new(command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(client = %self.core.name(), command, error = %e, "failed to spawn server process");
                McpError::connection_failed(format!("failed to start command {command}: {e}"))
                    .with_data(serde_json::json!({ "command": command }))
            })
    }
}

async fn drain_stderr(client: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(client = %client, "server stderr: {line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(client = %client, error = %e, "stopped reading server stderr");
                break;
            }
        }
    }
}

/// Owns the child until it exits or a stop is requested.
async fn monitor_child(
    client: String,
    mut child: Child,
    stop: oneshot::Receiver<()>,
    closed: CancellationToken,
) -> Option<ExitStatus> {
    tokio::select! {
        status = child.wait() => {
            match &status {
                Ok(status) => tracing::info!(client = %client, %status, "server process exited"),
                Err(e) => tracing::warn!(client = %client, error = %e, "failed to wait for server process"),
            }
            // let the reader drain what the process wrote before exiting
            tokio::select! {
                () = closed.cancelled() => {}
                () = tokio::time::sleep(KILL_GRACE) => closed.cancel(),
            }
            status.ok()
        }
        _ = stop => {
            if let Ok(status) = tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                return status.ok();
            }
            tracing::warn!(client = %client, "server process ignored closed stdin, killing it");
            if let Err(e) = child.start_kill() {
                tracing::warn!(client = %client, error = %e, "failed to kill server process");
            }
            match tokio::time::timeout(KILL_GRACE, child.wait()).await {
                Ok(status) => status.ok(),
                Err(_) => {
                    tracing::error!(client = %client, "server process still running after kill");
                    None
                }
            }
        }
    }
}

#[async_trait]
impl Client for StdioClient {
    fn base(&self) -> &BaseClient {
        &self.core.base
    }

    fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    async fn connect(&self) -> McpResult<()> {
        let _lifecycle = self.core.lifecycle.lock().await;
        if self.core.base.is_connected() {
            return Err(self.core.already_connected());
        }

        let mut child = self.spawn()?;
        let pid = child.id();
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(McpError::connection_failed(format!(
                "client {}: child process pipes unavailable",
                self.core.name()
            )));
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(self.core.name().to_string(), stderr));
        }

        let session = self.core.attach(Box::new(stdout), Box::new(stdin));

        let (stop, stop_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_child(
            self.core.name().to_string(),
            child,
            stop_rx,
            session.closed_token(),
        ));
        *self.child.lock() = Some(ChildHandle { pid, stop, monitor });

        tracing::info!(
            client = %self.core.name(),
            command = ?self.core.config.command,
            pid,
            "connected over stdio"
        );
        Ok(())
    }

    async fn disconnect(&self) -> McpResult<()> {
        let _lifecycle = self.core.lifecycle.lock().await;
        let session = self.core.take_session();
        let child = self.child.lock().take();

        if let Some(session) = &session {
            // closing stdin is the polite shutdown request
            session.close_writer().await;
        }
        if let Some(ChildHandle { stop, monitor, .. }) = child {
            let _ = stop.send(());
            match monitor.await {
                Ok(Some(status)) => {
                    tracing::debug!(client = %self.core.name(), %status, "server process stopped");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(client = %self.core.name(), error = %e, "process monitor failed");
                }
            }
        }
        if let Some(session) = session {
            session.close().await;
            tracing::info!(client = %self.core.name(), "disconnected");
        }

        self.core.base.set_connected(false);
        Ok(())
    }

    async fn initialize(&self) -> McpResult<InitializeResult> {
        self.core.initialize().await
    }

    async fn ping(&self) -> McpResult<()> {
        self.core.ping().await
    }

    async fn list_tools(&self, cursor: Option<String>) -> McpResult<ListToolsResult> {
        self.core.list_tools(cursor).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        self.core.call_tool(name, arguments).await
    }

    async fn list_prompts(&self, cursor: Option<String>) -> McpResult<ListPromptsResult> {
        self.core.list_prompts(cursor).await
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<GetPromptResult> {
        self.core.get_prompt(name, arguments).await
    }

    async fn list_resources(&self, cursor: Option<String>) -> McpResult<ListResourcesResult> {
        self.core.list_resources(cursor).await
    }

    async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        self.core.read_resource(uri).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmcp_protocol::ErrorCode;

    #[tokio::test]
    async fn test_missing_executable_stays_disconnected() {
        let client = StdioClient::new(ClientConfig::stdio(
            "ghost",
            "/nonexistent/kvmcp-test-binary",
            ["--flag"],
        ));
        let err = client.connect().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConnectionFailed);
        assert!(err.message.contains("/nonexistent/kvmcp-test-binary"));
        assert!(!client.is_connected());
        assert_eq!(client.pid(), None);
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let client = StdioClient::new(ClientConfig::stdio("idle", "cat", Vec::<String>::new()));
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_calls_require_connection() {
        let client = StdioClient::new(ClientConfig::stdio("idle", "cat", Vec::<String>::new()));
        let err = client.ping().await.unwrap_err();
        assert_eq!(err.message, "client idle is not connected");
        let err = client.call_tool("echo", None).await.unwrap_err();
        assert_eq!(err.message, "client idle is not connected");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_exit_flips_disconnected() {
        let client = StdioClient::new(ClientConfig::stdio("short", "true", Vec::<String>::new()));
        client.connect().await.unwrap();
        for _ in 0..50 {
            if !client.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!client.is_connected());
        client.disconnect().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_close_stops_child() {
        // cat exits as soon as its stdin is closed
        let client = StdioClient::new(ClientConfig::stdio("cat", "cat", Vec::<String>::new()));
        client.connect().await.unwrap();
        assert!(client.pid().is_some());
        let err = client.connect().await.unwrap_err();
        assert!(err.message.contains("already connected"));

        let started = std::time::Instant::now();
        client.disconnect().await.unwrap();
        assert!(started.elapsed() < EXIT_GRACE);
        assert!(!client.is_connected());
        assert_eq!(client.pid(), None);
    }
}
