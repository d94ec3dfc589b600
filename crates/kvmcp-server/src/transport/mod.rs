//! Listener management
//!
//! [`TransportManager`] runs the configured listener and hands every accepted
//! connection to its own task. Shutdown is signalled through a watch channel:
//! the accept loop stops at once, open connections finish the request they
//! are serving and then close.

mod connection;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kvmcp_client::TransportKind;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::TransportConfig;
use crate::router::Router;
use connection::serve_connection;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Listener could not be bound
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address or socket path
        address: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Read, write or accept failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// A response could not be written in time
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// No server implementation for this transport
    #[error("{0} transport is not implemented")]
    NotImplemented(TransportKind),

    /// Configuration unusable for this transport
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

/// Runs one listener and its connections
#[derive(Debug)]
pub struct TransportManager {
    config: TransportConfig,
    router: Arc<Router>,
    shutdown: watch::Sender<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TransportManager {
    /// Manager for `config`, routing through `router`
    pub fn new(config: TransportConfig, router: Arc<Router>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            router,
            shutdown,
            local_addr: Mutex::new(None),
        }
    }

    /// Serve until shutdown, or until EOF for stdio.
    ///
    /// # Errors
    ///
    /// Bind and accept failures, stdio I/O failures, and
    /// [`TransportError::NotImplemented`] for websocket.
    pub async fn start(&self) -> Result<(), TransportError> {
        tracing::info!(transport = %self.config.kind, "starting transport");
        match self.config.kind {
            TransportKind::Stdio => self.serve_stdio().await,
            TransportKind::Tcp => self.serve_tcp().await,
            TransportKind::Unix => self.serve_unix().await,
            kind @ TransportKind::Websocket => Err(TransportError::NotImplemented(kind)),
        }
    }

    /// Stop accepting and close connections after their current request
    pub fn shutdown(&self) {
        tracing::info!(transport = %self.config.kind, "transport shutdown requested");
        self.shutdown.send_replace(true);
    }

    /// Bound TCP address, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Listener settings for status output
    pub fn info(&self) -> BTreeMap<String, Value> {
        self.config.info()
    }

    // One session bound to the parent process: no idle deadline, EOF ends it.
    async fn serve_stdio(&self) -> Result<(), TransportError> {
        serve_connection(
            tokio::io::stdin(),
            tokio::io::stdout(),
            Arc::clone(&self.router),
            Duration::ZERO,
            self.shutdown.subscribe(),
            "stdio".to_string(),
        )
        .await
    }

    async fn serve_tcp(&self) -> Result<(), TransportError> {
        if self.config.host.is_empty() {
            return Err(TransportError::InvalidConfig("tcp requires a host".into()));
        }
        let address = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| TransportError::Bind {
                address: address.clone(),
                source,
            })?;
        let bound = listener.local_addr()?;
        *self.local_addr.lock() = Some(bound);
        tracing::info!(address = %bound, "listening on tcp");

        let mut shutdown = self.shutdown.subscribe();
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let (reader, writer) = stream.into_split();
                    connections.spawn(self.connection(reader, writer, peer.to_string()));
                }
            }
            reap(&mut connections);
        }

        drop(listener);
        drain(connections).await;
        tracing::info!(address = %bound, "tcp listener stopped");
        Ok(())
    }

    #[cfg(unix)]
    async fn serve_unix(&self) -> Result<(), TransportError> {
        use tokio::net::UnixListener;

        let path = self.config.socket_path.clone();
        if path.as_os_str().is_empty() {
            return Err(TransportError::InvalidConfig("unix requires a socket_path".into()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&path).map_err(|source| TransportError::Bind {
            address: path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %path.display(), "listening on unix socket");

        let mut shutdown = self.shutdown.subscribe();
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let (reader, writer) = stream.into_split();
                    let peer = path.display().to_string();
                    connections.spawn(self.connection(reader, writer, peer));
                }
            }
            reap(&mut connections);
        }

        drop(listener);
        drain(connections).await;
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove socket file");
        }
        tracing::info!(path = %path.display(), "unix listener stopped");
        Ok(())
    }

    #[cfg(not(unix))]
    async fn serve_unix(&self) -> Result<(), TransportError> {
        Err(TransportError::NotImplemented(TransportKind::Unix))
    }

    fn connection<R, W>(
        &self,
        reader: R,
        writer: W,
        peer: String,
    ) -> impl Future<Output = ()> + Send + 'static
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let router = Arc::clone(&self.router);
        let timeout = self.config.timeout;
        let shutdown = self.shutdown.subscribe();
        async move {
            if let Err(e) = serve_connection(reader, writer, router, timeout, shutdown, peer).await
            {
                tracing::warn!(error = %e, "connection ended with error");
            }
        }
    }
}

fn reap(connections: &mut JoinSet<()>) {
    while let Some(finished) = connections.try_join_next() {
        if let Err(e) = finished {
            tracing::error!(error = %e, "connection task failed");
        }
    }
}

async fn drain(mut connections: JoinSet<()>) {
    while let Some(finished) = connections.join_next().await {
        if let Err(e) = finished {
            tracing::error!(error = %e, "connection task failed");
        }
    }
}
