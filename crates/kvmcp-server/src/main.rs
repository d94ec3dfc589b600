//! `kvmcp-server [config-file]`
//!
//! Loads the configuration (defaults, optional file, `KVMCP_*` environment),
//! starts the configured outbound clients and serves until EOF on stdio or
//! Ctrl-C on a listener.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use kvmcp_client::Manager;
use kvmcp_server::{Router, ServerConfig, TransportManager, handlers};

/// Upper bound on waiting for blocking tasks (the stdin reader) at exit
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(run());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

async fn run() -> anyhow::Result<()> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = ServerConfig::load(path.as_deref()).context("failed to load configuration")?;
    let _guard = config
        .logging
        .init()
        .context("failed to initialize logging")?;

    let manager = Arc::new(Manager::new(config.clients.clone()));
    let router = Arc::new(Router::with_proxy(config.clone(), Arc::clone(&manager)));
    router
        .register_tool(handlers::echo_tool())
        .context("failed to register echo tool")?;

    if !manager.list_clients().is_empty() {
        if let Err(e) = manager.start_all().await {
            tracing::warn!(error = %e, "some clients failed to start");
        }
        if let Some(proxy) = router.proxy()
            && let Err(e) = proxy.sync_all_tools().await
        {
            tracing::warn!(error = %e, "some remote tools could not be synced");
        }
    }

    let transport = Arc::new(TransportManager::new(config.transport.clone(), router));
    let signal = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received Ctrl-C, shutting down");
                transport.shutdown();
            }
        })
    };

    tracing::info!(
        name = %config.name,
        version = %config.version,
        transport = ?transport.info(),
        "server starting"
    );
    let served = transport.start().await;
    signal.abort();

    if let Err(e) = manager.shutdown().await {
        tracing::warn!(error = %e, "client shutdown incomplete");
    }
    served.context("transport failed")?;
    tracing::info!("server stopped");
    Ok(())
}
