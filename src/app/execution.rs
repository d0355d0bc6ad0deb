//! Server execution and shutdown

use anyhow::{Context, Result};
use log::{error, info};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::server::{self, AppState};

/// Serve until Ctrl-C
///
/// Shutdown abandons pending requests and disconnects observers before the
/// listener drains, so in-flight waits and WebSocket sessions end promptly.
pub async fn run_server(config: &ServerConfig, state: AppState) -> Result<()> {
    let listener = TcpListener::bind((config.listen.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.listen, config.port))?;
    let local_addr = listener.local_addr()?;

    info!(
        "Listening on http://{} (data file {}, resolution timeout {}s)",
        local_addr,
        config.data_file.display(),
        config.resolution_timeout.as_secs()
    );

    let engine = state.engine.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
        engine.shutdown();
    };

    server::serve(listener, state, shutdown)
        .await
        .context("Server terminated with an error")?;

    info!("Server stopped");
    Ok(())
}
