//! Serve command implementation.

use super::facts;
use attsync_server::{ServerConfig, SyncServer};
use std::net::SocketAddr;
use std::path::Path;
use tracing::{info, warn};

/// Runs the serve command until Ctrl-C, then saves the fact file.
pub fn run(path: &Path, bind: SocketAddr, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = facts::load(path)?;
    let config = ServerConfig::new(bind).with_peer_name(name);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let server = SyncServer::open(config, store).await?;
        println!("Listening on ws://{}", server.local_addr()?);

        server
            .serve_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
            })
            .await?;

        let stats = server.stats();
        info!(
            served = stats.sessions_served,
            refused = stats.sessions_refused,
            failed = stats.sessions_failed,
            "server stopped"
        );
        facts::save(path, server.replica().store())
    })
}
