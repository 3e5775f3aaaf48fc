//! # pop-server
//!
//! Federated publish/subscribe server for Proof-of-Personhood
//! organizations.
//!
//! This binary provides:
//! - **Client endpoints** (`/client`, `/organizer`, `/witness`) speaking
//!   JSON-RPC over WebSocket: subscribe, publish, catch up
//! - **Server endpoint** (`/server`) for peer servers, which exchange
//!   greetings, heartbeats, rumors and rumor states
//! - **Gossip** that spreads published messages to every peer with
//!   rumor mongering and vector timestamps

mod coin;
mod config;
mod gossip;
mod handler;
mod heartbeat;
mod hub;
mod state;
#[cfg(test)]
mod test_support;
mod ticker;
mod transport;

use std::sync::Arc;

use pop_shared::ServerIdentity;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::coin::RandomCoin;
use crate::config::ServerConfig;
use crate::hub::Hub;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pop_server=debug")),
        )
        .init();

    info!("Starting PoP server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration and identity
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let identity = match &config.server_secret_key {
        Some(secret) => ServerIdentity::from_secret_bytes(secret),
        None => {
            warn!("SERVER_SECRET_KEY not set, using an ephemeral identity");
            ServerIdentity::generate()
        }
    };
    info!(public_key = %identity.public_key(), "Server identity loaded");

    // -----------------------------------------------------------------------
    // 3. Build state and start the hub
    // -----------------------------------------------------------------------
    let coin = Arc::new(RandomCoin::new(config.monger_stop_probability));
    let peers = config.peers.clone();
    let client_addr = config.client_addr;
    let server_addr = config.server_addr;

    let state = AppState::new(config, identity, coin);
    let shutdown = state.shutdown.clone();
    let hub = Hub::start(state);

    // -----------------------------------------------------------------------
    // 4. Spawn listeners
    // -----------------------------------------------------------------------
    let client = tokio::spawn(transport::serve(
        transport::client_router(hub.handle()),
        client_addr,
        shutdown.clone(),
    ));
    let server = tokio::spawn(transport::serve(
        transport::server_router(hub.handle()),
        server_addr,
        shutdown.clone(),
    ));

    // -----------------------------------------------------------------------
    // 5. Dial configured peers
    // -----------------------------------------------------------------------
    for url in &peers {
        if let Err(e) = transport::dial_peer(hub.handle(), url).await {
            warn!(%url, error = %e, "Could not reach peer server");
        }
    }

    // -----------------------------------------------------------------------
    // 6. Run until Ctrl+C or a listener fails
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = client => result,
        result = server => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(Ok(()))
        }
    };

    hub.stop().await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "Listener failed");
            Err(e)
        }
        Err(e) => {
            error!(error = %e, "Listener task panicked");
            Err(e.into())
        }
    }
}
