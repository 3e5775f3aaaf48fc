//! WebSocket transports.
//!
//! Clients, organizers and witnesses connect on the client listener; peer
//! servers connect on the server listener or are dialed at startup. Every
//! connection gets a [`Socket`]: a writer task drains its queue to the
//! wire while the reader hands frames to the hub.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use pop_shared::constants::MAX_MESSAGE_SIZE;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as PeerMessage;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::hub::HubHandle;
use crate::state::{Socket, SocketRole};

pub fn client_router(hub: HubHandle) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/client", get(client_ws))
        .route("/organizer", get(organizer_ws))
        .route("/witness", get(witness_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

pub fn server_router(hub: HubHandle) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/server", get(server_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

pub async fn serve(router: Router, addr: SocketAddr, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(router, listener, shutdown).await
}

pub async fn serve_listener(
    router: Router,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Open a server connection to `url` and run it in the background.
pub async fn dial_peer(hub: HubHandle, url: &str) -> anyhow::Result<()> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to peer '{url}': {e}"))?;
    info!(%url, "Connected to peer server");

    let (socket, rx) = Socket::new(SocketRole::Server);
    hub.notify_new_server(&socket).await;

    let (sink, stream) = stream.split();
    tokio::spawn(async move {
        let frames = stream.map(|frame| match frame {
            Ok(PeerMessage::Text(text)) => Frame::Text(text),
            Ok(PeerMessage::Binary(bytes)) => Frame::from_bytes(bytes),
            Ok(PeerMessage::Close(_)) => Frame::Close,
            Ok(_) => Frame::Skip,
            Err(e) => Frame::Failed(e.to_string()),
        });
        pump(hub, socket, rx, sink, frames, PeerMessage::Text).await;
    });
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    peers: usize,
}

async fn health_check(State(hub): State<HubHandle>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        peers: hub.state().sockets.len().await,
    })
}

async fn client_ws(ws: WebSocketUpgrade, State(hub): State<HubHandle>) -> Response {
    upgrade(ws, hub, SocketRole::Client)
}

async fn organizer_ws(ws: WebSocketUpgrade, State(hub): State<HubHandle>) -> Response {
    upgrade(ws, hub, SocketRole::Organizer)
}

async fn witness_ws(ws: WebSocketUpgrade, State(hub): State<HubHandle>) -> Response {
    upgrade(ws, hub, SocketRole::Witness)
}

async fn server_ws(ws: WebSocketUpgrade, State(hub): State<HubHandle>) -> Response {
    upgrade(ws, hub, SocketRole::Server)
}

fn upgrade(ws: WebSocketUpgrade, hub: HubHandle, role: SocketRole) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |ws| run_socket(ws, hub, role))
}

async fn run_socket(ws: WebSocket, hub: HubHandle, role: SocketRole) {
    let (socket, rx) = Socket::new(role);
    debug!(socket = %socket.id(), %role, "Connection opened");
    if role == SocketRole::Server {
        hub.notify_new_server(&socket).await;
    }

    let (sink, stream) = ws.split();
    let frames = stream.map(|frame| match frame {
        Ok(WsMessage::Text(text)) => Frame::Text(text),
        Ok(WsMessage::Binary(bytes)) => Frame::from_bytes(bytes),
        Ok(WsMessage::Close(_)) => Frame::Close,
        Ok(_) => Frame::Skip,
        Err(e) => Frame::Failed(e.to_string()),
    });
    pump(hub, socket, rx, sink, frames, WsMessage::Text).await;
}

/// A frame read off either WebSocket implementation.
enum Frame {
    Text(String),
    Close,
    Skip,
    Failed(String),
}

impl Frame {
    fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(_) => Self::Failed("binary frame is not UTF-8".into()),
        }
    }
}

/// Run a connection until either side closes it, then report it closed.
async fn pump<K, M, St>(
    hub: HubHandle,
    socket: Socket,
    mut rx: mpsc::Receiver<String>,
    mut sink: K,
    mut frames: St,
    wrap: fn(String) -> M,
) where
    K: Sink<M> + Unpin + Send + 'static,
    M: Send + 'static,
    St: Stream<Item = Frame> + Unpin,
{
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(wrap(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = frames.next().await {
        match frame {
            Frame::Text(text) => {
                if !hub.submit(&socket, text).await {
                    break;
                }
            }
            Frame::Close => break,
            Frame::Skip => {}
            Frame::Failed(e) => {
                warn!(socket = %socket.id(), error = %e, "Read failed, closing connection");
                break;
            }
        }
    }

    hub.closed(socket.id()).await;
    writer.abort();
    debug!(socket = %socket.id(), "Connection ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::hub::Hub;
    use crate::test_support;

    async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..250 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_health_reports_peers() {
        let hub = Hub::start(test_support::state());
        let Json(health) = health_check(State(hub.handle())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.peers, 0);
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_dialed_servers_greet_each_other() {
        let alice = test_support::state();
        let bob = test_support::state();
        let alice_hub = Hub::start(alice.clone());
        let bob_hub = Hub::start(bob.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve_listener(
            server_router(alice_hub.handle()),
            listener,
            shutdown.clone(),
        ));

        dial_peer(bob_hub.handle(), &format!("ws://{addr}/server"))
            .await
            .unwrap();

        let bob_key = bob.identity.public_key();
        let alice_key = alice.identity.public_key();
        assert!(
            eventually(|| {
                let alice = alice.clone();
                let bob_key = bob_key.clone();
                async move {
                    alice
                        .peers
                        .peer_infos()
                        .await
                        .iter()
                        .any(|p| p.public_key == bob_key)
                }
            })
            .await
        );
        assert!(
            eventually(|| {
                let bob = bob.clone();
                let alice_key = alice_key.clone();
                async move {
                    bob.peers
                        .peer_infos()
                        .await
                        .iter()
                        .any(|p| p.public_key == alice_key)
                }
            })
            .await
        );

        shutdown.cancel();
        alice_hub.stop().await;
        bob_hub.stop().await;
        server.abort();
    }
}
