//! Connection dispatcher.
//!
//! Transports hand every frame they read to the hub. A single dispatcher
//! task pulls frames off the queue and runs each one on a worker, with at
//! most `worker_pool_size` in flight. The hub also owns the periodic gossip
//! tasks and cleans up after closed connections.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gossip;
use crate::handler::jsonrpc::handle_incoming;
use crate::handler::query::send_greet;
use crate::heartbeat;
use crate::state::{AppState, Socket};

const QUEUE_SIZE: usize = 1024;

/// A frame read from a socket, waiting for a worker.
#[derive(Debug)]
pub struct IncomingMessage {
    pub socket: Socket,
    pub payload: String,
}

/// Cloneable entry point used by the transports.
#[derive(Clone)]
pub struct HubHandle {
    messages: mpsc::Sender<IncomingMessage>,
    closed: mpsc::Sender<String>,
    state: AppState,
}

impl HubHandle {
    /// Queue a frame. Returns `false` once the hub is gone.
    pub async fn submit(&self, socket: &Socket, payload: String) -> bool {
        let message = IncomingMessage {
            socket: socket.clone(),
            payload,
        };
        self.messages.send(message).await.is_ok()
    }

    /// Report a connection as gone.
    pub async fn closed(&self, socket_id: &str) {
        if self.closed.send(socket_id.to_string()).await.is_err() {
            debug!(socket = %socket_id, "Hub stopped before close was reported");
        }
    }

    /// Register a freshly opened server connection and greet it.
    pub async fn notify_new_server(&self, socket: &Socket) {
        self.state.sockets.upsert(socket.clone()).await;
        match send_greet(&self.state, socket).await {
            Ok(true) => info!(peer = %socket.id(), "Greeted new server"),
            Ok(false) => {}
            Err(e) => warn!(peer = %socket.id(), error = %e, "Failed to greet server"),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

pub struct Hub {
    handle: HubHandle,
    tasks: Vec<JoinHandle<()>>,
    workers: Arc<Semaphore>,
    pool_size: u32,
}

impl Hub {
    /// Spawn the dispatcher and the periodic tasks.
    pub fn start(state: AppState) -> Self {
        let (messages_tx, messages_rx) = mpsc::channel(QUEUE_SIZE);
        let (closed_tx, closed_rx) = mpsc::channel(QUEUE_SIZE);
        let pool_size = state.config.worker_pool_size.max(1);
        let workers = Arc::new(Semaphore::new(pool_size));

        let ticker = state.rumor_reset.ticker(state.config.rumor_interval);
        let tasks = vec![
            tokio::spawn(dispatch(
                state.clone(),
                messages_rx,
                closed_rx,
                Arc::clone(&workers),
            )),
            tokio::spawn(gossip::run_rumor_sender(state.clone(), ticker)),
            tokio::spawn(heartbeat::run_heartbeat(state.clone())),
            tokio::spawn(gossip::run_rumor_state(state.clone())),
        ];

        info!(workers = pool_size, "Hub started");
        Self {
            handle: HubHandle {
                messages: messages_tx,
                closed: closed_tx,
                state,
            },
            tasks,
            workers,
            pool_size: u32::try_from(pool_size).unwrap_or(u32::MAX),
        }
    }

    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Stop every task and wait for in-flight workers to finish.
    pub async fn stop(self) {
        self.handle.state.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Hub task ended abnormally");
            }
        }
        // Every permit back means every worker is done.
        if self.workers.acquire_many(self.pool_size).await.is_err() {
            warn!("Worker pool closed during shutdown");
        }
        info!("Hub stopped");
    }
}

async fn dispatch(
    state: AppState,
    mut messages: mpsc::Receiver<IncomingMessage>,
    mut closed: mpsc::Receiver<String>,
    workers: Arc<Semaphore>,
) {
    loop {
        // Pending work is drained before shutdown is honoured.
        tokio::select! {
            biased;
            Some(socket_id) = closed.recv() => {
                forget_socket(&state, &socket_id).await;
            }
            Some(message) = messages.recv() => {
                let permit = tokio::select! {
                    _ = state.shutdown.cancelled() => break,
                    permit = Arc::clone(&workers).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                let state = state.clone();
                tokio::spawn(async move {
                    handle_incoming(&state, &message.socket, &message.payload).await;
                    drop(permit);
                });
            }
            _ = state.shutdown.cancelled() => break,
        }
    }
    debug!("Dispatcher stopped");
}

async fn forget_socket(state: &AppState, socket_id: &str) {
    state.subscribers.unsubscribe_from_all(socket_id).await;
    state.peers.remove(socket_id).await;
    if state.sockets.remove(socket_id).await {
        info!(peer = %socket_id, "Server connection closed");
    } else {
        debug!(socket = %socket_id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pop_shared::ServerIdentity;
    use serde_json::json;
    use tokio::time::timeout;

    use crate::state::SocketRole;
    use crate::test_support::{self, lao_create};

    #[tokio::test]
    async fn test_submitted_query_is_answered() {
        let hub = Hub::start(test_support::state());
        let handle = hub.handle();
        let (client, mut rx) = Socket::new(SocketRole::Organizer);
        let msg = lao_create(&ServerIdentity::generate(), "L");

        let frame = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "publish",
            "params": {"channel": "/root", "message": msg},
        });
        assert!(handle.submit(&client, frame.to_string()).await);

        let answer = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        let answer: serde_json::Value = serde_json::from_str(&answer).unwrap();
        assert_eq!(answer["result"], 0);

        hub.stop().await;
        assert!(handle.state().channels.has_channel("/root/L"));
    }

    #[tokio::test]
    async fn test_closed_socket_is_forgotten() {
        let state = test_support::state();
        let hub = Hub::start(state.clone());
        let handle = hub.handle();

        let (peer, _rx) = Socket::new(SocketRole::Server);
        handle.notify_new_server(&peer).await;
        assert_eq!(state.sockets.len().await, 1);
        assert!(state.peers.is_greeted(peer.id()).await);

        handle.closed(peer.id()).await;
        hub.stop().await;

        assert_eq!(state.sockets.len().await, 0);
        assert!(!state.peers.is_greeted(peer.id()).await);
    }

    #[tokio::test]
    async fn test_new_server_is_greeted_once() {
        let state = test_support::state();
        let hub = Hub::start(state.clone());
        let handle = hub.handle();

        let (peer, mut rx) = Socket::new(SocketRole::Server);
        handle.notify_new_server(&peer).await;
        handle.notify_new_server(&peer).await;

        let greets = test_support::drain(&mut rx)
            .into_iter()
            .filter(|frame| frame["method"] == "greet_server")
            .count();
        assert_eq!(greets, 1);
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_submit_after_stop_fails() {
        let hub = Hub::start(test_support::state());
        let handle = hub.handle();
        hub.stop().await;

        let (client, _rx) = Socket::new(SocketRole::Client);
        assert!(!handle.submit(&client, "{}".into()).await);
    }
}
