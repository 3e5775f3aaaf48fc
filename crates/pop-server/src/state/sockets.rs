//! Connection handles and the registry of server-to-server sockets.

use std::collections::HashMap;

use pop_shared::constants::SOCKET_QUEUE_SIZE;
use pop_shared::protocol::{Answer, Query};
use pop_shared::PopError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::coin::Coin;

/// Who is on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    Client,
    Organizer,
    Witness,
    Server,
}

impl std::fmt::Display for SocketRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Client => "client",
            Self::Organizer => "organizer",
            Self::Witness => "witness",
            Self::Server => "server",
        };
        f.write_str(name)
    }
}

/// Sending half of a connection. The transport owns the receiving end and
/// writes whatever arrives on it to the wire.
#[derive(Debug, Clone)]
pub struct Socket {
    id: String,
    role: SocketRole,
    tx: mpsc::Sender<String>,
}

impl Socket {
    pub fn new(role: SocketRole) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SOCKET_QUEUE_SIZE);
        let socket = Self {
            id: Uuid::new_v4().to_string(),
            role,
            tx,
        };
        (socket, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> SocketRole {
        self.role
    }

    /// Queue a frame without waiting. Returns `false` if it was dropped.
    pub fn send(&self, frame: String) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(socket = %self.id, "Outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(socket = %self.id, "Socket closed, dropping frame");
                false
            }
        }
    }

    /// Queue a query. Fails when the frame could not be queued.
    pub fn send_query(&self, query: &Query) -> Result<(), PopError> {
        if !self.send(query.to_json()?) {
            return Err(PopError::internal(format_args!(
                "socket {} did not accept {}",
                self.id,
                query.method.name()
            )));
        }
        Ok(())
    }

    pub fn send_answer(&self, answer: &Answer) {
        match answer.to_json() {
            Ok(frame) => {
                self.send(frame);
            }
            Err(e) => warn!(socket = %self.id, error = %e, "Failed to encode answer"),
        }
    }

    pub fn send_error(&self, id: Option<i64>, err: PopError) {
        self.send_answer(&Answer::error(id, err));
    }
}

/// Connected peer servers, keyed by socket id.
#[derive(Debug, Default)]
pub struct Sockets {
    sockets: RwLock<HashMap<String, Socket>>,
}

impl Sockets {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, socket: Socket) {
        self.sockets
            .write()
            .await
            .insert(socket.id().to_string(), socket);
    }

    pub async fn remove(&self, socket_id: &str) -> bool {
        self.sockets.write().await.remove(socket_id).is_some()
    }

    pub async fn get(&self, socket_id: &str) -> Option<Socket> {
        self.sockets.read().await.get(socket_id).cloned()
    }

    pub async fn send_to_all(&self, frame: &str) -> usize {
        let sockets: Vec<Socket> = self.sockets.read().await.values().cloned().collect();
        sockets
            .iter()
            .filter(|socket| socket.send(frame.to_string()))
            .count()
    }

    /// A random server socket other than `exclude`.
    pub async fn pick_random(&self, exclude: Option<&str>, coin: &dyn Coin) -> Option<Socket> {
        let sockets = self.sockets.read().await;
        let mut candidates: Vec<&Socket> = sockets
            .values()
            .filter(|socket| Some(socket.id()) != exclude)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        // Sorted so a scripted coin picks deterministically.
        candidates.sort_by(|a, b| a.id().cmp(b.id()));
        let index = coin.pick(candidates.len()).min(candidates.len() - 1);
        Some(candidates[index].clone())
    }

    pub async fn len(&self) -> usize {
        self.sockets.read().await.len()
    }
}
