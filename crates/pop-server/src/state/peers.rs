//! Federated peer tracking.
//!
//! Keeps what each peer server announced in its `greet_server` and whether
//! this server already greeted that connection.

use std::collections::{HashMap, HashSet};

use pop_shared::protocol::GreetServerParams;
use pop_shared::PopError;
use tokio::sync::RwLock;
use tracing::debug;

/// What a peer server announced about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub public_key: String,
    pub client_address: String,
    pub server_address: String,
}

impl From<GreetServerParams> for PeerInfo {
    fn from(params: GreetServerParams) -> Self {
        Self {
            public_key: params.public_key,
            client_address: params.client_address,
            server_address: params.server_address,
        }
    }
}

#[derive(Debug, Default)]
struct PeersInner {
    infos: HashMap<String, PeerInfo>,
    greeted: HashSet<String>,
}

/// Peer servers keyed by socket id.
#[derive(Debug, Default)]
pub struct Peers {
    inner: RwLock<PeersInner>,
}

impl Peers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the greeting of the peer on `socket_id`; only one per connection.
    pub async fn add_peer_info(&self, socket_id: &str, info: PeerInfo) -> Result<(), PopError> {
        let mut inner = self.inner.write().await;
        if inner.infos.contains_key(socket_id) {
            return Err(PopError::invalid_action(format_args!(
                "peer on socket {socket_id} already greeted this server"
            )));
        }
        debug!(
            socket = %socket_id,
            public_key = %info.public_key,
            server = %info.server_address,
            "Tracking new peer"
        );
        inner.infos.insert(socket_id.to_string(), info);
        Ok(())
    }

    /// Mark `socket_id` as greeted. Returns `false` if it already was.
    pub async fn mark_greeted(&self, socket_id: &str) -> bool {
        self.inner.write().await.greeted.insert(socket_id.to_string())
    }

    pub async fn is_greeted(&self, socket_id: &str) -> bool {
        self.inner.read().await.greeted.contains(socket_id)
    }

    pub async fn get(&self, socket_id: &str) -> Option<PeerInfo> {
        self.inner.read().await.infos.get(socket_id).cloned()
    }

    /// Forget a peer whose connection closed.
    pub async fn remove(&self, socket_id: &str) {
        let mut inner = self.inner.write().await;
        inner.greeted.remove(socket_id);
        if inner.infos.remove(socket_id).is_some() {
            debug!(socket = %socket_id, "Removed peer");
        }
    }

    pub async fn peer_infos(&self) -> Vec<PeerInfo> {
        self.inner.read().await.infos.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_shared::ErrorCode;

    fn info(key: &str) -> PeerInfo {
        PeerInfo {
            public_key: key.into(),
            client_address: "ws://peer:9000/client".into(),
            server_address: "ws://peer:9001/server".into(),
        }
    }

    #[tokio::test]
    async fn test_second_greeting_is_rejected() {
        let peers = Peers::new();
        peers.add_peer_info("s1", info("K")).await.unwrap();
        let err = peers.add_peer_info("s1", info("K")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAction);
        assert_eq!(peers.peer_infos().await, vec![info("K")]);
    }

    #[tokio::test]
    async fn test_greeted_once() {
        let peers = Peers::new();
        assert!(!peers.is_greeted("s1").await);
        assert!(peers.mark_greeted("s1").await);
        assert!(!peers.mark_greeted("s1").await);
        assert!(peers.is_greeted("s1").await);
    }

    #[tokio::test]
    async fn test_remove_forgets_everything() {
        let peers = Peers::new();
        peers.add_peer_info("s1", info("K")).await.unwrap();
        peers.mark_greeted("s1").await;

        peers.remove("s1").await;
        assert!(peers.get("s1").await.is_none());
        assert!(!peers.is_greeted("s1").await);
        peers.add_peer_info("s1", info("K")).await.unwrap();
    }
}
