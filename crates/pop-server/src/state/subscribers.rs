use std::collections::HashMap;

use pop_shared::constants::ROOT_CHANNEL;
use pop_shared::PopError;
use tokio::sync::RwLock;
use tracing::debug;

use super::sockets::Socket;

/// Per-channel subscriber sets used for broadcast fan-out.
#[derive(Debug)]
pub struct Subscribers {
    channels: RwLock<HashMap<String, HashMap<String, Socket>>>,
}

impl Default for Subscribers {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscribers {
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        channels.insert(ROOT_CHANNEL.to_string(), HashMap::new());
        Self {
            channels: RwLock::new(channels),
        }
    }

    pub async fn add_channel(&self, path: &str) -> Result<(), PopError> {
        let mut channels = self.channels.write().await;
        if channels.contains_key(path) {
            return Err(PopError::duplicate_resource(format_args!(
                "channel {path} already exists"
            )));
        }
        channels.insert(path.to_string(), HashMap::new());
        Ok(())
    }

    pub async fn has_channel(&self, path: &str) -> bool {
        self.channels.read().await.contains_key(path)
    }

    pub async fn subscribe(&self, path: &str, socket: Socket) -> Result<(), PopError> {
        let mut channels = self.channels.write().await;
        let subscribers = channels
            .get_mut(path)
            .ok_or_else(|| unknown_channel(path))?;
        subscribers.insert(socket.id().to_string(), socket);
        Ok(())
    }

    pub async fn unsubscribe(&self, path: &str, socket_id: &str) -> Result<(), PopError> {
        let mut channels = self.channels.write().await;
        let subscribers = channels
            .get_mut(path)
            .ok_or_else(|| unknown_channel(path))?;
        if subscribers.remove(socket_id).is_none() {
            return Err(PopError::invalid_action(format_args!(
                "socket {socket_id} is not subscribed to {path}"
            )));
        }
        Ok(())
    }

    pub async fn unsubscribe_from_all(&self, socket_id: &str) {
        let mut channels = self.channels.write().await;
        let mut removed = 0;
        for subscribers in channels.values_mut() {
            if subscribers.remove(socket_id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(socket = %socket_id, channels = removed, "Unsubscribed closed socket");
        }
    }

    /// Send `frame` to every current subscriber of `path`.
    ///
    /// Returns how many sockets accepted it.
    pub async fn send_to_all(&self, path: &str, frame: &str) -> Result<usize, PopError> {
        let subscribers: Vec<Socket> = {
            let channels = self.channels.read().await;
            channels
                .get(path)
                .ok_or_else(|| unknown_channel(path))?
                .values()
                .cloned()
                .collect()
        };

        Ok(subscribers
            .iter()
            .filter(|socket| socket.send(frame.to_string()))
            .count())
    }

    pub async fn subscriber_count(&self, path: &str) -> usize {
        self.channels
            .read()
            .await
            .get(path)
            .map_or(0, HashMap::len)
    }
}

fn unknown_channel(path: &str) -> PopError {
    PopError::invalid_resource(format_args!("channel {path} does not exist"))
}
