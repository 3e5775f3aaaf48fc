//! Fixtures shared by the unit tests.

use std::sync::Arc;

use pop_shared::{Message, ServerIdentity};
use serde_json::{json, Value};
use tokio::sync::mpsc::Receiver;

use crate::coin::{Coin, ScriptedCoin};
use crate::config::ServerConfig;
use crate::state::{AppState, Socket, SocketRole};

pub fn state() -> AppState {
    state_with(ServerConfig::default(), never_mongers())
}

pub fn state_with<C: Coin + 'static>(config: ServerConfig, coin: Arc<C>) -> AppState {
    AppState::new(config, ServerIdentity::generate(), coin)
}

pub fn never_mongers() -> Arc<ScriptedCoin> {
    Arc::new(ScriptedCoin::new([], false))
}

pub fn signed(identity: &ServerIdentity, data: Value) -> Message {
    Message::new_signed(data.to_string().as_bytes(), identity)
}

pub fn lao_create(identity: &ServerIdentity, id: &str) -> Message {
    signed(
        identity,
        json!({"object": "lao", "action": "create", "id": id, "name": "demo"}),
    )
}

pub fn chirp(identity: &ServerIdentity, text: &str) -> Message {
    signed(identity, json!({"object": "chirp", "action": "add", "text": text}))
}

/// Every frame queued on a socket so far, parsed.
pub fn drain(rx: &mut Receiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let Ok(value) = serde_json::from_str(&frame) {
            frames.push(value);
        }
    }
    frames
}

/// A peer server connection registered with `state`.
pub async fn server_peer(state: &AppState) -> (Socket, Receiver<String>) {
    let (socket, rx) = Socket::new(SocketRole::Server);
    state.sockets.upsert(socket.clone()).await;
    (socket, rx)
}
