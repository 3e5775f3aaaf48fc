//! Process-wide server state.
//!
//! Every component is constructed once in [`AppState::new`] and shared by
//! reference with each handler. Each one carries its own lock; no lock is
//! held across components.

pub mod peers;
pub mod queries;
pub mod sockets;
pub mod subscribers;

use std::sync::Arc;

use pop_shared::ServerIdentity;
use pop_store::{ChannelStore, DeferredMessages, RumorLog};
use tokio_util::sync::CancellationToken;

use crate::coin::Coin;
use crate::config::ServerConfig;
use crate::handler::channel::ChannelHandlers;
use crate::ticker::ResetHandle;

pub use peers::{PeerInfo, Peers};
pub use queries::{Queries, QueryKind, QueryState};
pub use sockets::{Socket, SocketRole, Sockets};
pub use subscribers::Subscribers;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub identity: Arc<ServerIdentity>,
    pub channels: Arc<ChannelStore>,
    pub rumors: Arc<RumorLog>,
    pub deferred: Arc<DeferredMessages>,
    pub subscribers: Arc<Subscribers>,
    pub peers: Arc<Peers>,
    pub queries: Arc<Queries>,
    pub sockets: Arc<Sockets>,
    pub handlers: Arc<ChannelHandlers>,
    pub coin: Arc<dyn Coin>,
    /// Fires the rumor sender before its next tick.
    pub rumor_reset: ResetHandle,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig, identity: ServerIdentity, coin: Arc<dyn Coin>) -> Self {
        let handlers = ChannelHandlers::new(config.owner_public_key.clone());
        Self {
            rumors: Arc::new(RumorLog::new(identity.public_key())),
            config: Arc::new(config),
            identity: Arc::new(identity),
            channels: Arc::new(ChannelStore::new()),
            deferred: Arc::new(DeferredMessages::new()),
            subscribers: Arc::new(Subscribers::new()),
            peers: Arc::new(Peers::new()),
            queries: Arc::new(Queries::new()),
            sockets: Arc::new(Sockets::new()),
            handlers: Arc::new(handlers),
            coin,
            rumor_reset: ResetHandle::new(),
            shutdown: CancellationToken::new(),
        }
    }
}
