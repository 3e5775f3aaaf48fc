//! # pop-store
//!
//! In-memory storage engines for the server node.
//!
//! - [`Inbox`]: per-channel append-only message store with a side table for
//!   witness signatures that arrive before their message.
//! - [`ChannelStore`]: channel path to channel type and inbox.
//! - [`RumorLog`]: every rumor applied so far, the local vector timestamp,
//!   and the buffer of local messages not yet sent as a rumor.
//! - [`DeferredMessages`]: messages waiting for a dependency to arrive.
//!
//! Each engine owns its own lock; no operation spans two engines.

pub mod channels;
pub mod deferred;
pub mod inbox;
pub mod rumors;

mod error;
mod sync;

pub use channels::ChannelStore;
pub use deferred::DeferredMessages;
pub use error::{Result, StoreError};
pub use inbox::Inbox;
pub use rumors::{RumorLog, SequenceCheck};
