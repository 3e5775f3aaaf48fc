//! The message pipeline shared by publish, broadcast, rumors and catch-up.
//!
//! verify -> duplicate gate -> channel type -> channel handler -> new
//! channels -> store -> witness side effect -> fan-out. Storage and
//! broadcast only happen once the handler accepted the message.

use std::collections::BTreeMap;

use pop_shared::protocol::{Method, PublishParams, Query};
use pop_shared::{ErrorCode, Message, MessageData, PopError};
use tracing::{debug, warn};

use crate::state::AppState;

/// Where a message came from; decides how duplicates are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A client `publish`; joins the next own rumor.
    Publish,
    /// A peer's `broadcast`.
    Broadcast,
    /// Carried by a rumor.
    Rumor,
    /// Pulled by `get_messages_by_id` or replayed from the deferred queue.
    Sync,
}

impl Origin {
    fn tolerates_duplicates(self) -> bool {
        matches!(self, Self::Rumor | Self::Sync)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Stored,
    AlreadyKnown,
}

pub async fn ingest(
    state: &AppState,
    channel: &str,
    message: Message,
    origin: Origin,
) -> Result<Ingested, PopError> {
    message.verify()?;

    let inbox = state.channels.inbox(channel)?;
    if inbox.has_message(&message.message_id) {
        return duplicate(&message, origin);
    }

    let kind = state.channels.channel_type(channel)?;
    let data = MessageData::decode(&message.raw_data()?)?;
    let outcome = state.handlers.handle(kind, channel, &message, &data)?;

    if !outcome.new_channels.is_empty() {
        state.channels.add_channels(&outcome.new_channels)?;
        for (path, _) in &outcome.new_channels {
            if let Err(e) = state.subscribers.add_channel(path).await {
                warn!(channel = %path, error = %e, "Subscriber set already present");
            }
        }
    }

    if !inbox.store_message(message.clone()) {
        // Lost a race with a concurrent copy of the same message.
        return duplicate(&message, origin);
    }

    if let MessageData::Witness {
        message_id,
        signature,
    } = &data
    {
        inbox.add_witness_signature(message_id, &message.sender, signature);
    }

    debug!(
        channel = %channel,
        message_id = %message.message_id,
        origin = ?origin,
        "Message stored"
    );

    let broadcast = Query::notification(Method::Broadcast(PublishParams {
        channel: channel.to_string(),
        message: message.clone(),
    }));
    state
        .subscribers
        .send_to_all(channel, &broadcast.to_json()?)
        .await?;

    if origin == Origin::Publish {
        let buffered = state.rumors.add_pending(channel, message);
        if buffered >= state.config.max_rumor_messages {
            state.rumor_reset.notify();
        }
    }

    Ok(Ingested::Stored)
}

fn duplicate(message: &Message, origin: Origin) -> Result<Ingested, PopError> {
    if origin.tolerates_duplicates() {
        Ok(Ingested::AlreadyKnown)
    } else {
        Err(PopError::duplicate_resource(format_args!(
            "message {} already exists",
            message.message_id
        )))
    }
}

/// Ingest a batch from a peer. Messages whose channel does not exist yet
/// are deferred; other failures are logged and dropped.
///
/// Returns the number of newly stored messages.
pub async fn apply_messages(
    state: &AppState,
    messages: &BTreeMap<String, Vec<Message>>,
    origin: Origin,
) -> usize {
    let mut stored = 0;
    // Path order visits a parent channel before the channels it creates.
    for (channel, batch) in messages {
        for message in batch {
            match ingest(state, channel, message.clone(), origin).await {
                Ok(Ingested::Stored) => stored += 1,
                Ok(Ingested::AlreadyKnown) => {}
                Err(e) => defer_or_drop(state, channel, message, e),
            }
        }
    }
    stored
}

fn defer_or_drop(state: &AppState, channel: &str, message: &Message, err: PopError) {
    if err.code == ErrorCode::InvalidResource {
        debug!(
            channel = %channel,
            message_id = %message.message_id,
            "Deferring message until its channel exists"
        );
        state.deferred.push(channel, message.clone());
    } else if !err.is_duplicate() {
        warn!(
            channel = %channel,
            message_id = %message.message_id,
            error = %err,
            "Dropping message from peer"
        );
    }
}

/// Retry deferred messages until a pass stores nothing new.
pub async fn retry_deferred(state: &AppState) -> usize {
    let mut total = 0;
    loop {
        let batch = state.deferred.drain();
        if batch.is_empty() {
            break;
        }

        let mut progress = 0;
        for (channel, message) in batch {
            match ingest(state, &channel, message.clone(), Origin::Sync).await {
                Ok(Ingested::Stored) => progress += 1,
                Ok(Ingested::AlreadyKnown) => {}
                Err(e) if e.code == ErrorCode::InvalidResource => {
                    state.deferred.push(&channel, message);
                }
                Err(e) => defer_or_drop(state, &channel, &message, e),
            }
        }

        total += progress;
        if progress == 0 {
            break;
        }
    }
    if total > 0 {
        debug!(count = total, pending = state.deferred.len(), "Applied deferred messages");
    }
    total
}
