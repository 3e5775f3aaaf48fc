//! Rumor gossip between servers.
//!
//! - Local messages accumulate in the rumor log's buffer; the rumor sender
//!   flushes them as one rumor on every tick (or earlier when reset) and
//!   sends it to one random peer.
//! - An incoming rumor is checked against the local vector, applied through
//!   the message pipeline, recorded, then forwarded to another peer.
//! - A `DuplicateResource` answer to a rumor triggers mongering: stop with
//!   the configured probability, otherwise resend to another peer.
//! - `rumor_state` lets a peer fetch every rumor its vector does not cover.

use pop_shared::protocol::{Method, Query, RumorStateParams};
use pop_shared::rumor::sort_causally;
use pop_shared::{PopError, Rumor};
use pop_store::SequenceCheck;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::handler::message::{apply_messages, retry_deferred, Origin};
use crate::state::{AppState, Socket};
use crate::ticker::ResettableTicker;

pub async fn run_rumor_sender(state: AppState, mut ticker: ResettableTicker) {
    info!(period = ?state.config.rumor_interval, "Rumor sender started");
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                try_send_rumor(&state).await;
            }
        }
    }
    debug!("Rumor sender stopped");
}

/// Flush buffered local messages into a rumor and send it.
pub async fn try_send_rumor(state: &AppState) -> Option<i64> {
    let rumor = state.rumors.take_next_rumor()?;
    send_rumor(state, rumor, None).await
}

/// Send `rumor` to a random peer other than `exclude`, as a new query.
///
/// Returns the query id, or `None` when no peer is connected. The rumor
/// stays in the log either way, so `rumor_state` can still deliver it.
pub async fn send_rumor(state: &AppState, rumor: Rumor, exclude: Option<&str>) -> Option<i64> {
    let Some(peer) = state.sockets.pick_random(exclude, state.coin.as_ref()).await else {
        debug!(
            sender = %rumor.sender_id,
            rumor_id = rumor.rumor_id,
            "No peer to send rumor to"
        );
        return None;
    };

    let id = state.queries.get_next_id();
    let query = Query::new(id, Method::Rumor(rumor.clone()));
    state.queries.add_rumor_query(id, peer.id(), rumor.clone()).await;

    if let Err(e) = peer.send_query(&query) {
        warn!(peer = %peer.id(), error = %e, "Failed to send rumor");
        state.queries.remove(id).await;
        return None;
    }
    debug!(
        peer = %peer.id(),
        query_id = id,
        sender = %rumor.sender_id,
        rumor_id = rumor.rumor_id,
        "Sent rumor"
    );
    Some(id)
}

/// Apply a rumor received from a peer.
///
/// Fails with `DuplicateResource` when it was already applied and with
/// `InvalidResource` when earlier rumors it depends on are missing.
pub async fn apply_rumor(state: &AppState, rumor: Rumor) -> Result<usize, PopError> {
    match state.rumors.check_sequence(&rumor.sender_id, rumor.rumor_id) {
        SequenceCheck::Next => {}
        SequenceCheck::Duplicate => {
            return Err(PopError::duplicate_resource(format_args!(
                "rumor {} from {} already applied",
                rumor.rumor_id, rumor.sender_id
            )))
        }
        SequenceCheck::Gap { expected } => {
            return Err(PopError::invalid_resource(format_args!(
                "rumor {} from {} is out of order, expected {expected}",
                rumor.rumor_id, rumor.sender_id
            )))
        }
    }

    if !state.rumors.is_valid(&rumor.timestamp) {
        return Err(PopError::invalid_resource(format_args!(
            "rumor {} from {} depends on rumors not received yet",
            rumor.rumor_id, rumor.sender_id
        )));
    }

    let stored = apply_messages(state, &rumor.messages, Origin::Rumor).await;
    let (sender, rumor_id) = (rumor.sender_id.clone(), rumor.rumor_id);
    state.rumors.record(rumor)?;
    let replayed = retry_deferred(state).await;

    info!(
        sender = %sender,
        rumor_id,
        stored = stored + replayed,
        "Applied rumor"
    );
    Ok(stored + replayed)
}

/// `rumor` query from the peer on `from`: apply, then pass it on.
pub async fn handle_rumor(state: &AppState, from: &Socket, rumor: Rumor) -> Result<(), PopError> {
    apply_rumor(state, rumor.clone()).await?;
    send_rumor(state, rumor, Some(from.id())).await;
    Ok(())
}

/// A peer answered a rumor with `DuplicateResource`.
///
/// Flips the coin once: either stop, or resend to a peer other than the
/// one that already had it. Returns the new query id if resent.
pub async fn monger(state: &AppState, answered_by: &str, rumor: Rumor) -> Option<i64> {
    if !state.coin.keep_mongering() {
        debug!(
            sender = %rumor.sender_id,
            rumor_id = rumor.rumor_id,
            "Stopped mongering rumor"
        );
        return None;
    }
    send_rumor(state, rumor, Some(answered_by)).await
}

/// Ask `target` (or a random peer) for the rumors our vector lacks.
pub async fn send_rumor_state(state: &AppState, target: Option<Socket>) -> Option<i64> {
    let peer = match target {
        Some(peer) => peer,
        None => state.sockets.pick_random(None, state.coin.as_ref()).await?,
    };

    let id = state.queries.get_next_id();
    let vector = state.rumors.timestamp();
    let query = Query::new(
        id,
        Method::RumorState(RumorStateParams {
            state: vector.clone(),
        }),
    );
    state.queries.add_rumor_state_query(id, peer.id(), vector).await;

    if let Err(e) = peer.send_query(&query) {
        warn!(peer = %peer.id(), error = %e, "Failed to send rumor_state");
        state.queries.remove(id).await;
        return None;
    }
    debug!(peer = %peer.id(), query_id = id, "Sent rumor_state");
    Some(id)
}

/// Apply the rumors of a `rumor_state` answer in causal order.
pub async fn apply_rumor_batch(state: &AppState, rumors: Vec<Rumor>) -> usize {
    let mut applied = 0;
    for rumor in sort_causally(rumors) {
        let (sender, rumor_id) = (rumor.sender_id.clone(), rumor.rumor_id);
        match apply_rumor(state, rumor).await {
            Ok(_) => applied += 1,
            Err(e) if e.is_duplicate() => {}
            Err(e) => {
                debug!(sender = %sender, rumor_id, error = %e, "Skipped rumor from state answer")
            }
        }
    }
    applied
}

pub async fn run_rumor_state(state: AppState) {
    let mut ticker = interval(state.config.rumor_state_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.reset();
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                send_rumor_state(&state, None).await;
            }
        }
    }
    debug!("Rumor state sync stopped");
}
