//! Heartbeats: periodic digests of known message ids, and pulling whatever
//! a peer's digest shows we are missing.

use std::time::Duration;

use pop_shared::constants::QUERY_TTL_SECS;
use pop_shared::protocol::{ChannelIds, Method, Query};
use pop_shared::PopError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::state::{AppState, Socket};

pub async fn run_heartbeat(state: AppState) {
    info!(period = ?state.config.heartbeat_interval, "Heartbeat sender started");
    let mut ticker = interval(state.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                send_heartbeat(&state).await;
                let pruned = state.queries.prune(Duration::from_secs(QUERY_TTL_SECS)).await;
                if pruned > 0 {
                    debug!(count = pruned, "Pruned expired queries");
                }
            }
        }
    }
    debug!("Heartbeat sender stopped");
}

/// Send the local digest to every peer server. Returns how many got it.
pub async fn send_heartbeat(state: &AppState) -> usize {
    let digest = state.channels.heartbeat_digest();
    if digest.is_empty() {
        return 0;
    }

    let query = Query::notification(Method::Heartbeat(digest));
    match query.to_json() {
        Ok(frame) => state.sockets.send_to_all(&frame).await,
        Err(e) => {
            debug!(error = %e, "Failed to encode heartbeat");
            0
        }
    }
}

/// Answer a heartbeat by asking for the ids we lack, if any.
///
/// Returns the id of the `get_messages_by_id` query sent, or `None` when
/// nothing is missing.
pub async fn handle_heartbeat(
    state: &AppState,
    from: &Socket,
    claimed: &ChannelIds,
) -> Result<Option<i64>, PopError> {
    let missing = state.channels.missing_ids(claimed);
    if missing.is_empty() {
        return Ok(None);
    }

    let id = state.queries.get_next_id();
    let query = Query::new(id, Method::GetMessagesById(missing.clone()));
    let count: usize = missing.values().map(Vec::len).sum();
    state.queries.add_query(id, from.id(), missing).await;
    if let Err(e) = from.send_query(&query) {
        state.queries.remove(id).await;
        return Err(e);
    }

    debug!(peer = %from.id(), query_id = id, missing = count, "Requested missing messages");
    Ok(Some(id))
}
