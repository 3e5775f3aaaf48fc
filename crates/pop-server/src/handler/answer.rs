//! Answers to queries this server sent. Never answered back.

use std::collections::{BTreeMap, HashMap};

use pop_shared::protocol::Answer;
use pop_shared::{Message, PopError, Rumor};
use tracing::{debug, warn};

use crate::gossip;
use crate::handler::message::{apply_messages, retry_deferred, Origin};
use crate::state::{AppState, QueryKind, Socket, SocketRole};

pub async fn handle_answer(state: &AppState, socket: &Socket, answer: Answer) {
    if socket.role() != SocketRole::Server {
        warn!(socket = %socket.id(), role = %socket.role(), "Dropping answer from non-server socket");
        return;
    }
    let Some(id) = answer.id else {
        debug!(socket = %socket.id(), "Dropping answer without id");
        return;
    };
    // Unknown ids, repeats and answers from the wrong socket stop here.
    if !state.queries.set_query_received(id, socket.id()).await {
        return;
    }

    if let Some(rumor) = state.queries.get_rumor_from_past_query(id).await {
        rumor_answer(state, socket, id, answer, rumor).await;
        return;
    }
    match state.queries.kind(id).await {
        Some(QueryKind::GetMessagesById(_)) => messages_answer(state, socket, id, answer).await,
        Some(QueryKind::RumorState(_)) => rumor_state_answer(state, socket, id, answer).await,
        Some(QueryKind::Rumor(_)) | None => {}
    }
}

async fn rumor_answer(state: &AppState, socket: &Socket, id: i64, answer: Answer, rumor: Rumor) {
    let Some(error) = answer.error else {
        debug!(query_id = id, rumor_id = rumor.rumor_id, "Rumor accepted by peer");
        return;
    };

    let err = PopError::from(error);
    if err.is_duplicate() {
        gossip::monger(state, socket.id(), rumor).await;
    } else {
        debug!(
            peer = %socket.id(),
            query_id = id,
            error = %err,
            "Peer refused rumor"
        );
    }
}

async fn messages_answer(state: &AppState, socket: &Socket, id: i64, answer: Answer) {
    let Some(result) = ok_result(socket, id, answer) else {
        return;
    };
    let messages: HashMap<String, Vec<Message>> = match serde_json::from_value(result) {
        Ok(messages) => messages,
        Err(e) => {
            warn!(peer = %socket.id(), query_id = id, error = %e, "Malformed get_messages_by_id answer");
            return;
        }
    };

    let messages: BTreeMap<String, Vec<Message>> = messages.into_iter().collect();
    let stored = apply_messages(state, &messages, Origin::Sync).await;
    let replayed = retry_deferred(state).await;
    debug!(query_id = id, stored = stored + replayed, "Applied missing messages");
}

async fn rumor_state_answer(state: &AppState, socket: &Socket, id: i64, answer: Answer) {
    let Some(result) = ok_result(socket, id, answer) else {
        return;
    };
    let rumors: Vec<Rumor> = match serde_json::from_value(result) {
        Ok(rumors) => rumors,
        Err(e) => {
            warn!(peer = %socket.id(), query_id = id, error = %e, "Malformed rumor_state answer");
            return;
        }
    };

    let received = rumors.len();
    let applied = gossip::apply_rumor_batch(state, rumors).await;
    debug!(query_id = id, received, applied, "Applied rumor_state answer");
}

fn ok_result(socket: &Socket, id: i64, answer: Answer) -> Option<serde_json::Value> {
    if let Some(error) = answer.error {
        warn!(
            peer = %socket.id(),
            query_id = id,
            code = error.code,
            description = %error.description,
            "Peer answered with an error"
        );
        return None;
    }
    answer.result
}
