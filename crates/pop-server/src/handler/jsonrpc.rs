//! Entry point for a raw frame read off a socket.

use pop_shared::protocol::{extract_query_id, is_answer_frame, JsonRpcMessage};
use pop_shared::ErrorCode;
use tracing::{debug, error, warn};

use crate::handler::{answer, query};
use crate::state::{AppState, Socket};

pub async fn handle_incoming(state: &AppState, socket: &Socket, payload: &str) {
    let message = match JsonRpcMessage::from_slice(payload.as_bytes()) {
        Ok(message) => message,
        Err(e) => {
            let bytes = payload.as_bytes();
            if is_answer_frame(bytes) {
                debug!(socket = %socket.id(), error = %e, "Dropping malformed answer");
            } else {
                warn!(socket = %socket.id(), error = %e, "Malformed query");
                socket.send_error(extract_query_id(bytes), e);
            }
            return;
        }
    };

    match message {
        JsonRpcMessage::Query(q) => {
            let id = q.id;
            let method = q.method.name();
            match query::handle_query(state, socket, q).await {
                Ok(Some(answer)) => {
                    if id.is_some() {
                        socket.send_answer(&answer);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    if e.code == ErrorCode::InternalServerError {
                        error!(socket = %socket.id(), method, error = %e, "Query failed");
                    } else {
                        debug!(socket = %socket.id(), method, error = %e, "Query rejected");
                    }
                    if id.is_some() {
                        socket.send_error(id, e);
                    }
                }
            }
        }
        JsonRpcMessage::Answer(a) => answer::handle_answer(state, socket, a).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_shared::ServerIdentity;
    use serde_json::json;

    use crate::state::SocketRole;
    use crate::test_support::{self, lao_create};

    fn publish_frame(id: i64, channel: &str, message: &pop_shared::Message) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "publish",
            "params": {"channel": channel, "message": message},
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_publish_answers_success() {
        let state = test_support::state();
        let (client, mut rx) = Socket::new(SocketRole::Organizer);
        let msg = lao_create(&ServerIdentity::generate(), "L");

        handle_incoming(&state, &client, &publish_frame(4, "/root", &msg)).await;

        let frames = test_support::drain(&mut rx);
        assert_eq!(frames, vec![json!({"jsonrpc": "2.0", "id": 4, "result": 0})]);
    }

    #[tokio::test]
    async fn test_failed_query_answers_error_with_its_id() {
        let state = test_support::state();
        let (client, mut rx) = Socket::new(SocketRole::Organizer);
        let msg = lao_create(&ServerIdentity::generate(), "L");

        handle_incoming(&state, &client, &publish_frame(1, "/root", &msg)).await;
        handle_incoming(&state, &client, &publish_frame(2, "/root", &msg)).await;

        let frames = test_support::drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["id"], 2);
        assert_eq!(frames[1]["error"]["code"], -3);
    }

    #[tokio::test]
    async fn test_garbage_gets_error_without_id() {
        let state = test_support::state();
        let (client, mut rx) = Socket::new(SocketRole::Client);

        handle_incoming(&state, &client, "not json").await;
        let frames = test_support::drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0]["id"].is_null());
        assert!(frames[0]["error"].is_object());
    }

    #[tokio::test]
    async fn test_unknown_method_keeps_query_id() {
        let state = test_support::state();
        let (client, mut rx) = Socket::new(SocketRole::Client);

        let frame = json!({"jsonrpc": "2.0", "id": 9, "method": "teleport", "params": {}});
        handle_incoming(&state, &client, &frame.to_string()).await;

        let frames = test_support::drain(&mut rx);
        assert_eq!(frames[0]["id"], 9);
        assert_eq!(frames[0]["error"]["code"], -1);
    }

    #[tokio::test]
    async fn test_server_method_from_client_is_denied() {
        let state = test_support::state();
        let (client, mut rx) = Socket::new(SocketRole::Client);

        let frame = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "rumor_state",
            "params": {"state": {}},
        });
        handle_incoming(&state, &client, &frame.to_string()).await;

        let frames = test_support::drain(&mut rx);
        assert_eq!(frames[0]["error"]["code"], -5);
    }

    #[tokio::test]
    async fn test_answers_are_never_answered() {
        let state = test_support::state();
        let (peer, mut rx) = test_support::server_peer(&state).await;

        handle_incoming(&state, &peer, r#"{"jsonrpc":"2.0","id":77,"result":0}"#).await;
        handle_incoming(&state, &peer, r#"{"jsonrpc":"2.0","id":78,"error":"bad"}"#).await;
        assert!(test_support::drain(&mut rx).is_empty());
    }
}
