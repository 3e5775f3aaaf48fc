//! Handlers for incoming queries, one per method.

use pop_shared::constants::ROOT_CHANNEL;
use pop_shared::protocol::{
    Answer, ChannelIds, ChannelParams, GreetServerParams, Method, PublishParams, Query,
    RumorStateParams,
};
use pop_shared::{PopError, Rumor};
use tracing::{debug, info};

use crate::gossip;
use crate::handler::message::{ingest, Origin};
use crate::heartbeat;
use crate::state::{AppState, PeerInfo, Socket, SocketRole};

/// Run one query. `Ok(None)` means nothing is sent back.
pub async fn handle_query(
    state: &AppState,
    socket: &Socket,
    query: Query,
) -> Result<Option<Answer>, PopError> {
    let id = query.id;
    if query.method.is_server_only() && socket.role() != SocketRole::Server {
        return Err(PopError::access_denied(format_args!(
            "{} is reserved to servers, not {}",
            query.method.name(),
            socket.role()
        )));
    }

    match query.method {
        Method::Subscribe(params) => subscribe(state, socket, id, params).await.map(Some),
        Method::Unsubscribe(params) => unsubscribe(state, socket, id, params).await.map(Some),
        Method::Catchup(params) => catchup(state, id, params).map(Some),
        Method::Publish(params) => publish(state, id, params).await.map(Some),
        Method::Broadcast(params) => broadcast(state, params).await.map(|_| None),
        Method::GetMessagesById(ids) => Ok(Some(get_messages_by_id(state, id, &ids))),
        Method::Heartbeat(ids) => heartbeat::handle_heartbeat(state, socket, &ids)
            .await
            .map(|_| None),
        Method::GreetServer(params) => greet_server(state, socket, params).await.map(|_| None),
        Method::Rumor(rumor) => rumor_query(state, socket, id, rumor).await.map(Some),
        Method::RumorState(params) => Ok(Some(rumor_state(state, id, &params))),
    }
}

async fn subscribe(
    state: &AppState,
    socket: &Socket,
    id: Option<i64>,
    params: ChannelParams,
) -> Result<Answer, PopError> {
    if params.channel == ROOT_CHANNEL {
        return Err(PopError::invalid_action("cannot subscribe to the root channel"));
    }
    state
        .subscribers
        .subscribe(&params.channel, socket.clone())
        .await?;
    debug!(socket = %socket.id(), channel = %params.channel, "Subscribed");
    Ok(Answer::success(id))
}

async fn unsubscribe(
    state: &AppState,
    socket: &Socket,
    id: Option<i64>,
    params: ChannelParams,
) -> Result<Answer, PopError> {
    if params.channel == ROOT_CHANNEL {
        return Err(PopError::invalid_action("cannot unsubscribe from the root channel"));
    }
    state
        .subscribers
        .unsubscribe(&params.channel, socket.id())
        .await?;
    debug!(socket = %socket.id(), channel = %params.channel, "Unsubscribed");
    Ok(Answer::success(id))
}

fn catchup(state: &AppState, id: Option<i64>, params: ChannelParams) -> Result<Answer, PopError> {
    let messages = state.channels.inbox(&params.channel)?.get_sorted_messages();
    Ok(Answer::messages(id, &messages))
}

async fn publish(
    state: &AppState,
    id: Option<i64>,
    params: PublishParams,
) -> Result<Answer, PopError> {
    ingest(state, &params.channel, params.message, Origin::Publish).await?;
    Ok(Answer::success(id))
}

async fn broadcast(state: &AppState, params: PublishParams) -> Result<(), PopError> {
    ingest(state, &params.channel, params.message, Origin::Broadcast).await?;
    Ok(())
}

fn get_messages_by_id(state: &AppState, id: Option<i64>, ids: &ChannelIds) -> Answer {
    Answer::messages_by_channel(id, &state.channels.find_messages(ids))
}

/// Send our `greet_server` on `socket` unless already done.
pub async fn send_greet(state: &AppState, socket: &Socket) -> Result<bool, PopError> {
    if !state.peers.mark_greeted(socket.id()).await {
        return Ok(false);
    }
    let greet = Query::notification(Method::GreetServer(GreetServerParams {
        public_key: state.identity.public_key(),
        client_address: state.config.public_client_url.clone(),
        server_address: state.config.public_server_url.clone(),
    }));
    socket.send_query(&greet)?;
    Ok(true)
}

async fn greet_server(
    state: &AppState,
    socket: &Socket,
    params: GreetServerParams,
) -> Result<(), PopError> {
    let info = PeerInfo::from(params);
    info!(
        socket = %socket.id(),
        public_key = %info.public_key,
        server = %info.server_address,
        "Peer server greeted us"
    );
    state.peers.add_peer_info(socket.id(), info).await?;

    send_greet(state, socket).await?;
    // Handshake complete: catch up on whatever the peer knows.
    gossip::send_rumor_state(state, Some(socket.clone())).await;
    Ok(())
}

async fn rumor_query(
    state: &AppState,
    socket: &Socket,
    id: Option<i64>,
    rumor: Rumor,
) -> Result<Answer, PopError> {
    gossip::handle_rumor(state, socket, rumor).await?;
    Ok(Answer::success(id))
}

fn rumor_state(state: &AppState, id: Option<i64>, params: &RumorStateParams) -> Answer {
    let rumors = state.rumors.rumors_missing_from(&params.state);
    debug!(count = rumors.len(), "Answering rumor_state");
    Answer::rumors(id, &rumors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_shared::protocol::PublishParams;
    use pop_shared::{ErrorCode, RumorTimestamp, ServerIdentity};
    use serde_json::json;

    use crate::test_support::{self, chirp, lao_create};

    fn query(method: Method) -> Query {
        Query::new(1, method)
    }

    fn channel(path: &str) -> ChannelParams {
        ChannelParams {
            channel: path.into(),
        }
    }

    async fn with_lao(state: &AppState, organizer: &ServerIdentity) {
        let (client, _rx) = Socket::new(SocketRole::Organizer);
        handle_query(
            state,
            &client,
            query(Method::Publish(PublishParams {
                channel: "/root".into(),
                message: lao_create(organizer, "L"),
            })),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_server_methods_need_server_socket() {
        let state = test_support::state();
        let (client, _rx) = Socket::new(SocketRole::Client);

        let err = handle_query(&state, &client, query(Method::Heartbeat(ChannelIds::new())))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);

        let err = handle_query(
            &state,
            &client,
            query(Method::RumorState(RumorStateParams {
                state: RumorTimestamp::new(),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);
    }

    #[tokio::test]
    async fn test_subscribe_root_is_refused() {
        let state = test_support::state();
        let (client, _rx) = Socket::new(SocketRole::Client);
        let err = handle_query(&state, &client, query(Method::Subscribe(channel("/root"))))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAction);
    }

    #[tokio::test]
    async fn test_publish_subscribe_catchup() {
        let state = test_support::state();
        let organizer = ServerIdentity::generate();
        with_lao(&state, &organizer).await;

        let (client, mut rx) = Socket::new(SocketRole::Client);
        let answer = handle_query(
            &state,
            &client,
            query(Method::Subscribe(channel("/root/L/social/chirps"))),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(answer.result, Some(json!(0)));

        let first = chirp(&organizer, "one");
        let second = chirp(&organizer, "two");
        for msg in [&first, &second] {
            handle_query(
                &state,
                &client,
                query(Method::Publish(PublishParams {
                    channel: "/root/L/social/chirps".into(),
                    message: msg.clone(),
                })),
            )
            .await
            .unwrap();
        }
        assert_eq!(test_support::drain(&mut rx).len(), 2);

        let answer = handle_query(
            &state,
            &client,
            query(Method::Catchup(channel("/root/L/social/chirps"))),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(answer.result, Some(json!([first, second])));
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_subscription() {
        let state = test_support::state();
        with_lao(&state, &ServerIdentity::generate()).await;
        let (client, _rx) = Socket::new(SocketRole::Client);

        let err = handle_query(&state, &client, query(Method::Unsubscribe(channel("/root/L"))))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAction);

        let err = handle_query(&state, &client, query(Method::Catchup(channel("/root/X"))))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidResource);
    }

    #[tokio::test]
    async fn test_get_messages_by_id() {
        let state = test_support::state();
        let organizer = ServerIdentity::generate();
        with_lao(&state, &organizer).await;
        let lao_msg = state.channels.inbox("/root").unwrap().get_sorted_messages();

        let (peer, _rx) = test_support::server_peer(&state).await;
        let ids = ChannelIds::from([(
            "/root".to_string(),
            vec![lao_msg[0].message_id.clone(), "unknown".to_string()],
        )]);
        let answer = handle_query(&state, &peer, query(Method::GetMessagesById(ids)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answer.result, Some(json!({"/root": [lao_msg[0]]})));
    }

    #[tokio::test]
    async fn test_greet_server_handshake() {
        let state = test_support::state();
        let (peer, mut rx) = test_support::server_peer(&state).await;
        let params = GreetServerParams {
            public_key: ServerIdentity::generate().public_key(),
            client_address: "ws://peer:9000/client".into(),
            server_address: "ws://peer:9001/server".into(),
        };

        let answer = handle_query(
            &state,
            &peer,
            Query::notification(Method::GreetServer(params.clone())),
        )
        .await
        .unwrap();
        assert!(answer.is_none());

        let frames = test_support::drain(&mut rx);
        let methods: Vec<_> = frames.iter().map(|f| f["method"].clone()).collect();
        assert_eq!(methods, vec![json!("greet_server"), json!("rumor_state")]);
        assert_eq!(
            frames[0]["params"]["public_key"],
            state.identity.public_key().as_str()
        );

        let err = handle_query(&state, &peer, Query::notification(Method::GreetServer(params)))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAction);
    }

    #[tokio::test]
    async fn test_greet_back_only_once() {
        let state = test_support::state();
        let (peer, mut rx) = test_support::server_peer(&state).await;
        assert!(send_greet(&state, &peer).await.unwrap());
        assert!(!send_greet(&state, &peer).await.unwrap());
        test_support::drain(&mut rx);

        let params = GreetServerParams {
            public_key: "K".into(),
            client_address: "c".into(),
            server_address: "s".into(),
        };
        handle_query(&state, &peer, Query::notification(Method::GreetServer(params)))
            .await
            .unwrap();
        let frames = test_support::drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["method"], "rumor_state");
    }

    #[tokio::test]
    async fn test_rumor_state_answer() {
        let state = test_support::state();
        let organizer = ServerIdentity::generate();
        with_lao(&state, &organizer).await;
        state.rumors.take_next_rumor().unwrap();

        let (peer, _rx) = test_support::server_peer(&state).await;
        let answer = handle_query(
            &state,
            &peer,
            query(Method::RumorState(RumorStateParams {
                state: RumorTimestamp::new(),
            })),
        )
        .await
        .unwrap()
        .unwrap();

        let rumors = answer.result.unwrap();
        assert_eq!(rumors.as_array().unwrap().len(), 1);
        assert_eq!(rumors[0]["rumor_id"], 0);
    }

    #[tokio::test]
    async fn test_rumor_query_is_acknowledged() {
        let state = test_support::state();
        let (peer, _rx) = test_support::server_peer(&state).await;
        let rumor = Rumor {
            sender_id: "peer".into(),
            rumor_id: 0,
            timestamp: RumorTimestamp::new(),
            messages: [("/root".to_string(), vec![lao_create(&ServerIdentity::generate(), "L")])]
                .into_iter()
                .collect(),
        };

        let answer = handle_query(&state, &peer, query(Method::Rumor(rumor.clone())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answer.result, Some(json!(0)));

        let err = handle_query(&state, &peer, query(Method::Rumor(rumor)))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }
}
