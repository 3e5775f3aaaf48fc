//! JSON-RPC 2.0 envelope.
//!
//! Queries are `{jsonrpc, method, id?, params}`, answers are
//! `{jsonrpc, id, result | error}`. A frame is classified once by
//! [`JsonRpcMessage::from_slice`] and then handled as a typed value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::constants::JSONRPC_VERSION;
use crate::error::{ErrorCode, PopError};
use crate::rumor::{Rumor, RumorTimestamp};
use crate::types::Message;

/// Channel path to message ids, as carried by heartbeats.
pub type ChannelIds = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelParams {
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishParams {
    pub channel: String,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetServerParams {
    pub public_key: String,
    pub client_address: String,
    pub server_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RumorStateParams {
    pub state: RumorTimestamp,
}

/// Every method the server understands, with its params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Method {
    Subscribe(ChannelParams),
    Unsubscribe(ChannelParams),
    Catchup(ChannelParams),
    Publish(PublishParams),
    Broadcast(PublishParams),
    GetMessagesById(ChannelIds),
    Heartbeat(ChannelIds),
    GreetServer(GreetServerParams),
    Rumor(Rumor),
    RumorState(RumorStateParams),
}

impl Method {
    pub const NAMES: [&'static str; 10] = [
        "subscribe",
        "unsubscribe",
        "catchup",
        "publish",
        "broadcast",
        "get_messages_by_id",
        "heartbeat",
        "greet_server",
        "rumor",
        "rumor_state",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Catchup(_) => "catchup",
            Self::Publish(_) => "publish",
            Self::Broadcast(_) => "broadcast",
            Self::GetMessagesById(_) => "get_messages_by_id",
            Self::Heartbeat(_) => "heartbeat",
            Self::GreetServer(_) => "greet_server",
            Self::Rumor(_) => "rumor",
            Self::RumorState(_) => "rumor_state",
        }
    }

    /// Methods only another server may send.
    pub fn is_server_only(&self) -> bool {
        matches!(
            self,
            Self::Broadcast(_)
                | Self::GetMessagesById(_)
                | Self::Heartbeat(_)
                | Self::GreetServer(_)
                | Self::Rumor(_)
                | Self::RumorState(_)
        )
    }
}

/// A request; `id` is absent for notifications (broadcast, heartbeat, greet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub id: Option<i64>,
    pub method: Method,
}

impl Query {
    pub fn new(id: i64, method: Method) -> Self {
        Self {
            id: Some(id),
            method,
        }
    }

    pub fn notification(method: Method) -> Self {
        Self { id: None, method }
    }

    pub fn to_json(&self) -> Result<String, PopError> {
        let mut value = serde_json::to_value(&self.method)
            .map_err(|e| PopError::internal(format_args!("failed to encode query: {e}")))?;
        if let Value::Object(map) = &mut value {
            map.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
            if let Some(id) = self.id {
                map.insert("id".into(), Value::from(id));
            }
        }
        serde_json::to_string(&value)
            .map_err(|e| PopError::internal(format_args!("failed to encode query: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerError {
    pub code: i32,
    pub description: String,
}

impl From<PopError> for AnswerError {
    fn from(err: PopError) -> Self {
        Self {
            code: err.code.as_i32(),
            description: err.description,
        }
    }
}

impl From<AnswerError> for PopError {
    fn from(err: AnswerError) -> Self {
        PopError {
            code: ErrorCode::from_i32(err.code).unwrap_or(ErrorCode::InternalServerError),
            description: err.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub jsonrpc: String,
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AnswerError>,
}

impl Answer {
    fn with_result(id: Option<i64>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Plain acknowledgement, result `0`.
    pub fn success(id: Option<i64>) -> Self {
        Self::with_result(id, json!(0))
    }

    pub fn messages(id: Option<i64>, messages: &[Message]) -> Self {
        Self::with_result(id, json!(messages))
    }

    pub fn messages_by_channel(id: Option<i64>, messages: &HashMap<String, Vec<Message>>) -> Self {
        Self::with_result(id, json!(messages))
    }

    pub fn rumors(id: Option<i64>, rumors: &[Rumor]) -> Self {
        Self::with_result(id, json!(rumors))
    }

    pub fn error(id: Option<i64>, err: PopError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(err.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_json(&self) -> Result<String, PopError> {
        serde_json::to_string(self)
            .map_err(|e| PopError::internal(format_args!("failed to encode answer: {e}")))
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Query(Query),
    Answer(Answer),
}

impl JsonRpcMessage {
    pub fn from_slice(buf: &[u8]) -> Result<Self, PopError> {
        let value: Value = serde_json::from_slice(buf)?;
        let Value::Object(mut map) = value else {
            return Err(PopError::invalid_message_field("frame is not a JSON object"));
        };

        match map.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            other => {
                return Err(PopError::invalid_message_field(format_args!(
                    "unsupported jsonrpc version {other:?}"
                )))
            }
        }

        if let Some(method) = map.remove("method") {
            let id = parse_id(&map)?;
            let name = method.as_str().unwrap_or_default().to_string();
            if !Method::NAMES.contains(&name.as_str()) {
                return Err(PopError::invalid_action(format_args!("unknown method {name:?}")));
            }

            let mut tagged = Map::new();
            tagged.insert("method".into(), method);
            tagged.insert("params".into(), map.remove("params").unwrap_or(Value::Null));
            let method: Method = serde_json::from_value(Value::Object(tagged)).map_err(|e| {
                PopError::invalid_message_field(format_args!("bad params for {name}: {e}"))
            })?;
            return Ok(Self::Query(Query { id, method }));
        }

        if map.contains_key("result") || map.contains_key("error") {
            let answer: Answer = serde_json::from_value(Value::Object(map))?;
            return Ok(Self::Answer(answer));
        }

        Err(PopError::invalid_message_field(
            "frame is neither a query nor an answer",
        ))
    }
}

fn parse_id(map: &Map<String, Value>) -> Result<Option<i64>, PopError> {
    match map.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| PopError::invalid_message_field("id is not an integer")),
    }
}

/// Best-effort id of a frame that failed to parse, so its error can be answered.
pub fn extract_query_id(buf: &[u8]) -> Option<i64> {
    let value: Value = serde_json::from_slice(buf).ok()?;
    let map = value.as_object()?;
    if !map.contains_key("method") {
        return None;
    }
    parse_id(map).ok().flatten()
}

/// Whether a frame that failed to parse was meant as an answer.
///
/// Answers are never answered, even when malformed.
pub fn is_answer_frame(buf: &[u8]) -> bool {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(buf) else {
        return false;
    };
    !map.contains_key("method") && (map.contains_key("result") || map.contains_key("error"))
}
