use serde::Deserialize;
use serde_json::Value;

use crate::error::PopError;

/// The decoded `data` payload of a message.
///
/// Only the variants the server acts on are decoded into fields; everything
/// else keeps its `(object, action)` header so the channel handler can
/// accept or refuse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    LaoCreate { id: String, name: String },
    ElectionSetup { id: String, lao: String },
    Witness { message_id: String, signature: String },
    Other { object: String, action: String },
}

#[derive(Deserialize)]
struct Header {
    object: String,
    action: String,
}

#[derive(Deserialize)]
struct LaoCreate {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ElectionSetup {
    id: String,
    lao: String,
}

#[derive(Deserialize)]
struct Witness {
    message_id: String,
    signature: String,
}

impl MessageData {
    /// Decode a data payload, checking the `(object, action)` header.
    pub fn decode(raw: &[u8]) -> Result<Self, PopError> {
        let value: Value = serde_json::from_slice(raw)?;
        let header: Header = serde_json::from_value(value.clone())
            .map_err(|e| PopError::invalid_message_field(format_args!("bad data header: {e}")))?;

        let data = match (header.object.as_str(), header.action.as_str()) {
            ("lao", "create") => {
                let lao: LaoCreate = serde_json::from_value(value)?;
                if lao.id.is_empty() {
                    return Err(PopError::invalid_message_field("lao#create has an empty id"));
                }
                Self::LaoCreate {
                    id: lao.id,
                    name: lao.name,
                }
            }
            ("election", "setup") => {
                let election: ElectionSetup = serde_json::from_value(value)?;
                Self::ElectionSetup {
                    id: election.id,
                    lao: election.lao,
                }
            }
            ("message", "witness") => {
                let witness: Witness = serde_json::from_value(value)?;
                Self::Witness {
                    message_id: witness.message_id,
                    signature: witness.signature,
                }
            }
            _ => Self::Other {
                object: header.object,
                action: header.action,
            },
        };

        Ok(data)
    }

    pub fn object(&self) -> &str {
        match self {
            Self::LaoCreate { .. } => "lao",
            Self::ElectionSetup { .. } => "election",
            Self::Witness { .. } => "message",
            Self::Other { object, .. } => object,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Self::LaoCreate { .. } => "create",
            Self::ElectionSetup { .. } => "setup",
            Self::Witness { .. } => "witness",
            Self::Other { action, .. } => action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_decode_lao_create() {
        let raw = br#"{"object":"lao","action":"create","id":"L1","name":"demo","creation":0}"#;
        let data = MessageData::decode(raw).unwrap();
        assert_eq!(
            data,
            MessageData::LaoCreate {
                id: "L1".into(),
                name: "demo".into()
            }
        );
        assert_eq!(data.object(), "lao");
    }

    #[test]
    fn test_decode_witness() {
        let raw = br#"{"object":"message","action":"witness","message_id":"m","signature":"s"}"#;
        let data = MessageData::decode(raw).unwrap();
        assert_eq!(data.action(), "witness");
    }

    #[test]
    fn test_unknown_pair_kept_as_header() {
        let raw = br#"{"object":"chirp","action":"add","text":"hello"}"#;
        let data = MessageData::decode(raw).unwrap();
        assert_eq!(
            data,
            MessageData::Other {
                object: "chirp".into(),
                action: "add".into()
            }
        );
    }

    #[test]
    fn test_missing_header_is_invalid() {
        let err = MessageData::decode(br#"{"text":"hello"}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMessageField);

        let err = MessageData::decode(b"not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMessageField);
    }

    #[test]
    fn test_lao_create_requires_fields() {
        let err = MessageData::decode(br#"{"object":"lao","action":"create"}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMessageField);
    }
}
