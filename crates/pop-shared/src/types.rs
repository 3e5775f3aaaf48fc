use serde::{Deserialize, Serialize};

use crate::constants::ROOT_CHANNEL;
use crate::crypto::{decode_b64, encode_b64, hash, verify};
use crate::error::PopError;
use crate::identity::ServerIdentity;

/// A signature added to a message after it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WitnessSignature {
    pub witness: String,
    pub signature: String,
}

/// A signed message as it travels on the wire.
///
/// `data`, `sender`, `signature` and `message_id` are base64url strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub data: String,
    pub sender: String,
    pub signature: String,
    pub message_id: String,
    #[serde(default)]
    pub witness_signatures: Vec<WitnessSignature>,
}

impl Message {
    /// Build a message over `raw_data` signed by `identity`.
    pub fn new_signed(raw_data: &[u8], identity: &ServerIdentity) -> Self {
        let data = encode_b64(raw_data);
        let signature = identity.sign(raw_data);
        let message_id = Self::compute_id(&data, &signature);
        Self {
            data,
            sender: identity.public_key(),
            signature,
            message_id,
            witness_signatures: Vec::new(),
        }
    }

    /// `Hash(data, signature)` over the base64url encodings.
    pub fn compute_id(data: &str, signature: &str) -> String {
        hash(&[data, signature])
    }

    /// Decoded payload bytes.
    pub fn raw_data(&self) -> Result<Vec<u8>, PopError> {
        decode_b64("data", &self.data)
    }

    /// Check the id binding and the sender's signature over the data.
    pub fn verify(&self) -> Result<(), PopError> {
        if self.data.is_empty() || self.signature.is_empty() {
            return Err(PopError::invalid_message_field("empty data or signature"));
        }

        let expected = Self::compute_id(&self.data, &self.signature);
        if expected != self.message_id {
            return Err(PopError::invalid_message_field(format_args!(
                "message_id {} is not Hash(data, signature)",
                self.message_id
            )));
        }

        let raw = self.raw_data()?;
        if !verify(&self.sender, &raw, &self.signature) {
            return Err(PopError::invalid_message_field(format_args!(
                "invalid signature for message {}",
                self.message_id
            )));
        }

        Ok(())
    }
}

/// Channel kinds; each kind is served by exactly one business handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Root,
    Lao,
    Election,
    Chirp,
    Reaction,
    Coin,
    Consensus,
    Authentication,
    Federation,
}

impl ChannelType {
    /// Whether a data header with `object` may be posted on this kind.
    pub fn accepts(self, object: &str) -> bool {
        match self {
            Self::Root => object == "lao",
            Self::Lao => matches!(object, "lao" | "meeting" | "roll_call" | "message" | "election"),
            Self::Election => object == "election",
            Self::Chirp => object == "chirp",
            Self::Reaction => object == "reaction",
            Self::Coin => object == "coin",
            Self::Consensus => object == "consensus",
            Self::Authentication => object == "popcha",
            Self::Federation => object == "federation",
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Root => "root",
            Self::Lao => "lao",
            Self::Election => "election",
            Self::Chirp => "chirp",
            Self::Reaction => "reaction",
            Self::Coin => "coin",
            Self::Consensus => "consensus",
            Self::Authentication => "authentication",
            Self::Federation => "federation",
        };
        f.write_str(name)
    }
}

/// Path of a LAO's main channel
pub fn lao_channel(lao_id: &str) -> String {
    format!("{ROOT_CHANNEL}/{lao_id}")
}

/// The channels created together with a LAO, main channel first.
pub fn lao_channels(lao_id: &str) -> Vec<(String, ChannelType)> {
    let base = lao_channel(lao_id);
    vec![
        (base.clone(), ChannelType::Lao),
        (format!("{base}/social/chirps"), ChannelType::Chirp),
        (format!("{base}/social/reactions"), ChannelType::Reaction),
        (format!("{base}/consensus"), ChannelType::Consensus),
        (format!("{base}/coin"), ChannelType::Coin),
        (format!("{base}/authentication"), ChannelType::Authentication),
        (format!("{base}/federation"), ChannelType::Federation),
    ]
}
