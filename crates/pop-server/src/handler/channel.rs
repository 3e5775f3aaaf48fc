//! Business handlers per channel type.
//!
//! The message pipeline calls exactly one handler per new message, picked
//! by the channel's type. A handler only validates and reports the channels
//! the message creates; storing and broadcasting stay with the pipeline.

use std::collections::HashMap;

use pop_shared::types::{lao_channel, lao_channels};
use pop_shared::{ChannelType, Message, MessageData, PopError};

/// Side effects a handler asks the pipeline to perform.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub new_channels: Vec<(String, ChannelType)>,
}

pub trait ChannelHandler: Send + Sync {
    fn handle(&self, channel: &str, message: &Message, data: &MessageData)
        -> Result<Outcome, PopError>;
}

/// `/root`: only LAO creation.
struct RootHandler {
    owner: Option<String>,
}

impl ChannelHandler for RootHandler {
    fn handle(
        &self,
        _channel: &str,
        message: &Message,
        data: &MessageData,
    ) -> Result<Outcome, PopError> {
        let MessageData::LaoCreate { id, .. } = data else {
            return Err(PopError::invalid_message_field(format_args!(
                "{}#{} is not allowed on the root channel",
                data.object(),
                data.action()
            )));
        };

        if let Some(owner) = &self.owner {
            if &message.sender != owner {
                return Err(PopError::access_denied(format_args!(
                    "only the owner may create a LAO, not {}",
                    message.sender
                )));
            }
        }

        Ok(Outcome {
            new_channels: lao_channels(id),
        })
    }
}

/// `/root/<lao>`: election setup opens a sub-channel.
struct LaoHandler;

impl ChannelHandler for LaoHandler {
    fn handle(
        &self,
        channel: &str,
        _message: &Message,
        data: &MessageData,
    ) -> Result<Outcome, PopError> {
        match data {
            MessageData::ElectionSetup { id, lao } => {
                if lao_channel(lao) != channel {
                    return Err(PopError::invalid_message_field(format_args!(
                        "election for LAO {lao} published on {channel}"
                    )));
                }
                Ok(Outcome {
                    new_channels: vec![(format!("{channel}/{id}"), ChannelType::Election)],
                })
            }
            MessageData::LaoCreate { .. } => Err(PopError::invalid_action(
                "a LAO can only be created on the root channel",
            )),
            other => structural_check(ChannelType::Lao, other),
        }
    }
}

/// Every other channel type: the data object must belong to the channel.
struct StructuralHandler {
    kind: ChannelType,
}

impl ChannelHandler for StructuralHandler {
    fn handle(
        &self,
        _channel: &str,
        _message: &Message,
        data: &MessageData,
    ) -> Result<Outcome, PopError> {
        structural_check(self.kind, data)
    }
}

fn structural_check(kind: ChannelType, data: &MessageData) -> Result<Outcome, PopError> {
    if kind.accepts(data.object()) {
        Ok(Outcome::default())
    } else {
        Err(PopError::invalid_message_field(format_args!(
            "object {} is not allowed on a {kind} channel",
            data.object()
        )))
    }
}

/// Dispatch table from channel type to its handler.
pub struct ChannelHandlers {
    handlers: HashMap<ChannelType, Box<dyn ChannelHandler>>,
}

impl ChannelHandlers {
    pub fn new(owner: Option<String>) -> Self {
        let mut handlers: HashMap<ChannelType, Box<dyn ChannelHandler>> = HashMap::new();
        handlers.insert(ChannelType::Root, Box::new(RootHandler { owner }));
        handlers.insert(ChannelType::Lao, Box::new(LaoHandler));
        for kind in [
            ChannelType::Election,
            ChannelType::Chirp,
            ChannelType::Reaction,
            ChannelType::Coin,
            ChannelType::Consensus,
            ChannelType::Authentication,
            ChannelType::Federation,
        ] {
            handlers.insert(kind, Box::new(StructuralHandler { kind }));
        }
        Self { handlers }
    }

    pub fn handle(
        &self,
        kind: ChannelType,
        channel: &str,
        message: &Message,
        data: &MessageData,
    ) -> Result<Outcome, PopError> {
        // Witness signatures may target a message on any channel but root.
        if matches!(data, MessageData::Witness { .. }) && kind != ChannelType::Root {
            return Ok(Outcome::default());
        }

        let handler = self
            .handlers
            .get(&kind)
            .ok_or_else(|| PopError::internal(format_args!("no handler for {kind} channels")))?;
        handler.handle(channel, message, data)
    }
}
