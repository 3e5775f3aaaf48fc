use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use pop_shared::constants::ROOT_CHANNEL;
use pop_shared::{ChannelType, Message};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::inbox::Inbox;
use crate::sync::{read, write};

#[derive(Debug, Clone)]
struct Channel {
    kind: ChannelType,
    inbox: Arc<Inbox>,
}

/// Registry of every channel known to the server and its inbox.
///
/// The root channel exists from the start. Channels are never removed.
#[derive(Debug)]
pub struct ChannelStore {
    channels: RwLock<HashMap<String, Channel>>,
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStore {
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        channels.insert(
            ROOT_CHANNEL.to_string(),
            Channel {
                kind: ChannelType::Root,
                inbox: Arc::new(Inbox::new()),
            },
        );
        Self {
            channels: RwLock::new(channels),
        }
    }

    pub fn add_channel(&self, path: &str, kind: ChannelType) -> Result<()> {
        self.add_channels(&[(path.to_string(), kind)])
    }

    /// Register several channels at once; none is added if any already exists.
    pub fn add_channels(&self, new_channels: &[(String, ChannelType)]) -> Result<()> {
        let mut channels = write(&self.channels);
        if let Some((path, _)) = new_channels.iter().find(|(p, _)| channels.contains_key(p)) {
            return Err(StoreError::DuplicateChannel(path.clone()));
        }

        for (path, kind) in new_channels {
            debug!(channel = %path, kind = %kind, "Channel created");
            channels.insert(
                path.clone(),
                Channel {
                    kind: *kind,
                    inbox: Arc::new(Inbox::new()),
                },
            );
        }
        Ok(())
    }

    pub fn has_channel(&self, path: &str) -> bool {
        read(&self.channels).contains_key(path)
    }

    pub fn channel_type(&self, path: &str) -> Result<ChannelType> {
        read(&self.channels)
            .get(path)
            .map(|c| c.kind)
            .ok_or_else(|| StoreError::UnknownChannel(path.to_string()))
    }

    pub fn inbox(&self, path: &str) -> Result<Arc<Inbox>> {
        read(&self.channels)
            .get(path)
            .map(|c| Arc::clone(&c.inbox))
            .ok_or_else(|| StoreError::UnknownChannel(path.to_string()))
    }

    /// Whether any channel holds `message_id`.
    pub fn has_message(&self, message_id: &str) -> bool {
        self.inboxes().iter().any(|(_, inbox)| inbox.has_message(message_id))
    }

    /// Known message ids per non-empty channel, as sent in heartbeats.
    pub fn heartbeat_digest(&self) -> HashMap<String, Vec<String>> {
        self.inboxes()
            .into_iter()
            .filter(|(_, inbox)| !inbox.is_empty())
            .map(|(path, inbox)| (path, inbox.message_ids()))
            .collect()
    }

    /// Ids in `claimed` that are not stored locally, per channel.
    ///
    /// Channels with nothing missing are left out; an unknown channel
    /// counts as holding nothing. Claimed order is kept.
    pub fn missing_ids(
        &self,
        claimed: &HashMap<String, Vec<String>>,
    ) -> HashMap<String, Vec<String>> {
        let mut missing = HashMap::new();
        for (path, ids) in claimed {
            let inbox = self.inbox(path).ok();
            let absent: Vec<String> = ids
                .iter()
                .filter(|id| inbox.as_ref().map_or(true, |inbox| !inbox.has_message(id)))
                .cloned()
                .collect();
            if !absent.is_empty() {
                missing.insert(path.clone(), absent);
            }
        }
        missing
    }

    /// The requested messages that are stored locally, per channel.
    pub fn find_messages(
        &self,
        requested: &HashMap<String, Vec<String>>,
    ) -> HashMap<String, Vec<Message>> {
        let mut found = HashMap::new();
        for (path, ids) in requested {
            let Ok(inbox) = self.inbox(path) else {
                continue;
            };
            let messages: Vec<Message> = ids.iter().filter_map(|id| inbox.get_message(id)).collect();
            if !messages.is_empty() {
                found.insert(path.clone(), messages);
            }
        }
        found
    }

    fn inboxes(&self) -> Vec<(String, Arc<Inbox>)> {
        read(&self.channels)
            .iter()
            .map(|(path, c)| (path.clone(), Arc::clone(&c.inbox)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_shared::crypto::hash;
    use pop_shared::types::lao_channels;

    fn message(data: &str) -> Message {
        Message {
            data: data.into(),
            sender: "S".into(),
            signature: "sig".into(),
            message_id: hash(&[data, "sig"]),
            witness_signatures: Vec::new(),
        }
    }

    #[test]
    fn test_root_exists() {
        let store = ChannelStore::new();
        assert_eq!(store.channel_type("/root").unwrap(), ChannelType::Root);
        assert!(matches!(
            store.inbox("/root/nope"),
            Err(StoreError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_add_channels_is_atomic() {
        let store = ChannelStore::new();
        store.add_channel("/root/L/coin", ChannelType::Coin).unwrap();

        let err = store.add_channels(&lao_channels("L")).unwrap_err();
        assert_eq!(err, StoreError::DuplicateChannel("/root/L/coin".into()));
        assert!(!store.has_channel("/root/L"));

        store.add_channels(&lao_channels("M")).unwrap();
        assert_eq!(
            store.channel_type("/root/M/social/chirps").unwrap(),
            ChannelType::Chirp
        );
    }

    #[test]
    fn test_missing_ids() {
        let store = ChannelStore::new();
        let a = message("a");
        store.inbox("/root").unwrap().store_message(a.clone());

        let claimed = HashMap::from([(
            "/root".to_string(),
            vec![a.message_id.clone(), "b".to_string(), "c".to_string()],
        )]);
        let missing = store.missing_ids(&claimed);
        assert_eq!(
            missing,
            HashMap::from([("/root".to_string(), vec!["b".to_string(), "c".to_string()])])
        );

        let claimed = HashMap::from([("/root".to_string(), vec![a.message_id.clone()])]);
        assert!(store.missing_ids(&claimed).is_empty());
    }

    #[test]
    fn test_missing_ids_unknown_channel() {
        let store = ChannelStore::new();
        let claimed = HashMap::from([("/root/L".to_string(), vec!["x".to_string()])]);
        assert_eq!(store.missing_ids(&claimed), claimed);
    }

    #[test]
    fn test_digest_and_find() {
        let store = ChannelStore::new();
        store.add_channel("/root/L", ChannelType::Lao).unwrap();
        let m = message("m");
        store.inbox("/root/L").unwrap().store_message(m.clone());

        let digest = store.heartbeat_digest();
        assert_eq!(digest.len(), 1);
        assert_eq!(digest["/root/L"], vec![m.message_id.clone()]);

        let found = store.find_messages(&digest);
        assert_eq!(found["/root/L"], vec![m.clone()]);
        assert!(store.has_message(&m.message_id));
    }
}
