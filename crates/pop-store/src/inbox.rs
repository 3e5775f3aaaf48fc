use std::collections::HashMap;
use std::sync::RwLock;

use pop_shared::{Message, WitnessSignature};
use tracing::debug;

use crate::sync::{read, write};

#[derive(Debug, Clone)]
struct StoredMessage {
    message: Message,
    // Arrival order within this inbox.
    seq: u64,
}

#[derive(Debug, Default)]
struct InboxInner {
    messages: HashMap<String, StoredMessage>,
    pending_signatures: HashMap<String, Vec<WitnessSignature>>,
    next_seq: u64,
}

/// Append-only message store of one channel.
#[derive(Debug, Default)]
pub struct Inbox {
    inner: RwLock<InboxInner>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `message` under its id.
    ///
    /// Returns `false` and leaves the stored copy untouched when the id is
    /// already present. Witness signatures buffered for this id are attached.
    pub fn store_message(&self, mut message: Message) -> bool {
        let mut inner = write(&self.inner);
        if inner.messages.contains_key(&message.message_id) {
            return false;
        }

        if let Some(pending) = inner.pending_signatures.remove(&message.message_id) {
            debug!(
                message_id = %message.message_id,
                count = pending.len(),
                "Attaching buffered witness signatures"
            );
            for signature in pending {
                push_unique(&mut message.witness_signatures, signature);
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.messages.insert(
            message.message_id.clone(),
            StoredMessage { message, seq },
        );
        true
    }

    pub fn get_message(&self, message_id: &str) -> Option<Message> {
        read(&self.inner)
            .messages
            .get(message_id)
            .map(|stored| stored.message.clone())
    }

    pub fn has_message(&self, message_id: &str) -> bool {
        read(&self.inner).messages.contains_key(message_id)
    }

    /// Attach a witness signature, or buffer it until the message arrives.
    pub fn add_witness_signature(&self, message_id: &str, witness: &str, signature: &str) {
        let signature = WitnessSignature {
            witness: witness.to_string(),
            signature: signature.to_string(),
        };

        let mut inner = write(&self.inner);
        match inner.messages.get_mut(message_id) {
            Some(stored) => push_unique(&mut stored.message.witness_signatures, signature),
            None => {
                let pending = inner
                    .pending_signatures
                    .entry(message_id.to_string())
                    .or_default();
                push_unique(pending, signature);
            }
        }
    }

    /// All messages in arrival order.
    pub fn get_sorted_messages(&self) -> Vec<Message> {
        let inner = read(&self.inner);
        let mut stored: Vec<&StoredMessage> = inner.messages.values().collect();
        stored.sort_by_key(|s| s.seq);
        stored.into_iter().map(|s| s.message.clone()).collect()
    }

    /// Ids of all stored messages in arrival order.
    pub fn message_ids(&self) -> Vec<String> {
        let inner = read(&self.inner);
        let mut stored: Vec<&StoredMessage> = inner.messages.values().collect();
        stored.sort_by_key(|s| s.seq);
        stored
            .into_iter()
            .map(|s| s.message.message_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        read(&self.inner).messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_unique(signatures: &mut Vec<WitnessSignature>, signature: WitnessSignature) {
    if !signatures.contains(&signature) {
        signatures.push(signature);
    }
}
