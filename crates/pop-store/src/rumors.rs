use std::collections::BTreeMap;
use std::sync::RwLock;

use pop_shared::rumor::sort_causally;
use pop_shared::{Message, Rumor, RumorTimestamp};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::sync::{read, write};

/// Where an incoming rumor id falls relative to the local vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// The next rumor expected from this sender.
    Next,
    /// Already applied.
    Duplicate,
    /// Earlier rumors from this sender are still missing.
    Gap { expected: u64 },
}

#[derive(Debug)]
struct RumorLogInner {
    own_id: String,
    vector: RumorTimestamp,
    log: BTreeMap<(String, u64), Rumor>,
    pending: BTreeMap<String, Vec<Message>>,
    pending_count: usize,
}

/// Every rumor applied by this server, its own included, plus the local
/// vector timestamp and the buffer of local messages not yet gossiped.
#[derive(Debug)]
pub struct RumorLog {
    inner: RwLock<RumorLogInner>,
}

impl RumorLog {
    /// `own_id` is this server's public key.
    pub fn new(own_id: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(RumorLogInner {
                own_id: own_id.into(),
                vector: RumorTimestamp::new(),
                log: BTreeMap::new(),
                pending: BTreeMap::new(),
                pending_count: 0,
            }),
        }
    }

    pub fn own_id(&self) -> String {
        read(&self.inner).own_id.clone()
    }

    /// Buffer a locally accepted message for the next own rumor.
    ///
    /// Returns the number of buffered messages.
    pub fn add_pending(&self, channel: &str, message: Message) -> usize {
        let mut inner = write(&self.inner);
        inner
            .pending
            .entry(channel.to_string())
            .or_default()
            .push(message);
        inner.pending_count += 1;
        inner.pending_count
    }

    pub fn pending_count(&self) -> usize {
        read(&self.inner).pending_count
    }

    /// Turn the buffered messages into the next own rumor.
    ///
    /// The rumor is stamped with the vector as it was before it, then
    /// recorded and the own entry advanced. `None` when nothing is buffered.
    pub fn take_next_rumor(&self) -> Option<Rumor> {
        let mut inner = write(&self.inner);
        if inner.pending_count == 0 {
            return None;
        }

        let own_id = inner.own_id.clone();
        let rumor = Rumor {
            rumor_id: inner.vector.next_id(&own_id),
            sender_id: own_id.clone(),
            timestamp: inner.vector.clone(),
            messages: std::mem::take(&mut inner.pending),
        };
        inner.pending_count = 0;
        inner.vector.advance(&own_id, rumor.rumor_id);
        inner
            .log
            .insert((own_id, rumor.rumor_id), rumor.clone());

        debug!(
            rumor_id = rumor.rumor_id,
            messages = rumor.message_count(),
            "Created own rumor"
        );
        Some(rumor)
    }

    pub fn check_sequence(&self, sender: &str, rumor_id: u64) -> SequenceCheck {
        let expected = read(&self.inner).vector.next_id(sender);
        if rumor_id < expected {
            SequenceCheck::Duplicate
        } else if rumor_id > expected {
            SequenceCheck::Gap { expected }
        } else {
            SequenceCheck::Next
        }
    }

    /// Whether the local vector covers everything `timestamp` depends on.
    pub fn is_valid(&self, timestamp: &RumorTimestamp) -> bool {
        read(&self.inner).vector.is_valid(timestamp)
    }

    /// Append a foreign rumor and advance the sender's vector entry.
    pub fn record(&self, rumor: Rumor) -> Result<()> {
        let mut inner = write(&self.inner);
        let key = (rumor.sender_id.clone(), rumor.rumor_id);
        if inner.log.contains_key(&key) {
            return Err(StoreError::DuplicateRumor {
                sender: key.0,
                rumor_id: key.1,
            });
        }

        inner.vector.advance(&rumor.sender_id, rumor.rumor_id);
        inner.log.insert(key, rumor);
        Ok(())
    }

    pub fn get(&self, sender: &str, rumor_id: u64) -> Option<Rumor> {
        read(&self.inner)
            .log
            .get(&(sender.to_string(), rumor_id))
            .cloned()
    }

    pub fn timestamp(&self) -> RumorTimestamp {
        read(&self.inner).vector.clone()
    }

    /// Rumors a peer at vector `state` has not seen, in causal order.
    pub fn rumors_missing_from(&self, state: &RumorTimestamp) -> Vec<Rumor> {
        let missing: Vec<Rumor> = read(&self.inner)
            .log
            .values()
            .filter(|r| !state.covers(&r.sender_id, r.rumor_id))
            .cloned()
            .collect();
        sort_causally(missing)
    }

    pub fn len(&self) -> usize {
        read(&self.inner).log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
