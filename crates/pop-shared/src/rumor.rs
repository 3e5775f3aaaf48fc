//! Rumors and their causal timestamps.
//!
//! A [`RumorTimestamp`] maps a server id to the last rumor id seen from that
//! server. Two predicates are defined over it and must not be mixed up:
//!
//! - [`RumorTimestamp::is_before`] is a strict partial order used to sort
//!   rumors before replaying them to a peer.
//! - [`RumorTimestamp::is_valid`] gates admission of an incoming rumor
//!   against the local vector.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Message;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RumorTimestamp(BTreeMap<String, u64>);

impl RumorTimestamp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sender: &str) -> Option<u64> {
        self.0.get(sender).copied()
    }

    pub fn set(&mut self, sender: impl Into<String>, rumor_id: u64) {
        self.0.insert(sender.into(), rumor_id);
    }

    /// Raise the entry for `sender` to `rumor_id`; never lowers it.
    pub fn advance(&mut self, sender: &str, rumor_id: u64) {
        match self.0.get_mut(sender) {
            Some(current) => *current = (*current).max(rumor_id),
            None => {
                self.0.insert(sender.to_string(), rumor_id);
            }
        }
    }

    /// Id expected for the next rumor from `sender`.
    pub fn next_id(&self, sender: &str) -> u64 {
        self.get(sender).map_or(0, |last| last + 1)
    }

    /// Whether rumor `rumor_id` from `sender` is already accounted for.
    pub fn covers(&self, sender: &str, rumor_id: u64) -> bool {
        self.get(sender).is_some_and(|last| last >= rumor_id)
    }

    /// Strict causal precedence.
    ///
    /// Every entry of `self` must exist in `other` and be `<=` there, and
    /// `other` must be strictly ahead somewhere (larger or extra entry).
    pub fn is_before(&self, other: &RumorTimestamp) -> bool {
        let dominated = self
            .0
            .iter()
            .all(|(sender, id)| other.get(sender).is_some_and(|theirs| *id <= theirs));
        if !dominated {
            return false;
        }

        other
            .0
            .iter()
            .any(|(sender, theirs)| self.get(sender).map_or(true, |id| id < *theirs))
    }

    /// Whether a rumor stamped `claimed` can be applied on top of `self`.
    ///
    /// Every sender claimed with a count above zero must be known locally
    /// with at least that count.
    pub fn is_valid(&self, claimed: &RumorTimestamp) -> bool {
        claimed
            .0
            .iter()
            .filter(|(_, id)| **id > 0)
            .all(|(sender, id)| self.get(sender).is_some_and(|ours| ours >= *id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, u64)> for RumorTimestamp {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A batch of new messages grouped by channel, stamped with the author's
/// vector as it was before this rumor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rumor {
    pub sender_id: String,
    pub rumor_id: u64,
    pub timestamp: RumorTimestamp,
    pub messages: BTreeMap<String, Vec<Message>>,
}

impl Rumor {
    fn precedes(&self, other: &Rumor) -> bool {
        if self.sender_id == other.sender_id {
            return self.rumor_id < other.rumor_id;
        }
        self.timestamp.is_before(&other.timestamp)
    }

    pub fn message_count(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }
}

/// Order rumors so that each one comes after every rumor it causally follows.
///
/// Unrelated rumors keep a deterministic `(sender, id)` order.
pub fn sort_causally(mut rumors: Vec<Rumor>) -> Vec<Rumor> {
    rumors.sort_by(|a, b| {
        a.sender_id
            .cmp(&b.sender_id)
            .then(a.rumor_id.cmp(&b.rumor_id))
    });

    let mut sorted = Vec::with_capacity(rumors.len());
    while !rumors.is_empty() {
        let next = rumors
            .iter()
            .position(|candidate| !rumors.iter().any(|other| other.precedes(candidate)))
            .unwrap_or(0);
        sorted.push(rumors.remove(next));
    }
    sorted
}
