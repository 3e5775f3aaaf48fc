use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use pop_shared::constants::MAX_DEFERRED_MESSAGES;
use pop_shared::Message;
use tracing::warn;

/// Messages that could not be applied yet because something they depend on
/// (usually their channel) has not arrived. They are retried whenever new
/// state is applied, instead of holding a worker on a timer.
///
/// Holds at most `limit` messages; the oldest is dropped to make room.
#[derive(Debug)]
pub struct DeferredMessages {
    queue: Mutex<VecDeque<(String, Message)>>,
    limit: usize,
}

impl Default for DeferredMessages {
    fn default() -> Self {
        Self::with_limit(MAX_DEFERRED_MESSAGES)
    }
}

impl DeferredMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    /// Queue a message; a message id already queued is ignored.
    pub fn push(&self, channel: &str, message: Message) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if queue.iter().any(|(_, m)| m.message_id == message.message_id) {
            return false;
        }
        while queue.len() >= self.limit {
            if let Some((dropped_channel, dropped)) = queue.pop_front() {
                warn!(
                    channel = %dropped_channel,
                    message_id = %dropped.message_id,
                    "Deferred queue full, dropping oldest message"
                );
            }
        }
        queue.push_back((channel.to_string(), message));
        true
    }

    /// Remove and return everything queued, oldest first.
    pub fn drain(&self) -> Vec<(String, Message)> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
