//! Bounded ring of recent messages.

use crate::model::{Message, Shared, Snowflake};
use std::collections::VecDeque;

/// Fixed-capacity FIFO of recently seen messages.
///
/// Pushing into a full ring evicts the oldest message. Lookups scan newest
/// first, since recent messages are the ones events usually reference.
#[derive(Debug)]
pub struct MessageRing {
    messages: VecDeque<Shared<Message>>,
    capacity: usize,
}

impl MessageRing {
    /// An empty ring holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Maximum number of messages kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages currently held.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the ring holds no message.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message, returning the evicted one if the ring was full.
    pub fn push(&mut self, message: Shared<Message>) -> Option<Shared<Message>> {
        let evicted = if self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Look a message up, newest first.
    pub fn find(&self, id: Snowflake) -> Option<Shared<Message>> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.read().id == id)
            .cloned()
    }

    /// Take a message out without reordering the others.
    pub fn remove(&mut self, id: Snowflake) -> Option<Shared<Message>> {
        let index = self.messages.iter().rposition(|m| m.read().id == id)?;
        self.messages.remove(index)
    }

    /// Keep only messages matching `keep`, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&Message) -> bool) {
        self.messages.retain(|m| keep(&m.read()));
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Shared<Message>> {
        self.messages.iter()
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shared;
    use serde_json::json;

    fn msg(id: u64, guild: Option<u64>) -> Shared<Message> {
        let mut data = json!({
            "id": id.to_string(),
            "channel_id": "1",
            "author": {"id": "2", "username": "a"}
        });
        if let Some(g) = guild {
            data["guild_id"] = json!(g.to_string());
        }
        shared(Message::from_payload(&data).unwrap())
    }

    #[test]
    fn test_evicts_oldest() {
        let mut ring = MessageRing::new(3);
        for id in 1..=4 {
            ring.push(msg(id, None));
        }
        assert_eq!(ring.len(), 3);
        assert!(ring.find(1).is_none());
        let ids: Vec<_> = ring.iter().map(|m| m.read().id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_retain_keeps_order() {
        let mut ring = MessageRing::new(5);
        ring.push(msg(1, Some(7)));
        ring.push(msg(2, Some(8)));
        ring.push(msg(3, Some(7)));
        ring.push(msg(4, None));
        ring.retain(|m| m.guild_id != Some(7));
        let ids: Vec<_> = ring.iter().map(|m| m.read().id).collect();
        assert_eq!(ids, vec![2, 4]);
    }
}
