//! LRU-bounded store of DM and group channels.

use crate::model::{PrivateChannel, Snowflake};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Access-ordered LRU of DM and group channels with a recipient index.
///
/// The recipient index only ever points at channels still held by the LRU:
/// eviction and removal purge it.
#[derive(Debug)]
pub struct PrivateChannels {
    channels: LruCache<Snowflake, PrivateChannel>,
    by_user: HashMap<Snowflake, Snowflake>,
}

impl PrivateChannels {
    /// An empty store evicting beyond `capacity` channels.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            channels: LruCache::new(capacity),
            by_user: HashMap::new(),
        }
    }

    /// Insert or replace a channel, marking it most recently used.
    ///
    /// Returns the channel evicted to make room, if any.
    pub fn insert(&mut self, channel: PrivateChannel) -> Option<PrivateChannel> {
        let id = channel.id();
        if let Some(recipient) = channel.recipient() {
            self.by_user.insert(recipient.id, id);
        }
        match self.channels.push(id, channel) {
            // same key: the old value was replaced, nothing left the cache
            Some((key, _)) if key == id => None,
            Some((_, evicted)) => {
                self.unindex(&evicted);
                tracing::trace!(channel_id = evicted.id(), "Evicted private channel");
                Some(evicted)
            }
            None => None,
        }
    }

    /// Look up a channel and mark it most recently used.
    pub fn get(&mut self, id: Snowflake) -> Option<&PrivateChannel> {
        self.channels.get(&id)
    }

    /// Mutable access to a channel. Counts as a use.
    pub fn get_mut(&mut self, id: Snowflake) -> Option<&mut PrivateChannel> {
        self.channels.get_mut(&id)
    }

    /// Look up without touching recency.
    pub fn peek(&self, id: Snowflake) -> Option<&PrivateChannel> {
        self.channels.peek(&id)
    }

    /// Whether a channel is held, without touching its recency.
    pub fn contains(&self, id: Snowflake) -> bool {
        self.channels.contains(&id)
    }

    /// The DM with `user_id`, marking it most recently used.
    pub fn get_by_user(&mut self, user_id: Snowflake) -> Option<&PrivateChannel> {
        let id = *self.by_user.get(&user_id)?;
        self.channels.get(&id)
    }

    /// Take a channel out, along with its recipient entry.
    pub fn remove(&mut self, id: Snowflake) -> Option<PrivateChannel> {
        let channel = self.channels.pop(&id)?;
        self.unindex(&channel);
        Some(channel)
    }

    fn unindex(&mut self, channel: &PrivateChannel) {
        if let Some(recipient) = channel.recipient() {
            if self.by_user.get(&recipient.id) == Some(&channel.id()) {
                self.by_user.remove(&recipient.id);
            }
        }
    }

    /// Number of channels held.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is held.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Most recently used first.
    pub fn iter(&self) -> impl Iterator<Item = &PrivateChannel> {
        self.channels.iter().map(|(_, c)| c)
    }

    /// Drop every channel and recipient entry.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.by_user.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DmChannel;
    use serde_json::json;

    fn dm(id: u64, user: u64) -> PrivateChannel {
        PrivateChannel::Dm(
            DmChannel::from_payload(&json!({
                "id": id.to_string(),
                "recipients": [{"id": user.to_string(), "username": "u"}]
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_eviction_purges_recipient_index() {
        let mut cache = PrivateChannels::new(2);
        cache.insert(dm(1, 100));
        cache.insert(dm(2, 200));
        let evicted = cache.insert(dm(3, 300)).unwrap();
        assert_eq!(evicted.id(), 1);
        assert!(cache.get_by_user(100).is_none());
        assert_eq!(cache.get_by_user(300).map(PrivateChannel::id), Some(3));
    }

    #[test]
    fn test_access_refreshes_recency() {
        let mut cache = PrivateChannels::new(2);
        cache.insert(dm(1, 100));
        cache.insert(dm(2, 200));
        assert!(cache.get(1).is_some());
        let evicted = cache.insert(dm(3, 300)).unwrap();
        assert_eq!(evicted.id(), 2);
        assert!(cache.contains(1));
    }

    #[test]
    fn test_replace_is_not_eviction() {
        let mut cache = PrivateChannels::new(1);
        cache.insert(dm(1, 100));
        assert!(cache.insert(dm(1, 100)).is_none());
        assert_eq!(cache.len(), 1);
        assert!(cache.remove(1).is_some());
        assert!(cache.get_by_user(100).is_none());
    }
}
