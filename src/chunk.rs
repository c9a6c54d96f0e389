//! Pending member-chunk requests.
//!
//! A chunk request is opened with a random nonce, the gateway is asked to
//! stream members tagged with that nonce, and each `GUILD_MEMBERS_CHUNK`
//! batch is appended to the request's buffer. When the last batch arrives the
//! request completes: every waiter receives the accumulated buffer exactly
//! once and the request leaves the tracker.
//!
//! # Examples
//!
//! ```
//! use chord_state::chunk::ChunkTracker;
//!
//! # tokio_test::block_on(async {
//! let mut tracker = ChunkTracker::new();
//! let handle = tracker.request(1, false);
//! let waiter = handle.wait();
//!
//! tracker.complete(handle.nonce());
//! assert!(waiter.await.unwrap().is_empty());
//! # });
//! ```

use crate::error::{Result, StateError};
use crate::model::{Guild, Member, Snowflake};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Debug)]
struct ChunkRequest {
    guild_id: Snowflake,
    nonce: String,
    cache: bool,
    buffer: Vec<Member>,
    waiters: Vec<oneshot::Sender<Vec<Member>>>,
    done: bool,
}

/// Shared handle to one pending chunk request.
///
/// Clones refer to the same request.
#[derive(Debug, Clone)]
pub struct ChunkHandle {
    inner: Arc<Mutex<ChunkRequest>>,
    nonce: String,
    guild_id: Snowflake,
}

impl ChunkHandle {
    fn new(guild_id: Snowflake, cache: bool) -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        let request = ChunkRequest {
            guild_id,
            nonce: nonce.clone(),
            cache,
            buffer: Vec::new(),
            waiters: Vec::new(),
            done: false,
        };
        Self {
            inner: Arc::new(Mutex::new(request)),
            nonce,
            guild_id,
        }
    }

    /// Nonce the gateway echoes on every chunk of this request.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Guild whose members are requested.
    pub fn guild_id(&self) -> Snowflake {
        self.guild_id
    }

    /// Whether the final chunk arrived.
    pub fn is_done(&self) -> bool {
        self.inner.lock().done
    }

    /// Number of members buffered so far.
    pub fn buffered(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    /// Append a batch of members.
    ///
    /// When the request caches, each member is merged into `guild` unless the
    /// guild already holds a copy with a join timestamp.
    pub fn add_members(&self, members: Vec<Member>, guild: Option<&mut Guild>) {
        let mut request = self.inner.lock();
        if request.cache {
            if let Some(guild) = guild {
                for member in &members {
                    let known = guild
                        .get_member(member.id())
                        .is_some_and(|existing| existing.joined_at.is_some());
                    if !known {
                        guild.add_member(member.clone());
                    }
                }
            }
        }
        request.buffer.extend(members);
    }

    /// Resolve every waiter with the buffer. Later calls are no-ops.
    pub(crate) fn complete(&self) {
        let mut request = self.inner.lock();
        if request.done {
            return;
        }
        request.done = true;
        let buffer = request.buffer.clone();
        for waiter in request.waiters.drain(..) {
            // a dropped receiver just means nobody is listening anymore
            let _ = waiter.send(buffer.clone());
        }
        tracing::debug!(
            guild_id = request.guild_id,
            nonce = %request.nonce,
            members = buffer.len(),
            "Chunk request complete"
        );
    }

    /// A future resolving with the final member list.
    ///
    /// Each call returns an independent waiter. Waiting on a completed request
    /// resolves immediately.
    pub fn wait(&self) -> ChunkWaiter {
        let (tx, rx) = oneshot::channel();
        let mut request = self.inner.lock();
        if request.done {
            let _ = tx.send(request.buffer.clone());
        } else {
            request.waiters.push(tx);
        }
        ChunkWaiter {
            rx,
            guild_id: request.guild_id,
        }
    }
}

/// Future returned by [`ChunkHandle::wait`].
///
/// Fails with [`StateError::ChunkCancelled`] when the request is dropped
/// without completing.
#[derive(Debug)]
pub struct ChunkWaiter {
    rx: oneshot::Receiver<Vec<Member>>,
    guild_id: Snowflake,
}

impl Future for ChunkWaiter {
    type Output = Result<Vec<Member>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let guild_id = self.guild_id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| StateError::ChunkCancelled(guild_id)))
    }
}

/// Nonce-keyed registry of pending chunk requests.
#[derive(Debug, Default)]
pub struct ChunkTracker {
    requests: HashMap<String, ChunkHandle>,
    by_guild: HashMap<Snowflake, String>,
}

impl ChunkTracker {
    /// A tracker with no pending request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new request with a fresh nonce.
    pub fn request(&mut self, guild_id: Snowflake, cache: bool) -> ChunkHandle {
        let handle = ChunkHandle::new(guild_id, cache);
        self.requests.insert(handle.nonce.clone(), handle.clone());
        handle
    }

    /// The in-flight request for `guild_id`, opening one if none exists.
    ///
    /// Returns the handle and whether it was newly opened.
    pub fn guild_request(&mut self, guild_id: Snowflake, cache: bool) -> (ChunkHandle, bool) {
        if let Some(handle) = self
            .by_guild
            .get(&guild_id)
            .and_then(|nonce| self.requests.get(nonce))
        {
            return (handle.clone(), false);
        }
        let handle = self.request(guild_id, cache);
        self.by_guild.insert(guild_id, handle.nonce.clone());
        (handle, true)
    }

    /// The pending request for a nonce.
    pub fn get(&self, nonce: &str) -> Option<ChunkHandle> {
        self.requests.get(nonce).cloned()
    }

    /// Complete and forget a request. Unknown nonces are ignored.
    pub fn complete(&mut self, nonce: &str) {
        if let Some(handle) = self.remove(nonce) {
            handle.complete();
        }
    }

    /// Forget a request without completing it.
    pub fn remove(&mut self, nonce: &str) -> Option<ChunkHandle> {
        let handle = self.requests.remove(nonce)?;
        if self.by_guild.get(&handle.guild_id).map(String::as_str) == Some(nonce) {
            self.by_guild.remove(&handle.guild_id);
        }
        Some(handle)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no request is pending.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    fn member(id: u64, joined: Option<&str>) -> Member {
        Member::from_payload(
            1,
            &json!({"user": {"id": id.to_string(), "username": "m"}, "joined_at": joined}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fan_out_to_every_waiter() {
        let mut tracker = ChunkTracker::new();
        let handle = tracker.request(1, false);
        let first = handle.wait();
        let second = handle.wait();

        handle.add_members(vec![member(1, None)], None);
        handle.add_members(vec![member(2, None)], None);
        tracker.complete(handle.nonce());
        // second completion is a no-op
        tracker.complete(handle.nonce());
        handle.complete();

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_waiter_pending_until_complete() {
        let mut tracker = ChunkTracker::new();
        let handle = tracker.request(1, false);
        let mut waiter = task::spawn(handle.wait());
        assert_pending!(waiter.poll());

        tracker.complete(handle.nonce());
        assert!(waiter.is_woken());
        let members = assert_ready!(waiter.poll()).unwrap();
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn test_wait_after_complete_resolves_immediately() {
        let mut tracker = ChunkTracker::new();
        let handle = tracker.request(1, false);
        handle.add_members(vec![member(3, None)], None);
        tracker.complete(handle.nonce());
        assert_eq!(handle.wait().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_request_cancels_waiter() {
        let mut tracker = ChunkTracker::new();
        let handle = tracker.request(4, false);
        let waiter = handle.wait();
        tracker.remove(handle.nonce());
        drop(handle);
        assert!(matches!(waiter.await, Err(StateError::ChunkCancelled(4))));
    }

    #[test]
    fn test_guild_request_is_reused() {
        let mut tracker = ChunkTracker::new();
        let (first, fresh) = tracker.guild_request(1, true);
        assert!(fresh);
        let (second, fresh) = tracker.guild_request(1, true);
        assert!(!fresh);
        assert_eq!(first.nonce(), second.nonce());
        assert_eq!(first.nonce().len(), 32);

        tracker.complete(first.nonce());
        let (third, fresh) = tracker.guild_request(1, true);
        assert!(fresh);
        assert_ne!(third.nonce(), first.nonce());
    }

    #[test]
    fn test_cached_members_keep_join_timestamp() {
        let mut guild = Guild::from_payload(&json!({"id": "1", "name": "g"})).unwrap();
        guild.add_member(member(1, Some("2020-01-01")));
        guild.add_member(member(2, None));

        let mut tracker = ChunkTracker::new();
        let handle = tracker.request(1, true);
        let mut incoming = member(1, Some("2024-01-01"));
        incoming.nick = Some("new".into());
        handle.add_members(vec![incoming, member(2, Some("2024-02-02")), member(3, None)], Some(&mut guild));

        assert_eq!(guild.get_member(1).unwrap().nick, None);
        assert_eq!(guild.get_member(2).unwrap().joined_at.as_deref(), Some("2024-02-02"));
        assert!(guild.get_member(3).is_some());
        assert_eq!(handle.buffered(), 3);
    }
}
