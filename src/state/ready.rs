//! Startup readiness sequencing.
//!
//! After `READY` the platform streams one `GUILD_CREATE` per guild of the
//! session. Those guilds are queued rather than announced; the sequencer
//! drains the queue until no guild arrived for `guild_ready_timeout`, chunks
//! the guilds that need it, announces each guild and finally emits
//! [`Event::Ready`].
//!
//! Every `READY` starts a new session generation. The previous sequencer is
//! aborted and the queue is only torn down by the sequencer of the session
//! that installed it.

use super::{ConnectionState, Event};
use crate::chunk::ChunkWaiter;
use crate::error::Result;
use crate::model::{
    array, channel_factory, object, opt_snowflake, ChannelKind, DmChannel, GroupChannel, Guild,
    PrivateChannel, Shared, User,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// A guild waiting to be announced.
struct PendingGuild {
    guild: Shared<Guild>,
    /// Announce as available rather than joined
    available: bool,
}

struct ReadyQueue {
    generation: u64,
    tx: mpsc::UnboundedSender<PendingGuild>,
}

/// Readiness state of the current session.
#[derive(Default)]
pub(super) struct ReadySlot {
    generation: AtomicU64,
    queue: Mutex<Option<ReadyQueue>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionState {
    /// Whether startup guilds are still being collected.
    pub fn is_collecting_guilds(&self) -> bool {
        self.inner.ready.queue.lock().is_some()
    }

    /// Abort the previous sequencer and open a queue for a new session.
    fn begin_session(&self) -> (u64, mpsc::UnboundedReceiver<PendingGuild>) {
        let slot = &self.inner.ready;
        if let Some(task) = slot.task.lock().take() {
            task.abort();
        }
        let generation = slot.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        *slot.queue.lock() = Some(ReadyQueue { generation, tx });
        (generation, rx)
    }

    /// Close the startup queue if it still belongs to `generation`.
    fn end_session(&self, generation: u64) {
        let mut queue = self.inner.ready.queue.lock();
        if queue.as_ref().is_some_and(|q| q.generation == generation) {
            *queue = None;
        }
    }

    /// Queue a guild for the startup sequencer. Returns `false` outside startup.
    pub(super) fn queue_guild(&self, guild: &Shared<Guild>, available: bool) -> bool {
        let queue = self.inner.ready.queue.lock();
        let Some(queue) = queue.as_ref() else {
            return false;
        };
        let pending = PendingGuild {
            guild: guild.clone(),
            available,
        };
        queue.tx.send(pending).is_ok()
    }

    /// Whether a guild should be chunked before it is announced.
    pub(super) fn needs_chunking(&self, guild: &Guild) -> bool {
        let config = &self.inner.config;
        config.chunk_guilds()
            && !guild.is_chunked()
            && !(config.intents.presences() && !guild.info.large)
    }

    pub(super) fn announce_guild(&self, guild: Shared<Guild>, available: bool) {
        if available {
            self.dispatch(Event::GuildAvailable(guild));
        } else {
            self.dispatch(Event::GuildJoin(guild));
        }
    }

    /// Chunk a guild that arrived outside startup, then announce it.
    pub(super) fn chunk_and_announce(&self, guild: Shared<Guild>, available: bool) {
        let state = self.clone();
        let limit = self.inner.config.late_chunk_timeout;
        tokio::spawn(async move {
            let guild_id = guild.read().id();
            let chunked = async {
                let cache = state.inner.config.member_cache_flags().joined;
                let waiter = state.chunk_guild(guild_id, cache).await?;
                waiter.await
            };
            match timeout(limit, chunked).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(guild_id, "Chunking failed: {}", e),
                Err(_) => tracing::warn!(guild_id, "Timed out waiting for chunks"),
            }
            state.announce_guild(guild, available);
        });
    }

    async fn delay_ready(self, generation: u64, mut queue: mpsc::UnboundedReceiver<PendingGuild>) {
        let config = &self.inner.config;
        let mut chunking: Vec<(PendingGuild, Option<ChunkWaiter>)> = Vec::new();

        // the sender lives in the slot, so the queue only ends by going quiet
        while let Ok(Some(pending)) = timeout(config.guild_ready_timeout, queue.recv()).await {
            let (guild_id, needs_chunking) = {
                let guild = pending.guild.read();
                (guild.id(), self.needs_chunking(&guild))
            };
            if !needs_chunking {
                self.announce_guild(pending.guild, pending.available);
                continue;
            }
            match self.chunk_guild(guild_id, config.member_cache_flags().joined).await {
                Ok(waiter) => chunking.push((pending, Some(waiter))),
                Err(e) => {
                    tracing::warn!(guild_id, "Could not request chunks: {}", e);
                    chunking.push((pending, None));
                }
            }
        }

        for (pending, waiter) in chunking {
            if let Some(waiter) = waiter {
                let guild_id = pending.guild.read().id();
                match timeout(config.startup_chunk_timeout, waiter).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(guild_id, "Chunking failed: {}", e),
                    Err(_) => tracing::warn!(guild_id, "Timed out waiting for chunks for guild_id {}", guild_id),
                }
            }
            self.announce_guild(pending.guild, pending.available);
        }

        self.end_session(generation);
        tracing::debug!(generation, "Startup guilds announced");
        self.dispatch(Event::Ready);
    }
}

/// `READY`: start a new session.
///
/// The user and private channels are read before the previous session is
/// torn down, so a malformed payload leaves it in place.
pub(super) fn parse_ready(state: &ConnectionState, data: &Value) -> Result<()> {
    let user = User::from_payload(object(data, "user")?)?;
    let private_channels = array(data, "private_channels")
        .iter()
        .filter_map(|raw| {
            let (kind, _) = raw.get("type").and_then(Value::as_u64).and_then(channel_factory)?;
            match kind {
                ChannelKind::Dm => Some(DmChannel::from_payload(raw).map(PrivateChannel::Dm)),
                ChannelKind::Group => Some(GroupChannel::from_payload(raw).map(PrivateChannel::Group)),
                _ => None,
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let (generation, queue) = state.begin_session();
    let loaded = {
        let mut cache = state.cache_mut();
        cache.clear();
        cache.store_user_value(&user);
        cache.user = Some(user);
        if let Some(application_id) = data.get("application").and_then(|a| opt_snowflake(a, "id")) {
            cache.application_id = Some(application_id);
        }
        for channel in private_channels {
            cache.add_private_channel(channel);
        }
        array(data, "guilds")
            .iter()
            .try_for_each(|raw| cache.add_guild_from_data(raw).map(drop))
    };
    if let Err(e) = loaded {
        state.end_session(generation);
        return Err(e);
    }
    state.dispatch(Event::Connect);

    let task = tokio::spawn(state.clone().delay_ready(generation, queue));
    *state.inner.ready.task.lock() = Some(task);
    Ok(())
}

/// `RESUMED`: the session continued; the cache is still valid.
pub(super) fn parse_resumed(state: &ConnectionState, _data: &Value) -> Result<()> {
    state.dispatch(Event::Resumed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::{Intents, StateConfig};
    use crate::state::{ConnectionState, Event, EventStream};
    use crate::test_support::{RecordingGateway, RecordingHttp};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn config(chunk: bool) -> StateConfig {
        StateConfig {
            intents: Intents::default() | Intents::GUILD_MEMBERS,
            chunk_guilds_at_startup: Some(chunk),
            guild_ready_timeout: Duration::from_millis(20),
            startup_chunk_timeout: Duration::from_millis(20),
            late_chunk_timeout: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn state(config: StateConfig, gateway: Arc<RecordingGateway>) -> (ConnectionState, EventStream) {
        ConnectionState::new(config, gateway, Arc::new(RecordingHttp::default())).unwrap()
    }

    fn ready_payload() -> Value {
        json!({
            "user": {"id": "99", "username": "bot", "bot": true},
            "application": {"id": "500"},
            "guilds": [{"id": "1", "unavailable": true}, {"id": "2", "unavailable": true}]
        })
    }

    async fn names_until_ready(events: &mut EventStream) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Some(event) = events.next().await {
            names.push(event.name());
            if matches!(event, Event::Ready) {
                break;
            }
        }
        names
    }

    #[tokio::test]
    async fn test_ready_announces_queued_guilds_then_ready() {
        let (state, mut events) = state(config(false), Arc::default());
        state.parse("READY", &ready_payload()).unwrap();
        assert!(state.is_collecting_guilds());
        assert_eq!(state.user().unwrap().id, 99);
        assert_eq!(state.application_id(), Some(500));
        assert!(state.get_guild(1).unwrap().read().unavailable());

        state
            .parse("GUILD_CREATE", &json!({"id": "1", "name": "one", "unavailable": false}))
            .unwrap();
        state.parse("GUILD_CREATE", &json!({"id": "3", "name": "new"})).unwrap();

        let names = names_until_ready(&mut events).await;
        assert_eq!(names, vec!["connect", "guild_available", "guild_join", "ready"]);
        assert!(!state.is_collecting_guilds());
        assert!(!state.get_guild(1).unwrap().read().unavailable());
    }

    #[tokio::test]
    async fn test_unavailable_guild_create_is_ignored() {
        let (state, mut events) = state(config(false), Arc::default());
        state.parse("READY", &ready_payload()).unwrap();
        state
            .parse("GUILD_CREATE", &json!({"id": "2", "unavailable": true}))
            .unwrap();
        assert_eq!(names_until_ready(&mut events).await, vec!["connect", "ready"]);
    }

    #[tokio::test]
    async fn test_startup_chunking_timeout_is_not_fatal() {
        let gateway = Arc::new(RecordingGateway::default());
        let (state, mut events) = state(config(true), gateway.clone());
        state.parse("READY", &ready_payload()).unwrap();
        state
            .parse(
                "GUILD_CREATE",
                &json!({"id": "1", "name": "one", "member_count": 10, "unavailable": false}),
            )
            .unwrap();

        let names = names_until_ready(&mut events).await;
        assert_eq!(names, vec!["connect", "guild_available", "ready"]);
        assert_eq!(gateway.requests().len(), 1);
        assert_eq!(gateway.requests()[0].0, 1);
    }

    #[tokio::test]
    async fn test_startup_chunks_complete_before_announcement() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut config = config(true);
        config.startup_chunk_timeout = Duration::from_secs(5);
        let (state, mut events) = state(config, gateway.clone());
        state.parse("READY", &ready_payload()).unwrap();
        state
            .parse(
                "GUILD_CREATE",
                &json!({"id": "1", "name": "one", "member_count": 1, "unavailable": false}),
            )
            .unwrap();

        while gateway.requests().is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let nonce = gateway.requests()[0].1.nonce.clone();
        state
            .parse(
                "GUILD_MEMBERS_CHUNK",
                &json!({
                    "guild_id": "1",
                    "nonce": nonce,
                    "chunk_index": 0,
                    "chunk_count": 1,
                    "members": [{"user": {"id": "7", "username": "ann"}, "joined_at": "2024"}]
                }),
            )
            .unwrap();

        let names = names_until_ready(&mut events).await;
        assert_eq!(names, vec!["connect", "guild_available", "ready"]);
        assert!(state.get_guild(1).unwrap().read().is_chunked());
    }

    #[tokio::test]
    async fn test_malformed_ready_keeps_previous_session() {
        let (state, mut events) = state(config(false), Arc::default());
        state.parse("GUILD_CREATE", &json!({"id": "7", "name": "kept"})).unwrap();
        events.drain();

        let mut missing_user = ready_payload();
        missing_user.as_object_mut().unwrap().remove("user");
        assert!(state.parse("READY", &missing_user).is_err());
        assert!(!state.is_collecting_guilds());
        assert!(state.get_guild(7).is_some());
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn test_bad_ready_guild_closes_the_queue() {
        let (state, mut events) = state(config(false), Arc::default());
        let mut payload = ready_payload();
        payload["guilds"] = json!([{"id": "1", "unavailable": true}, {"name": "no id"}]);
        assert!(state.parse("READY", &payload).is_err());
        assert!(!state.is_collecting_guilds());
        assert!(events.drain().is_empty());

        // the next session starts normally
        state.parse("READY", &ready_payload()).unwrap();
        assert!(state.is_collecting_guilds());
        assert_eq!(names_until_ready(&mut events).await, vec!["connect", "ready"]);
    }

    #[tokio::test]
    async fn test_second_ready_supersedes_first() {
        let (state, mut events) = state(config(false), Arc::default());
        state.parse("READY", &ready_payload()).unwrap();
        state.parse("READY", &ready_payload()).unwrap();

        let names = names_until_ready(&mut events).await;
        assert_eq!(names, vec!["connect", "connect", "ready"]);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(events.try_next().is_none());
    }

    #[tokio::test]
    async fn test_late_guild_is_chunked_then_joined() {
        let gateway = Arc::new(RecordingGateway::default());
        let (state, mut events) = state(config(true), gateway.clone());
        state
            .parse("GUILD_CREATE", &json!({"id": "8", "name": "late", "member_count": 4}))
            .unwrap();
        assert!(events.try_next().is_none());

        let event = events.next().await.unwrap();
        assert_eq!(event.name(), "guild_join");
        assert_eq!(gateway.requests().len(), 1);
    }
}
