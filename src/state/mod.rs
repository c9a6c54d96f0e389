//! The connection state: cache, chunk tracker, command registry and the
//! parser table that keeps them in step with the event stream.
//!
//! [`ConnectionState`] is a cheap `Clone` handle. Every piece of mutable
//! state sits behind its own `parking_lot` lock and no lock is ever held
//! across an `.await`, so parsers (plain synchronous functions) finish every
//! mutation for an event before its notifications go out and before the next
//! event is parsed.
//!
//! # Examples
//!
//! ```
//! use chord_state::gateway::NullGateway;
//! use chord_state::{ConnectionState, StateConfig};
//! # use chord_state::http::{RestClient, RestConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # let http = Arc::new(RestClient::new(RestConfig::default()).unwrap());
//! let (state, mut events) =
//!     ConnectionState::new(StateConfig::default(), Arc::new(NullGateway), http).unwrap();
//!
//! state.parse("guild_create", &json!({"id": "1", "name": "home"})).unwrap();
//! assert_eq!(state.get_guild(1).unwrap().read().name(), "home");
//! assert_eq!(events.try_next().map(|e| e.name()), Some("guild_join"));
//! ```

mod event;
mod parsers;
mod ready;

pub use event::{Actor, Event, EventStream};

use crate::cache::EntityCache;
use crate::chunk::{ChunkTracker, ChunkWaiter};
use crate::commands::sync::{CommandSync, ScopedListings, SyncOptions};
use crate::commands::{AddOptions, CommandHandle, CommandRegistry, CommandType, ResolvedCommand};
use crate::config::StateConfig;
use crate::error::{Result, StateError};
use crate::gateway::{ChunkQuery, Gateway};
use crate::http::CommandHttp;
use crate::model::{
    opt_snowflake, Channel, Emoji, Guild, GuildSticker, Member, Message, PrivateChannel, Shared,
    Snowflake, SoundboardSound, User,
};
use futures::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use ready::ReadySlot;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// A parser: mutate the state for one event payload and emit notifications.
pub(crate) type Parser = fn(&ConnectionState, &Value) -> Result<()>;

struct StateInner {
    config: StateConfig,
    cache: RwLock<EntityCache>,
    chunks: Mutex<ChunkTracker>,
    commands: RwLock<CommandRegistry>,
    ready: ReadySlot,
    gateway: Arc<dyn Gateway>,
    http: Arc<dyn CommandHttp>,
    events: mpsc::UnboundedSender<Event>,
    parsers: HashMap<&'static str, Parser>,
}

/// Parameters of [`ConnectionState::query_members`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberQuery {
    /// Username prefix
    pub query: Option<String>,
    /// Maximum members to return; 0 means no limit
    pub limit: u32,
    /// Fetch these users instead of matching a prefix
    pub user_ids: Vec<Snowflake>,
    /// Include presences with the members
    pub presences: bool,
    /// Merge the returned members into the guild
    pub cache: bool,
}

impl MemberQuery {
    /// Members whose username starts with `prefix`.
    pub fn prefix(prefix: impl Into<String>, limit: u32) -> Self {
        Self {
            query: Some(prefix.into()),
            limit,
            cache: true,
            ..Default::default()
        }
    }

    /// Specific members by user ID.
    pub fn users(user_ids: Vec<Snowflake>) -> Self {
        Self {
            limit: user_ids.len() as u32,
            user_ids,
            cache: true,
            ..Default::default()
        }
    }
}

/// Shared handle to the connection state.
#[derive(Clone)]
pub struct ConnectionState {
    inner: Arc<StateInner>,
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("config", &self.inner.config)
            .field("parsers", &self.inner.parsers.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionState {
    /// Create the state and the stream its notifications arrive on.
    ///
    /// # Errors
    ///
    /// [`StateError::Config`] when the configuration contradicts itself.
    pub fn new(
        config: StateConfig,
        gateway: Arc<dyn Gateway>,
        http: Arc<dyn CommandHttp>,
    ) -> Result<(Self, EventStream)> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = StateInner {
            cache: RwLock::new(EntityCache::new(&config)),
            chunks: Mutex::new(ChunkTracker::new()),
            commands: RwLock::new(CommandRegistry::new()),
            ready: ReadySlot::default(),
            gateway,
            http,
            events: tx,
            parsers: parsers::table(),
            config,
        };
        let state = ConnectionState {
            inner: Arc::new(inner),
        };
        Ok((state, EventStream::new(rx)))
    }

    /// The configuration the state was built with.
    pub fn config(&self) -> &StateConfig {
        &self.inner.config
    }

    // ========== Dispatch ==========

    /// Handle one gateway event.
    ///
    /// The name is matched case-insensitively. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// [`StateError::MissingField`] when the payload lacks a key the parser
    /// needs. The cache may hold partial changes from that event.
    pub fn parse(&self, event: &str, data: &Value) -> Result<()> {
        let name = event.to_ascii_uppercase();
        match self.inner.parsers.get(name.as_str()) {
            Some(parser) => parser(self, data),
            None => {
                tracing::trace!(event = %name, "Ignoring unknown event");
                Ok(())
            }
        }
    }

    /// Handle a stream of `(name, payload)` events strictly in order.
    ///
    /// Parser errors are logged and do not stop the loop. Returns when the
    /// stream ends.
    pub async fn process_events<S>(&self, events: S)
    where
        S: Stream<Item = (String, Value)>,
    {
        futures::pin_mut!(events);
        while let Some((name, data)) = events.next().await {
            if let Err(e) = self.parse(&name, &data) {
                tracing::error!(event = %name, "Failed to handle event: {}", e);
            }
        }
    }

    pub(crate) fn dispatch(&self, event: Event) {
        tracing::trace!(event = event.name(), "Dispatching");
        // a closed receiver only means nobody listens anymore
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn cache_mut(&self) -> RwLockWriteGuard<'_, EntityCache> {
        self.inner.cache.write()
    }

    /// The guild named by `data["guild_id"]`, logging a discard when unknown.
    pub(crate) fn known_guild(&self, data: &Value, event: &str) -> Option<Shared<Guild>> {
        let guild_id = opt_snowflake(data, "guild_id")?;
        let guild = self.get_guild(guild_id);
        if guild.is_none() {
            tracing::debug!("{} referencing an unknown guild ID: {}. Discarding.", event, guild_id);
        }
        guild
    }

    // ========== Cache ==========

    /// Read access to the whole cache. Do not hold the guard across an `.await`.
    pub fn cache(&self) -> RwLockReadGuard<'_, EntityCache> {
        self.inner.cache.read()
    }

    /// The client's own user, once a session has started.
    pub fn user(&self) -> Option<User> {
        self.cache().user.clone()
    }

    /// Application of the current session, from `READY`.
    pub fn application_id(&self) -> Option<Snowflake> {
        self.cache().application_id
    }

    /// A cached user.
    pub fn get_user(&self, id: Snowflake) -> Option<Shared<User>> {
        self.cache().get_user(id)
    }

    /// A cached guild.
    pub fn get_guild(&self, id: Snowflake) -> Option<Shared<Guild>> {
        self.cache().get_guild(id)
    }

    /// Every cached guild.
    pub fn guilds(&self) -> Vec<Shared<Guild>> {
        self.cache().guilds()
    }

    /// Any channel by ID. Touching a private channel refreshes its LRU position.
    pub fn get_channel(&self, id: Snowflake) -> Option<Channel> {
        self.cache_mut().get_channel(id)
    }

    /// A cached private channel.
    pub fn get_private_channel(&self, id: Snowflake) -> Option<PrivateChannel> {
        self.cache_mut().get_private_channel(id)
    }

    /// The cached DM channel with a user.
    pub fn get_private_channel_by_user(&self, user_id: Snowflake) -> Option<PrivateChannel> {
        self.cache_mut().get_private_channel_by_user(user_id)
    }

    /// A cached custom emoji.
    pub fn get_emoji(&self, id: Snowflake) -> Option<Arc<Emoji>> {
        self.cache().get_emoji(id)
    }

    /// A cached sticker.
    pub fn get_sticker(&self, id: Snowflake) -> Option<Arc<GuildSticker>> {
        self.cache().get_sticker(id)
    }

    /// A cached soundboard sound.
    pub fn get_soundboard_sound(&self, id: Snowflake) -> Option<Arc<SoundboardSound>> {
        self.cache().get_soundboard_sound(id)
    }

    /// A message from the ring.
    pub fn get_message(&self, id: Snowflake) -> Option<Shared<Message>> {
        self.cache().get_message(id)
    }

    // ========== Member chunks ==========

    /// Fetch members matching `query` through the gateway.
    ///
    /// # Errors
    ///
    /// [`StateError::ChunkTimeout`] when the gateway refuses the request or
    /// the chunks do not arrive within `chunk_timeout`. The pending request is
    /// dropped in both cases.
    pub async fn query_members(&self, guild_id: Snowflake, query: MemberQuery) -> Result<Vec<Member>> {
        let handle = self.inner.chunks.lock().request(guild_id, query.cache);
        let waiter = handle.wait();
        let request = ChunkQuery {
            query: query.query,
            limit: query.limit,
            user_ids: query.user_ids,
            presences: query.presences,
            nonce: handle.nonce().to_owned(),
        };

        if let Err(e) = self.inner.gateway.request_chunks(guild_id, request).await {
            tracing::warn!(guild_id, "Member query could not be sent: {}", e);
            self.inner.chunks.lock().remove(handle.nonce());
            return Err(StateError::ChunkTimeout { guild_id });
        }

        match timeout(self.inner.config.chunk_timeout, waiter).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(guild_id, "Timed out waiting for chunks with query {:?}", handle.nonce());
                self.inner.chunks.lock().remove(handle.nonce());
                Err(StateError::ChunkTimeout { guild_id })
            }
        }
    }

    /// Chunk every member of a guild, joining an in-flight request if one exists.
    ///
    /// Resolves once the request is sent; await the returned waiter for the
    /// members.
    ///
    /// # Errors
    ///
    /// [`StateError::ChunkTimeout`] when the gateway refuses the request.
    pub async fn chunk_guild(&self, guild_id: Snowflake, cache: bool) -> Result<ChunkWaiter> {
        let (handle, fresh) = self.inner.chunks.lock().guild_request(guild_id, cache);
        let waiter = handle.wait();
        if fresh {
            let presences = self.inner.config.intents.presences();
            let request = ChunkQuery::all(handle.nonce(), presences);
            if let Err(e) = self.inner.gateway.request_chunks(guild_id, request).await {
                tracing::warn!(guild_id, "Chunk request could not be sent: {}", e);
                self.inner.chunks.lock().remove(handle.nonce());
                return Err(StateError::ChunkTimeout { guild_id });
            }
        }
        Ok(waiter)
    }

    pub(crate) fn chunks(&self) -> &Mutex<ChunkTracker> {
        &self.inner.chunks
    }

    // ========== Application commands ==========

    fn command_sync(&self) -> CommandSync<'_> {
        CommandSync::new(self.inner.http.as_ref(), &self.inner.commands)
    }

    /// Read access to the command registry.
    pub fn commands(&self) -> RwLockReadGuard<'_, CommandRegistry> {
        self.inner.commands.read()
    }

    /// Add a command to the registry.
    ///
    /// # Errors
    ///
    /// [`StateError::DuplicateCommand`] when another command owns one of its
    /// signatures or IDs and `overwrite` is off.
    pub fn add_application_command(&self, command: &CommandHandle, options: AddOptions) -> Result<()> {
        self.inner.commands.write().add(command, options)
    }

    /// Drop a command and everything it owns from the registry.
    pub fn remove_application_command(&self, command: &CommandHandle) {
        self.inner.commands.write().remove(command);
    }

    /// The command bound to a remote ID.
    pub fn get_application_command(&self, id: Snowflake) -> Option<CommandHandle> {
        self.commands().get_by_id(id)
    }

    /// Resolve a qualified command name in one scope.
    pub fn get_application_command_from_signature(
        &self,
        kind: CommandType,
        qualified_name: &str,
        guild_id: Option<Snowflake>,
    ) -> Option<ResolvedCommand> {
        self.commands().get_from_signature(kind, qualified_name, guild_id)
    }

    /// Like [`get_application_command_from_signature`](Self::get_application_command_from_signature),
    /// falling back to localized names at each level.
    pub fn get_application_command_from_localized_signature(
        &self,
        kind: CommandType,
        qualified_name: &str,
        guild_id: Option<Snowflake>,
    ) -> Option<ResolvedCommand> {
        self.commands().get_from_localized_signature(kind, qualified_name, guild_id)
    }

    /// Commands registered globally, or that want to be when `rollout` is set.
    pub fn get_global_application_commands(&self, rollout: bool) -> Vec<CommandHandle> {
        self.commands().global_commands(rollout)
    }

    /// Commands targeting a guild. `None` returns every command.
    pub fn get_guild_application_commands(
        &self,
        guild_id: Option<Snowflake>,
        rollout: bool,
    ) -> Vec<CommandHandle> {
        self.commands().guild_commands(guild_id, rollout)
    }

    /// Re-index every command by its rollout signatures.
    pub fn add_all_rollout_signatures(&self) -> Result<()> {
        self.inner.commands.write().add_all_rollout_signatures()
    }

    /// Reconcile every scope the registered commands target.
    pub async fn sync_all_application_commands(
        &self,
        data: Option<ScopedListings>,
        options: SyncOptions,
    ) -> Result<()> {
        self.command_sync().sync_all(data, options).await
    }

    /// Reconcile one scope.
    pub async fn sync_application_commands(
        &self,
        data: Option<Vec<Value>>,
        guild_id: Option<Snowflake>,
        options: SyncOptions,
    ) -> Result<()> {
        self.command_sync().sync(data, guild_id, options).await
    }

    /// Associate, update and delete against one scope's listing.
    pub async fn discover_application_commands(
        &self,
        data: Option<Vec<Value>>,
        guild_id: Option<Snowflake>,
        options: SyncOptions,
    ) -> Result<()> {
        self.command_sync().discover(data, guild_id, options).await
    }

    /// Upsert every local command of the scope the listing lacks.
    pub async fn register_new_application_commands(
        &self,
        data: Option<Vec<Value>>,
        guild_id: Option<Snowflake>,
    ) -> Result<()> {
        self.command_sync().register_new(data, guild_id).await
    }

    /// Upsert one command and bind the returned ID.
    pub async fn register_application_command(
        &self,
        command: &CommandHandle,
        guild_id: Option<Snowflake>,
    ) -> Result<()> {
        self.command_sync().register_command(command, guild_id).await
    }

    /// Delete one command remotely and drop its ID binding.
    pub async fn delete_application_command(
        &self,
        command: &CommandHandle,
        guild_id: Option<Snowflake>,
    ) -> Result<()> {
        self.command_sync().delete_command(command, guild_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ApplicationCommand;
    use crate::config::Intents;
    use crate::test_support::{RecordingGateway, RecordingHttp};
    use serde_json::json;
    use std::time::Duration;

    fn state_with(gateway: Arc<RecordingGateway>, config: StateConfig) -> (ConnectionState, EventStream) {
        ConnectionState::new(config, gateway, Arc::new(RecordingHttp::default())).unwrap()
    }

    fn members_config() -> StateConfig {
        StateConfig {
            intents: Intents::default() | Intents::GUILD_MEMBERS,
            chunk_guilds_at_startup: Some(false),
            chunk_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_chunking_without_members_intent() {
        let config = StateConfig {
            chunk_guilds_at_startup: Some(true),
            ..Default::default()
        };
        let err = ConnectionState::new(config, Arc::new(RecordingGateway::default()), Arc::new(RecordingHttp::default()))
            .unwrap_err();
        assert!(matches!(err, StateError::Config(_)));
    }

    #[test]
    fn test_parse_is_case_insensitive_and_ignores_unknown() {
        let (state, mut events) = state_with(Arc::default(), StateConfig::default());
        state.parse("NOT_AN_EVENT", &json!({})).unwrap();
        assert!(events.try_next().is_none());

        state.parse("guild_create", &json!({"id": "3", "name": "g"})).unwrap();
        assert!(state.get_guild(3).is_some());
    }

    #[tokio::test]
    async fn test_process_events_continues_after_errors() {
        let (state, mut events) = state_with(Arc::default(), StateConfig::default());
        let stream = futures::stream::iter(vec![
            ("GUILD_CREATE".to_string(), json!({"name": "no id"})),
            ("GUILD_CREATE".to_string(), json!({"id": "4", "name": "ok"})),
        ]);
        state.process_events(stream).await;

        assert!(state.get_guild(4).is_some());
        assert_eq!(events.try_next().map(|e| e.name()), Some("guild_join"));
    }

    #[tokio::test]
    async fn test_query_members_completes_from_chunk() {
        let gateway = Arc::new(RecordingGateway::default());
        let (state, _events) = state_with(gateway.clone(), members_config());
        state.parse("GUILD_CREATE", &json!({"id": "1", "name": "g"})).unwrap();

        let task = tokio::spawn({
            let state = state.clone();
            async move { state.query_members(1, MemberQuery::prefix("a", 10)).await }
        });
        while gateway.requests().is_empty() {
            tokio::task::yield_now().await;
        }
        let (guild_id, query) = gateway.requests().remove(0);
        assert_eq!(guild_id, 1);
        assert_eq!(query.query.as_deref(), Some("a"));

        state
            .parse(
                "GUILD_MEMBERS_CHUNK",
                &json!({
                    "guild_id": "1",
                    "nonce": query.nonce,
                    "chunk_index": 0,
                    "chunk_count": 1,
                    "members": [{"user": {"id": "7", "username": "ann"}, "joined_at": "2024"}]
                }),
            )
            .unwrap();

        let members = task.await.unwrap().unwrap();
        assert_eq!(members.len(), 1);
        assert!(state.get_guild(1).unwrap().read().get_member(7).is_some());
        assert!(state.chunks().lock().is_empty());
    }

    #[tokio::test]
    async fn test_query_members_times_out() {
        let (state, _events) = state_with(Arc::default(), members_config());
        let err = state
            .query_members(1, MemberQuery::prefix("", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::ChunkTimeout { guild_id: 1 }));
        assert!(state.chunks().lock().is_empty());
    }

    #[tokio::test]
    async fn test_query_members_gateway_failure_is_timeout() {
        let (state, _events) = state_with(Arc::new(RecordingGateway::failing()), members_config());
        let err = state
            .query_members(1, MemberQuery::users(vec![5]))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::ChunkTimeout { guild_id: 1 }));
        assert!(state.chunks().lock().is_empty());
    }

    #[tokio::test]
    async fn test_chunk_guild_reuses_in_flight_request() {
        let gateway = Arc::new(RecordingGateway::default());
        let (state, _events) = state_with(gateway.clone(), members_config());
        let first = state.chunk_guild(2, true).await.unwrap();
        let second = state.chunk_guild(2, true).await.unwrap();
        assert_eq!(gateway.requests().len(), 1);

        let nonce = gateway.requests()[0].1.nonce.clone();
        state.chunks().lock().complete(&nonce);
        assert!(first.await.unwrap().is_empty());
        assert!(second.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_through_state() {
        let (state, _events) = state_with(Arc::default(), StateConfig::default());
        let ping = ApplicationCommand::slash("ping").description("pong").into_handle();
        state.add_application_command(&ping, AddOptions::default()).unwrap();

        state.register_application_command(&ping, None).await.unwrap();
        let id = ping.read().command_ids[&None];
        assert!(Arc::ptr_eq(&state.get_application_command(id).unwrap(), &ping));

        state.delete_application_command(&ping, None).await.unwrap();
        assert!(state.get_application_command(id).is_none());
    }
}
