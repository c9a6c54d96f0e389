//! In-memory entity cache.
//!
//! The cache maintains ID-keyed maps for every entity the event stream can
//! reference. Shared entities (guilds, users, messages) are stored as
//! [`Shared`] handles so a single instance is visible to everyone holding it.
//!
//! # Indexing
//!
//! Every entity reachable from a guild is also indexable by ID in O(1):
//! emojis and stickers live in global maps, guild channels and threads are
//! found through a channel → guild index.
//!
//! # Locking
//!
//! [`ConnectionState`](crate::ConnectionState) holds the cache behind a
//! `parking_lot::RwLock`. Methods here lock individual guilds internally,
//! so the lock order is always cache first, then guild.

mod messages;
mod private;

pub use messages::MessageRing;
pub use private::PrivateChannels;

use crate::config::StateConfig;
use crate::error::Result;
use crate::model::{
    array, shared, Channel, Emoji, Guild, GuildSticker, Message, PrivateChannel, Shared,
    Snowflake, SoundboardSound, User,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// ID-keyed maps over every cached entity.
#[derive(Debug)]
pub struct EntityCache {
    users: HashMap<Snowflake, Shared<User>>,
    guilds: HashMap<Snowflake, Shared<Guild>>,
    emojis: HashMap<Snowflake, Arc<Emoji>>,
    stickers: HashMap<Snowflake, Arc<GuildSticker>>,
    soundboard_sounds: HashMap<Snowflake, Arc<SoundboardSound>>,
    /// Channel or thread ID → owning guild ID
    channel_index: HashMap<Snowflake, Snowflake>,
    private_channels: PrivateChannels,
    messages: Option<MessageRing>,
    cache_users: bool,

    /// The client's own user, set on session start
    pub user: Option<User>,
    /// Application of the current session, from `READY`
    pub application_id: Option<Snowflake>,
}

impl EntityCache {
    /// An empty cache sized by `config`.
    pub fn new(config: &StateConfig) -> Self {
        Self {
            users: HashMap::new(),
            guilds: HashMap::new(),
            emojis: HashMap::new(),
            stickers: HashMap::new(),
            soundboard_sounds: HashMap::new(),
            channel_index: HashMap::new(),
            private_channels: PrivateChannels::new(config.private_channel_capacity),
            messages: config.message_capacity().map(MessageRing::new),
            cache_users: config.intents.members() && !config.member_cache_flags().is_empty(),
            user: None,
            application_id: config.application_id,
        }
    }

    /// Drop every cached entity. The message ring keeps its capacity.
    pub fn clear(&mut self) {
        self.users.clear();
        self.guilds.clear();
        self.emojis.clear();
        self.stickers.clear();
        self.soundboard_sounds.clear();
        self.channel_index.clear();
        self.private_channels.clear();
        if let Some(ring) = self.messages.as_mut() {
            ring.clear();
        }
        self.user = None;
    }

    // ========== Users ==========

    /// A cached user.
    pub fn get_user(&self, id: Snowflake) -> Option<Shared<User>> {
        self.users.get(&id).cloned()
    }

    /// Every cached user.
    pub fn users(&self) -> Vec<Shared<User>> {
        self.users.values().cloned().collect()
    }

    /// Return the cached user for this payload, creating it on first sighting.
    ///
    /// Webhook pseudo-users are created but not cached. When the member cache
    /// is disabled, no user is ever cached.
    pub fn store_user(&mut self, data: &Value) -> Result<Shared<User>> {
        let id = crate::model::snowflake(data, "id")?;
        if let Some(user) = self.users.get(&id) {
            return Ok(user.clone());
        }
        let user = User::from_payload(data)?;
        let cacheable = self.cache_users && !user.is_webhook();
        let handle = shared(user);
        if cacheable {
            self.users.insert(id, handle.clone());
        }
        Ok(handle)
    }

    /// Cache an already-built user unless one with the same ID exists.
    pub fn store_user_value(&mut self, user: &User) -> Shared<User> {
        if let Some(existing) = self.users.get(&user.id) {
            return existing.clone();
        }
        let handle = shared(user.clone());
        if self.cache_users && !user.is_webhook() {
            self.users.insert(user.id, handle.clone());
        }
        handle
    }

    // ========== Guilds ==========

    /// A cached guild.
    pub fn get_guild(&self, id: Snowflake) -> Option<Shared<Guild>> {
        self.guilds.get(&id).cloned()
    }

    /// Every cached guild.
    pub fn guilds(&self) -> Vec<Shared<Guild>> {
        self.guilds.values().cloned().collect()
    }

    /// Build a guild from a full payload and cache it with its expressions and channels.
    pub fn add_guild_from_data(&mut self, data: &Value) -> Result<Shared<Guild>> {
        let mut guild = Guild::from_payload(data)?;
        self.load_guild_expressions(&mut guild, data)?;
        let handle = shared(guild);
        self.add_guild(handle.clone());
        Ok(handle)
    }

    /// Re-read a full payload into an already cached guild.
    pub fn refresh_guild(&mut self, handle: &Shared<Guild>, data: &Value) -> Result<()> {
        let mut guild = handle.write();
        guild.refresh(data)?;
        if data.get("emojis").is_some() || data.get("stickers").is_some() {
            self.load_guild_expressions(&mut guild, data)?;
        }
        let id = guild.id();
        for channel_id in guild.channels.keys().chain(guild.threads.keys()) {
            self.channel_index.insert(*channel_id, id);
        }
        Ok(())
    }

    fn load_guild_expressions(&mut self, guild: &mut Guild, data: &Value) -> Result<()> {
        let id = guild.id();
        if data.get("emojis").is_some() {
            for old in guild.emojis.drain(..) {
                self.emojis.remove(&old.id);
            }
            for raw in array(data, "emojis") {
                guild.emojis.push(self.store_emoji(id, raw)?);
            }
        }
        if data.get("stickers").is_some() {
            for old in guild.stickers.drain(..) {
                self.stickers.remove(&old.id);
            }
            for raw in array(data, "stickers") {
                guild.stickers.push(self.store_sticker(id, raw)?);
            }
        }
        for raw in array(data, "soundboard_sounds") {
            let mut raw = raw.clone();
            if raw.get("guild_id").is_none() {
                raw["guild_id"] = Value::String(id.to_string());
            }
            let sound = self.store_soundboard_sound(&raw)?;
            if !guild.soundboard_sounds.contains(&sound.id) {
                guild.soundboard_sounds.push(sound.id);
            }
        }
        Ok(())
    }

    /// Cache a guild handle and index its channels and threads.
    pub fn add_guild(&mut self, handle: Shared<Guild>) {
        let id = {
            let guild = handle.read();
            for channel_id in guild.channels.keys().chain(guild.threads.keys()) {
                self.channel_index.insert(*channel_id, guild.id());
            }
            guild.id()
        };
        self.guilds.insert(id, handle);
    }

    /// Remove a guild and everything indexed on its behalf.
    ///
    /// Emojis, stickers and soundboard sounds owned by the guild leave the
    /// global maps, its channel index entries are purged, and its messages are
    /// filtered out of the ring without reordering the rest.
    pub fn remove_guild(&mut self, id: Snowflake) -> Option<Shared<Guild>> {
        let handle = self.guilds.remove(&id)?;
        self.unindex_guild(&handle.read());
        if let Some(ring) = self.messages.as_mut() {
            ring.retain(|m| m.guild_id != Some(id));
        }
        Some(handle)
    }

    /// Swap a cached guild for one built from a full payload.
    ///
    /// The old guild's expressions and channel index entries are replaced by
    /// the new guild's. Cached messages stay where they are.
    pub fn replace_guild(&mut self, data: &Value) -> Result<Shared<Guild>> {
        let mut guild = Guild::from_payload(data)?;
        if let Some(old) = self.guilds.remove(&guild.id()) {
            self.unindex_guild(&old.read());
        }
        self.load_guild_expressions(&mut guild, data)?;
        let handle = shared(guild);
        self.add_guild(handle.clone());
        Ok(handle)
    }

    fn unindex_guild(&mut self, guild: &Guild) {
        for emoji in &guild.emojis {
            self.emojis.remove(&emoji.id);
        }
        for sticker in &guild.stickers {
            self.stickers.remove(&sticker.id);
        }
        for sound in &guild.soundboard_sounds {
            self.soundboard_sounds.remove(sound);
        }
        let id = guild.id();
        self.channel_index.retain(|_, guild_id| *guild_id != id);
    }

    // ========== Expressions ==========

    /// A custom emoji of any cached guild.
    pub fn get_emoji(&self, id: Snowflake) -> Option<Arc<Emoji>> {
        self.emojis.get(&id).cloned()
    }

    /// Every cached custom emoji.
    pub fn emojis(&self) -> Vec<Arc<Emoji>> {
        self.emojis.values().cloned().collect()
    }

    /// Build and cache an emoji owned by `guild_id`, replacing any with the same ID.
    pub fn store_emoji(&mut self, guild_id: Snowflake, data: &Value) -> Result<Arc<Emoji>> {
        let emoji = Arc::new(Emoji::from_payload(guild_id, data)?);
        self.emojis.insert(emoji.id, emoji.clone());
        Ok(emoji)
    }

    /// Forget an emoji.
    pub fn remove_emoji(&mut self, id: Snowflake) -> Option<Arc<Emoji>> {
        self.emojis.remove(&id)
    }

    /// A sticker of any cached guild.
    pub fn get_sticker(&self, id: Snowflake) -> Option<Arc<GuildSticker>> {
        self.stickers.get(&id).cloned()
    }

    /// Every cached sticker.
    pub fn stickers(&self) -> Vec<Arc<GuildSticker>> {
        self.stickers.values().cloned().collect()
    }

    /// Build and cache a sticker owned by `guild_id`, replacing any with the same ID.
    pub fn store_sticker(&mut self, guild_id: Snowflake, data: &Value) -> Result<Arc<GuildSticker>> {
        let sticker = Arc::new(GuildSticker::from_payload(guild_id, data)?);
        self.stickers.insert(sticker.id, sticker.clone());
        Ok(sticker)
    }

    /// Forget a sticker.
    pub fn remove_sticker(&mut self, id: Snowflake) -> Option<Arc<GuildSticker>> {
        self.stickers.remove(&id)
    }

    /// Replace a guild's emoji list, returning `(before, after)`.
    pub fn replace_guild_emojis(
        &mut self,
        guild: &mut Guild,
        data: &[Value],
    ) -> Result<(Vec<Arc<Emoji>>, Vec<Arc<Emoji>>)> {
        let id = guild.id();
        let after = data
            .iter()
            .map(|raw| Emoji::from_payload(id, raw).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        let before = std::mem::replace(&mut guild.emojis, after.clone());
        for old in &before {
            self.emojis.remove(&old.id);
        }
        for emoji in &after {
            self.emojis.insert(emoji.id, emoji.clone());
        }
        Ok((before, after))
    }

    /// Replace a guild's sticker list, returning `(before, after)`.
    pub fn replace_guild_stickers(
        &mut self,
        guild: &mut Guild,
        data: &[Value],
    ) -> Result<(Vec<Arc<GuildSticker>>, Vec<Arc<GuildSticker>>)> {
        let id = guild.id();
        let after = data
            .iter()
            .map(|raw| GuildSticker::from_payload(id, raw).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        let before = std::mem::replace(&mut guild.stickers, after.clone());
        for old in &before {
            self.stickers.remove(&old.id);
        }
        for sticker in &after {
            self.stickers.insert(sticker.id, sticker.clone());
        }
        Ok((before, after))
    }

    /// A soundboard sound of any cached guild.
    pub fn get_soundboard_sound(&self, id: Snowflake) -> Option<Arc<SoundboardSound>> {
        self.soundboard_sounds.get(&id).cloned()
    }

    /// Every cached soundboard sound.
    pub fn soundboard_sounds(&self) -> Vec<Arc<SoundboardSound>> {
        self.soundboard_sounds.values().cloned().collect()
    }

    /// Build and cache a sound, replacing any with the same ID.
    pub fn store_soundboard_sound(&mut self, data: &Value) -> Result<Arc<SoundboardSound>> {
        let sound = Arc::new(SoundboardSound::from_payload(data)?);
        self.soundboard_sounds.insert(sound.id, sound.clone());
        Ok(sound)
    }

    /// Forget a soundboard sound.
    pub fn remove_soundboard_sound(&mut self, id: Snowflake) -> Option<Arc<SoundboardSound>> {
        self.soundboard_sounds.remove(&id)
    }

    // ========== Channels ==========

    pub(crate) fn index_channel(&mut self, channel_id: Snowflake, guild_id: Snowflake) {
        self.channel_index.insert(channel_id, guild_id);
    }

    pub(crate) fn unindex_channel(&mut self, channel_id: Snowflake) {
        self.channel_index.remove(&channel_id);
    }

    /// The guild owning a channel or thread.
    pub fn guild_for_channel(&self, channel_id: Snowflake) -> Option<Shared<Guild>> {
        let guild_id = self.channel_index.get(&channel_id)?;
        self.guilds.get(guild_id).cloned()
    }

    /// Resolve any channel by ID: private channels first, then guild channels and threads.
    pub fn get_channel(&mut self, id: Snowflake) -> Option<Channel> {
        if let Some(channel) = self.private_channels.get(id) {
            return Some(Channel::Private(channel.clone()));
        }
        let guild = self.guild_for_channel(id)?;
        let guild = guild.read();
        guild.resolve_channel(id)
    }

    /// Insert or refresh a private channel, evicting the least recently used one when full.
    pub fn add_private_channel(&mut self, channel: PrivateChannel) {
        self.private_channels.insert(channel);
    }

    /// A private channel by ID. Counts as a use.
    pub fn get_private_channel(&mut self, id: Snowflake) -> Option<PrivateChannel> {
        self.private_channels.get(id).cloned()
    }

    pub(crate) fn private_channel_mut(&mut self, id: Snowflake) -> Option<&mut PrivateChannel> {
        self.private_channels.get_mut(id)
    }

    /// The DM channel with a user. Counts as a use.
    pub fn get_private_channel_by_user(&mut self, user_id: Snowflake) -> Option<PrivateChannel> {
        self.private_channels.get_by_user(user_id).cloned()
    }

    /// Forget a private channel and its recipient entry.
    pub fn remove_private_channel(&mut self, id: Snowflake) -> Option<PrivateChannel> {
        self.private_channels.remove(id)
    }

    /// Most recently used first.
    pub fn private_channels(&self) -> Vec<PrivateChannel> {
        self.private_channels.iter().cloned().collect()
    }

    // ========== Messages ==========

    /// Whether message caching is enabled.
    pub fn caches_messages(&self) -> bool {
        self.messages.is_some()
    }

    /// Cache a message. With caching disabled the handle is returned uncached.
    pub fn store_message(&mut self, message: Message) -> Shared<Message> {
        let handle = shared(message);
        if let Some(ring) = self.messages.as_mut() {
            ring.push(handle.clone());
        }
        handle
    }

    /// A message from the ring.
    pub fn get_message(&self, id: Snowflake) -> Option<Shared<Message>> {
        self.messages.as_ref()?.find(id)
    }

    /// Take a message out of the ring.
    pub fn remove_message(&mut self, id: Snowflake) -> Option<Shared<Message>> {
        self.messages.as_mut()?.remove(id)
    }

    /// Oldest first.
    pub fn messages(&self) -> Vec<Shared<Message>> {
        self.messages
            .as_ref()
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }
}
