//! Guilds and the entities they own.
//!
//! A [`Guild`] keeps its scalar attributes in [`GuildInfo`] so that update
//! events can snapshot just the attributes without cloning every member and
//! channel. Child collections are owned directly by the guild.

use super::{
    array, flag, opt_snowflake, opt_string, opt_u64, snowflake, Channel, Emoji, GuildChannel,
    GuildSticker, Member, Snowflake, Thread,
};
use crate::error::Result;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Scalar guild attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildInfo {
    /// Guild ID
    pub id: Snowflake,
    /// Guild name
    pub name: String,
    /// Icon hash
    pub icon: Option<String>,
    /// Guild owner
    pub owner_id: Option<Snowflake>,
    /// Guild description
    pub description: Option<String>,
    /// In an outage
    pub unavailable: bool,
    /// Over the platform's large-guild threshold
    pub large: bool,
    /// Total members as reported by the platform
    pub member_count: Option<u64>,
    /// Boost level
    pub premium_tier: u64,
    /// Enabled feature flags
    pub features: Vec<String>,
}

impl GuildInfo {
    fn from_payload(data: &Value) -> Result<Self> {
        Ok(GuildInfo {
            id: snowflake(data, "id")?,
            name: opt_string(data, "name").unwrap_or_default(),
            icon: opt_string(data, "icon"),
            owner_id: opt_snowflake(data, "owner_id"),
            description: opt_string(data, "description"),
            unavailable: flag(data, "unavailable"),
            large: flag(data, "large"),
            member_count: opt_u64(data, "member_count"),
            premium_tier: opt_u64(data, "premium_tier").unwrap_or(0),
            features: array(data, "features")
                .iter()
                .filter_map(|f| f.as_str().map(str::to_owned))
                .collect(),
        })
    }

    fn update(&mut self, data: &Value) {
        if let Some(name) = opt_string(data, "name") {
            self.name = name;
        }
        if data.get("icon").is_some() {
            self.icon = opt_string(data, "icon");
        }
        if let Some(owner) = opt_snowflake(data, "owner_id") {
            self.owner_id = Some(owner);
        }
        if data.get("description").is_some() {
            self.description = opt_string(data, "description");
        }
        if let Some(large) = data.get("large").and_then(Value::as_bool) {
            self.large = large;
        }
        if let Some(count) = opt_u64(data, "member_count") {
            self.member_count = Some(count);
        }
        if let Some(tier) = opt_u64(data, "premium_tier") {
            self.premium_tier = tier;
        }
        if data.get("features").is_some() {
            self.features = array(data, "features")
                .iter()
                .filter_map(|f| f.as_str().map(str::to_owned))
                .collect();
        }
    }
}

/// A guild role.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    /// Role ID
    pub id: Snowflake,
    /// Owning guild
    pub guild_id: Snowflake,
    /// Role name
    pub name: String,
    /// RGB color
    pub color: u64,
    /// Hierarchy position
    pub position: i64,
    /// Permission bits
    pub permissions: u64,
    /// Shown separately in the member list
    pub hoist: bool,
    /// Owned by an integration
    pub managed: bool,
    /// Anyone may mention it
    pub mentionable: bool,
}

impl Role {
    /// Build from a role payload of `guild_id`.
    pub fn from_payload(guild_id: Snowflake, data: &Value) -> Result<Self> {
        Ok(Role {
            id: snowflake(data, "id")?,
            guild_id,
            name: opt_string(data, "name").unwrap_or_default(),
            color: opt_u64(data, "color").unwrap_or(0),
            position: data.get("position").and_then(Value::as_i64).unwrap_or(0),
            // permissions travel as a string because the bitfield outgrows JSON numbers
            permissions: data.get("permissions").and_then(super::as_snowflake).unwrap_or(0),
            hoist: flag(data, "hoist"),
            managed: flag(data, "managed"),
            mentionable: flag(data, "mentionable"),
        })
    }
}

/// A live stage instance.
#[derive(Debug, Clone, PartialEq)]
pub struct StageInstance {
    /// Instance ID
    pub id: Snowflake,
    /// Owning guild
    pub guild_id: Snowflake,
    /// Stage channel
    pub channel_id: Snowflake,
    /// Stage topic
    pub topic: String,
    /// Privacy level code
    pub privacy_level: u64,
}

impl StageInstance {
    /// Build from a stage instance payload of `guild_id`.
    pub fn from_payload(guild_id: Snowflake, data: &Value) -> Result<Self> {
        Ok(StageInstance {
            id: snowflake(data, "id")?,
            guild_id,
            channel_id: snowflake(data, "channel_id")?,
            topic: opt_string(data, "topic").unwrap_or_default(),
            privacy_level: opt_u64(data, "privacy_level").unwrap_or(2),
        })
    }

    pub(crate) fn update(&mut self, data: &Value) {
        if let Some(topic) = opt_string(data, "topic") {
            self.topic = topic;
        }
        if let Some(level) = opt_u64(data, "privacy_level") {
            self.privacy_level = level;
        }
    }
}

/// A scheduled guild event.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    /// Event ID
    pub id: Snowflake,
    /// Owning guild
    pub guild_id: Snowflake,
    /// Hosting channel, if any
    pub channel_id: Option<Snowflake>,
    /// Event name
    pub name: String,
    /// Event description
    pub description: Option<String>,
    /// Status code
    pub status: u64,
    /// Scheduled start
    pub start_time: Option<String>,
    /// Subscriber count
    pub user_count: Option<u64>,
    /// Subscribers seen through user add and remove events
    pub subscribers: HashSet<Snowflake>,
}

impl ScheduledEvent {
    /// Build from a scheduled event payload of `guild_id`.
    pub fn from_payload(guild_id: Snowflake, data: &Value) -> Result<Self> {
        Ok(ScheduledEvent {
            id: snowflake(data, "id")?,
            guild_id,
            channel_id: opt_snowflake(data, "channel_id"),
            name: opt_string(data, "name").unwrap_or_default(),
            description: opt_string(data, "description"),
            status: opt_u64(data, "status").unwrap_or(1),
            start_time: opt_string(data, "scheduled_start_time"),
            user_count: opt_u64(data, "user_count"),
            subscribers: HashSet::new(),
        })
    }

    pub(crate) fn update(&mut self, data: &Value) -> Result<()> {
        let subscribers = std::mem::take(&mut self.subscribers);
        *self = ScheduledEvent::from_payload(self.guild_id, data)?;
        self.subscribers = subscribers;
        Ok(())
    }
}

/// A guild and everything it owns.
#[derive(Debug, Clone)]
pub struct Guild {
    /// Scalar attributes
    pub info: GuildInfo,
    pub(crate) channels: HashMap<Snowflake, GuildChannel>,
    pub(crate) threads: HashMap<Snowflake, Thread>,
    pub(crate) roles: HashMap<Snowflake, Role>,
    pub(crate) members: HashMap<Snowflake, Member>,
    pub(crate) stage_instances: HashMap<Snowflake, StageInstance>,
    pub(crate) scheduled_events: HashMap<Snowflake, ScheduledEvent>,
    pub(crate) emojis: Vec<Arc<Emoji>>,
    pub(crate) stickers: Vec<Arc<GuildSticker>>,
    pub(crate) soundboard_sounds: Vec<Snowflake>,
}

impl Guild {
    /// Build a guild from a guild-create payload.
    ///
    /// Emojis, stickers and soundboard sounds are left empty: they are
    /// global cache entries and are filled in by the entity cache.
    pub fn from_payload(data: &Value) -> Result<Self> {
        let mut guild = Guild {
            info: GuildInfo::from_payload(data)?,
            channels: HashMap::new(),
            threads: HashMap::new(),
            roles: HashMap::new(),
            members: HashMap::new(),
            stage_instances: HashMap::new(),
            scheduled_events: HashMap::new(),
            emojis: Vec::new(),
            stickers: Vec::new(),
            soundboard_sounds: Vec::new(),
        };
        guild.load_collections(data)?;
        Ok(guild)
    }

    fn load_collections(&mut self, data: &Value) -> Result<()> {
        let id = self.info.id;
        if data.get("roles").is_some() {
            self.roles = array(data, "roles")
                .iter()
                .map(|r| Role::from_payload(id, r).map(|r| (r.id, r)))
                .collect::<Result<_>>()?;
        }
        if data.get("channels").is_some() {
            self.channels.clear();
            for raw in array(data, "channels") {
                // unknown channel types are skipped, as with channel-create events
                if let Ok(channel) = GuildChannel::from_payload(id, raw) {
                    self.channels.insert(channel.id, channel);
                }
            }
        }
        if data.get("threads").is_some() {
            self.threads.clear();
            for raw in array(data, "threads") {
                let thread = Thread::from_payload(id, raw)?;
                self.threads.insert(thread.id, thread);
            }
        }
        for raw in array(data, "members") {
            let member = Member::from_payload(id, raw)?;
            self.members.insert(member.id(), member);
        }
        for presence in array(data, "presences") {
            let Some(user) = presence.get("user") else {
                continue;
            };
            if let Some(member) = super::opt_snowflake(user, "id").and_then(|uid| self.members.get_mut(&uid)) {
                member.presence_update(presence, user);
            }
        }
        if data.get("stage_instances").is_some() {
            self.stage_instances = array(data, "stage_instances")
                .iter()
                .map(|s| StageInstance::from_payload(id, s).map(|s| (s.id, s)))
                .collect::<Result<_>>()?;
        }
        if data.get("guild_scheduled_events").is_some() {
            self.scheduled_events = array(data, "guild_scheduled_events")
                .iter()
                .map(|e| ScheduledEvent::from_payload(id, e).map(|e| (e.id, e)))
                .collect::<Result<_>>()?;
        }
        Ok(())
    }

    /// Re-read a full guild payload into this guild (guild becoming available again).
    pub(crate) fn refresh(&mut self, data: &Value) -> Result<()> {
        self.info.update(data);
        self.info.unavailable = flag(data, "unavailable");
        self.load_collections(data)
    }

    /// Apply a guild-update payload to the scalar attributes.
    pub(crate) fn update(&mut self, data: &Value) {
        self.info.update(data);
    }

    /// Guild ID.
    pub fn id(&self) -> Snowflake {
        self.info.id
    }

    /// Guild name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Whether the guild is in an outage.
    pub fn unavailable(&self) -> bool {
        self.info.unavailable
    }

    /// Whether every member the platform reports has been cached.
    pub fn is_chunked(&self) -> bool {
        self.info
            .member_count
            .is_some_and(|count| self.members.len() as u64 >= count)
    }

    /// A non-thread channel.
    pub fn get_channel(&self, id: Snowflake) -> Option<&GuildChannel> {
        self.channels.get(&id)
    }

    /// Every non-thread channel.
    pub fn channels(&self) -> impl Iterator<Item = &GuildChannel> {
        self.channels.values()
    }

    /// A cached thread.
    pub fn get_thread(&self, id: Snowflake) -> Option<&Thread> {
        self.threads.get(&id)
    }

    /// Every cached thread.
    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    /// Channel or thread by ID.
    pub fn resolve_channel(&self, id: Snowflake) -> Option<Channel> {
        self.channels
            .get(&id)
            .cloned()
            .map(Channel::Guild)
            .or_else(|| self.threads.get(&id).cloned().map(Channel::Thread))
    }

    /// A role.
    pub fn get_role(&self, id: Snowflake) -> Option<&Role> {
        self.roles.get(&id)
    }

    /// Every role.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// A cached member.
    pub fn get_member(&self, id: Snowflake) -> Option<&Member> {
        self.members.get(&id)
    }

    /// Every cached member.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Custom emojis owned by the guild.
    pub fn emojis(&self) -> &[Arc<Emoji>] {
        &self.emojis
    }

    /// Stickers owned by the guild.
    pub fn stickers(&self) -> &[Arc<GuildSticker>] {
        &self.stickers
    }

    /// IDs of the guild's soundboard sounds; the sounds live in the entity cache.
    pub fn soundboard_sound_ids(&self) -> &[Snowflake] {
        &self.soundboard_sounds
    }

    /// A live stage instance.
    pub fn get_stage_instance(&self, id: Snowflake) -> Option<&StageInstance> {
        self.stage_instances.get(&id)
    }

    /// A scheduled event.
    pub fn get_scheduled_event(&self, id: Snowflake) -> Option<&ScheduledEvent> {
        self.scheduled_events.get(&id)
    }

    pub(crate) fn add_member(&mut self, member: Member) {
        self.members.insert(member.id(), member);
    }

    pub(crate) fn remove_member(&mut self, id: Snowflake) -> Option<Member> {
        self.members.remove(&id)
    }

    pub(crate) fn adjust_member_count(&mut self, delta: i64) {
        if let Some(count) = self.info.member_count.as_mut() {
            *count = count.saturating_add_signed(delta);
        }
    }

    pub(crate) fn add_role(&mut self, role: Role) {
        self.roles.insert(role.id, role);
    }

    pub(crate) fn remove_role(&mut self, id: Snowflake) -> Option<Role> {
        self.roles.remove(&id)
    }

    /// Remove threads whose parent is in `channel_ids`, returning them.
    pub(crate) fn filter_threads(
        &mut self,
        channel_ids: &HashSet<Snowflake>,
    ) -> HashMap<Snowflake, Thread> {
        let ids: Vec<Snowflake> = self
            .threads
            .values()
            .filter(|t| t.parent_id.is_some_and(|p| channel_ids.contains(&p)))
            .map(|t| t.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.threads.remove(&id).map(|t| (id, t)))
            .collect()
    }

    pub(crate) fn clear_threads(&mut self) -> HashMap<Snowflake, Thread> {
        std::mem::take(&mut self.threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "id": "1",
            "name": "guild",
            "member_count": 2,
            "roles": [{"id": "1", "name": "@everyone", "permissions": "1024"}],
            "channels": [
                {"id": "10", "type": 0, "name": "general"},
                {"id": "11", "type": 99, "name": "mystery"}
            ],
            "members": [{"user": {"id": "5", "username": "a"}, "joined_at": "2024-01-01"}],
            "presences": [{"user": {"id": "5"}, "status": "online"}]
        })
    }

    #[test]
    fn test_from_payload() {
        let guild = Guild::from_payload(&payload()).unwrap();
        assert_eq!(guild.id(), 1);
        assert_eq!(guild.get_role(1).unwrap().permissions, 1024);
        assert!(guild.get_channel(10).is_some());
        assert!(guild.get_channel(11).is_none());
        assert_eq!(guild.get_member(5).unwrap().status.as_deref(), Some("online"));
        assert!(!guild.is_chunked());
    }

    #[test]
    fn test_info_snapshot_is_independent() {
        let mut guild = Guild::from_payload(&payload()).unwrap();
        let before = guild.info.clone();
        guild.update(&json!({"name": "renamed"}));
        assert_eq!(before.name, "guild");
        assert_eq!(guild.name(), "renamed");
    }
}
