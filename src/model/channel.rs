//! Channel variants as a closed sum type.
//!
//! The wire `type` code picks the variant through [`channel_factory`]; there
//! is no open hierarchy to extend at runtime.

use super::{flag, opt_snowflake, opt_string, opt_u64, snowflake, Snowflake, User};
use crate::error::{Result, StateError};
use serde_json::Value;
use std::collections::HashMap;

/// Wire channel type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelType {
    /// Guild text channel
    Text = 0,
    /// Direct message
    Private = 1,
    /// Guild voice channel
    Voice = 2,
    /// Group direct message
    Group = 3,
    /// Channel category
    Category = 4,
    /// Announcement channel
    News = 5,
    /// Thread in an announcement channel
    NewsThread = 10,
    /// Public thread
    PublicThread = 11,
    /// Invite-only thread
    PrivateThread = 12,
    /// Stage channel
    StageVoice = 13,
    /// Hub directory
    Directory = 14,
    /// Forum of threads
    Forum = 15,
    /// Media forum
    Media = 16,
}

impl ChannelType {
    /// Parse a wire type code.
    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0 => ChannelType::Text,
            1 => ChannelType::Private,
            2 => ChannelType::Voice,
            3 => ChannelType::Group,
            4 => ChannelType::Category,
            5 => ChannelType::News,
            10 => ChannelType::NewsThread,
            11 => ChannelType::PublicThread,
            12 => ChannelType::PrivateThread,
            13 => ChannelType::StageVoice,
            14 => ChannelType::Directory,
            15 => ChannelType::Forum,
            16 => ChannelType::Media,
            _ => return None,
        })
    }

    /// Whether the type is one of the thread types.
    pub fn is_thread(self) -> bool {
        matches!(
            self,
            ChannelType::NewsThread | ChannelType::PublicThread | ChannelType::PrivateThread
        )
    }

    /// Channels whose `last_message_id` tracks new messages.
    pub fn tracks_last_message(self) -> bool {
        matches!(
            self,
            ChannelType::Text | ChannelType::News | ChannelType::Forum | ChannelType::Voice
        ) || self.is_thread()
    }
}

/// Which variant a wire type code constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// [`GuildChannel`]
    Guild,
    /// [`Thread`]
    Thread,
    /// [`DmChannel`]
    Dm,
    /// [`GroupChannel`]
    Group,
}

/// Map a wire type code to the variant that represents it.
///
/// Returns `None` for codes this crate does not know, which callers treat
/// as "discard the event".
pub fn channel_factory(code: u64) -> Option<(ChannelKind, ChannelType)> {
    let kind = ChannelType::from_code(code)?;
    let variant = match kind {
        ChannelType::Private => ChannelKind::Dm,
        ChannelType::Group => ChannelKind::Group,
        t if t.is_thread() => ChannelKind::Thread,
        _ => ChannelKind::Guild,
    };
    Some((variant, kind))
}

fn channel_type(data: &Value) -> Result<ChannelType> {
    data.get("type")
        .and_then(Value::as_u64)
        .and_then(ChannelType::from_code)
        .ok_or(StateError::MissingField("type"))
}

/// A non-thread channel owned by a guild.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildChannel {
    /// Channel ID
    pub id: Snowflake,
    /// Owning guild
    pub guild_id: Snowflake,
    /// Wire type
    pub kind: ChannelType,
    /// Display name
    pub name: String,
    /// Sort position
    pub position: i64,
    /// Channel topic
    pub topic: Option<String>,
    /// Age-restricted
    pub nsfw: bool,
    /// Category
    pub parent_id: Option<Snowflake>,
    /// Newest message seen
    pub last_message_id: Option<Snowflake>,
}

impl GuildChannel {
    /// Build from a channel payload of `guild_id`.
    pub fn from_payload(guild_id: Snowflake, data: &Value) -> Result<Self> {
        Ok(GuildChannel {
            id: snowflake(data, "id")?,
            guild_id,
            kind: channel_type(data)?,
            name: opt_string(data, "name").unwrap_or_default(),
            position: data.get("position").and_then(Value::as_i64).unwrap_or(0),
            topic: opt_string(data, "topic"),
            nsfw: flag(data, "nsfw"),
            parent_id: opt_snowflake(data, "parent_id"),
            last_message_id: opt_snowflake(data, "last_message_id"),
        })
    }

    pub(crate) fn update(&mut self, data: &Value) {
        if let Ok(kind) = channel_type(data) {
            self.kind = kind;
        }
        if let Some(name) = opt_string(data, "name") {
            self.name = name;
        }
        if let Some(position) = data.get("position").and_then(Value::as_i64) {
            self.position = position;
        }
        self.topic = opt_string(data, "topic");
        self.nsfw = flag(data, "nsfw");
        self.parent_id = opt_snowflake(data, "parent_id");
        if let Some(last) = opt_snowflake(data, "last_message_id") {
            self.last_message_id = Some(last);
        }
    }
}

/// A member of a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMember {
    /// User ID
    pub id: Snowflake,
    /// Thread joined
    pub thread_id: Snowflake,
    /// Join timestamp
    pub joined_at: Option<String>,
    /// Notification flags
    pub flags: u64,
}

impl ThreadMember {
    /// Build from a thread member payload; the thread ID defaults to `thread_id`.
    pub fn from_payload(thread_id: Snowflake, data: &Value) -> Result<Self> {
        let id = opt_snowflake(data, "user_id")
            .or_else(|| data.get("member").and_then(|m| opt_snowflake(m, "user_id")))
            .ok_or(StateError::MissingField("user_id"))?;
        Ok(ThreadMember {
            id,
            thread_id: opt_snowflake(data, "id").unwrap_or(thread_id),
            joined_at: opt_string(data, "join_timestamp"),
            flags: opt_u64(data, "flags").unwrap_or(0),
        })
    }
}

/// A thread inside a guild channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    /// Thread ID
    pub id: Snowflake,
    /// Owning guild
    pub guild_id: Snowflake,
    /// Channel the thread was started in
    pub parent_id: Option<Snowflake>,
    /// Thread starter
    pub owner_id: Option<Snowflake>,
    /// One of the thread types
    pub kind: ChannelType,
    /// Thread name
    pub name: String,
    /// Archived threads leave the cache
    pub archived: bool,
    /// Only moderators may unarchive
    pub locked: bool,
    /// Approximate message count
    pub message_count: u64,
    /// Newest message seen
    pub last_message_id: Option<Snowflake>,
    /// The client's own membership
    pub me: Option<ThreadMember>,
    /// Known members by user ID
    pub members: HashMap<Snowflake, ThreadMember>,
}

impl Thread {
    /// Build from a thread payload of `guild_id`.
    pub fn from_payload(guild_id: Snowflake, data: &Value) -> Result<Self> {
        let id = snowflake(data, "id")?;
        let metadata = data.get("thread_metadata").cloned().unwrap_or(Value::Null);
        let me = match data.get("member") {
            Some(m) if m.is_object() => ThreadMember::from_payload(id, m).ok(),
            _ => None,
        };
        Ok(Thread {
            id,
            guild_id,
            parent_id: opt_snowflake(data, "parent_id"),
            owner_id: opt_snowflake(data, "owner_id"),
            kind: channel_type(data)?,
            name: opt_string(data, "name").unwrap_or_default(),
            archived: flag(&metadata, "archived"),
            locked: flag(&metadata, "locked"),
            message_count: opt_u64(data, "message_count").unwrap_or(0),
            last_message_id: opt_snowflake(data, "last_message_id"),
            me,
            members: HashMap::new(),
        })
    }

    pub(crate) fn update(&mut self, data: &Value) {
        if let Some(name) = opt_string(data, "name") {
            self.name = name;
        }
        if let Some(metadata) = data.get("thread_metadata") {
            self.archived = flag(metadata, "archived");
            self.locked = flag(metadata, "locked");
        }
        if let Some(count) = opt_u64(data, "message_count") {
            self.message_count = count;
        }
        if let Some(last) = opt_snowflake(data, "last_message_id") {
            self.last_message_id = Some(last);
        }
    }

    pub(crate) fn add_member(&mut self, member: ThreadMember) {
        self.members.insert(member.id, member);
    }

    pub(crate) fn pop_member(&mut self, user_id: Snowflake) -> Option<ThreadMember> {
        self.members.remove(&user_id)
    }
}

/// One-to-one direct message channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DmChannel {
    /// Channel ID
    pub id: Snowflake,
    /// The other user, when known
    pub recipient: Option<User>,
    /// Newest message seen
    pub last_message_id: Option<Snowflake>,
}

impl DmChannel {
    /// Build from a channel payload; the first recipient becomes the recipient.
    pub fn from_payload(data: &Value) -> Result<Self> {
        let recipient = match super::array(data, "recipients").first() {
            Some(user) => Some(User::from_payload(user)?),
            None => None,
        };
        Ok(DmChannel {
            id: snowflake(data, "id")?,
            recipient,
            last_message_id: opt_snowflake(data, "last_message_id"),
        })
    }

    /// A DM channel known only from a message referencing it.
    pub fn from_message(channel_id: Snowflake) -> Self {
        DmChannel {
            id: channel_id,
            recipient: None,
            last_message_id: None,
        }
    }
}

/// Multi-user group channel.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupChannel {
    /// Channel ID
    pub id: Snowflake,
    /// Group name
    pub name: Option<String>,
    /// Group owner
    pub owner_id: Option<Snowflake>,
    /// Icon hash
    pub icon: Option<String>,
    /// Every other member of the group
    pub recipients: Vec<User>,
}

impl GroupChannel {
    /// Build from a channel payload.
    pub fn from_payload(data: &Value) -> Result<Self> {
        let recipients = super::array(data, "recipients")
            .iter()
            .map(User::from_payload)
            .collect::<Result<Vec<_>>>()?;
        Ok(GroupChannel {
            id: snowflake(data, "id")?,
            name: opt_string(data, "name"),
            owner_id: opt_snowflake(data, "owner_id"),
            icon: opt_string(data, "icon"),
            recipients,
        })
    }

    pub(crate) fn update(&mut self, data: &Value) -> Result<()> {
        let updated = GroupChannel::from_payload(data)?;
        *self = updated;
        Ok(())
    }
}

/// DM or group channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PrivateChannel {
    /// One-to-one
    Dm(DmChannel),
    /// Multi-user
    Group(GroupChannel),
}

impl PrivateChannel {
    /// Channel ID.
    pub fn id(&self) -> Snowflake {
        match self {
            PrivateChannel::Dm(dm) => dm.id,
            PrivateChannel::Group(group) => group.id,
        }
    }

    /// The recipient of a DM; groups have none.
    pub fn recipient(&self) -> Option<&User> {
        match self {
            PrivateChannel::Dm(dm) => dm.recipient.as_ref(),
            PrivateChannel::Group(_) => None,
        }
    }
}

/// A channel known only by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialMessageable {
    /// Channel ID
    pub id: Snowflake,
    /// Guild, if the event named one
    pub guild_id: Option<Snowflake>,
}

/// Any channel an event can reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Channel {
    /// Non-thread guild channel
    Guild(GuildChannel),
    /// Guild thread
    Thread(Thread),
    /// DM or group
    Private(PrivateChannel),
    /// Not cached
    Partial(PartialMessageable),
}

impl Channel {
    /// Channel ID.
    pub fn id(&self) -> Snowflake {
        match self {
            Channel::Guild(c) => c.id,
            Channel::Thread(t) => t.id,
            Channel::Private(p) => p.id(),
            Channel::Partial(p) => p.id,
        }
    }

    /// Owning guild, if known.
    pub fn guild_id(&self) -> Option<Snowflake> {
        match self {
            Channel::Guild(c) => Some(c.guild_id),
            Channel::Thread(t) => Some(t.guild_id),
            Channel::Private(_) => None,
            Channel::Partial(p) => p.guild_id,
        }
    }

    /// Wire type; unknown for partial channels.
    pub fn kind(&self) -> Option<ChannelType> {
        match self {
            Channel::Guild(c) => Some(c.kind),
            Channel::Thread(t) => Some(t.kind),
            Channel::Private(PrivateChannel::Dm(_)) => Some(ChannelType::Private),
            Channel::Private(PrivateChannel::Group(_)) => Some(ChannelType::Group),
            Channel::Partial(_) => None,
        }
    }

    /// Whether the channel was not resolved from the cache.
    pub fn is_partial(&self) -> bool {
        matches!(self, Channel::Partial(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_factory_maps_codes_to_variants() {
        assert_eq!(channel_factory(0), Some((ChannelKind::Guild, ChannelType::Text)));
        assert_eq!(channel_factory(1), Some((ChannelKind::Dm, ChannelType::Private)));
        assert_eq!(channel_factory(3), Some((ChannelKind::Group, ChannelType::Group)));
        assert_eq!(
            channel_factory(11),
            Some((ChannelKind::Thread, ChannelType::PublicThread))
        );
        assert_eq!(channel_factory(99), None);
    }

    #[test]
    fn test_guild_channel_update_snapshot_independent() {
        let mut channel =
            GuildChannel::from_payload(1, &json!({"id": "10", "type": 0, "name": "general"}))
                .unwrap();
        let before = channel.clone();
        channel.update(&json!({"name": "chat", "type": 0}));
        assert_eq!(before.name, "general");
        assert_eq!(channel.name, "chat");
    }

    #[test]
    fn test_dm_recipient() {
        let dm = DmChannel::from_payload(
            &json!({"id": "7", "type": 1, "recipients": [{"id": "3", "username": "a"}]}),
        )
        .unwrap();
        assert_eq!(dm.recipient.map(|u| u.id), Some(3));
    }
}
