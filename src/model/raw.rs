//! Raw event payloads.
//!
//! Raw events fire whether or not the referenced entity is cached. When it is,
//! the cached copy rides along so consumers need not look it up again.

use super::{
    opt_snowflake, snowflake, snowflakes, Member, Message, PartialEmoji, Snowflake, Thread, User,
};
use crate::error::Result;
use serde_json::Value;

/// `MESSAGE_DELETE`
#[derive(Debug, Clone)]
pub struct RawMessageDeleteEvent {
    /// Deleted message
    pub message_id: Snowflake,
    /// Channel the message was in
    pub channel_id: Snowflake,
    /// Guild of the channel, if any
    pub guild_id: Option<Snowflake>,
    /// The message as it was cached, if it was
    pub cached_message: Option<Message>,
}

impl RawMessageDeleteEvent {
    /// Read the required IDs from the payload.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(Self {
            message_id: snowflake(data, "id")?,
            channel_id: snowflake(data, "channel_id")?,
            guild_id: opt_snowflake(data, "guild_id"),
            cached_message: None,
        })
    }
}

/// `MESSAGE_DELETE_BULK`
#[derive(Debug, Clone)]
pub struct RawBulkMessageDeleteEvent {
    /// Every deleted message
    pub message_ids: Vec<Snowflake>,
    /// Channel the messages were in
    pub channel_id: Snowflake,
    /// Guild of the channel, if any
    pub guild_id: Option<Snowflake>,
    /// The subset of deleted messages that was cached
    pub cached_messages: Vec<Message>,
}

impl RawBulkMessageDeleteEvent {
    /// Read the IDs from the payload.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(Self {
            message_ids: snowflakes(data, "ids"),
            channel_id: snowflake(data, "channel_id")?,
            guild_id: opt_snowflake(data, "guild_id"),
            cached_messages: Vec::new(),
        })
    }
}

/// `MESSAGE_UPDATE`
#[derive(Debug, Clone)]
pub struct RawMessageUpdateEvent {
    /// Edited message
    pub message_id: Snowflake,
    /// Channel the message is in
    pub channel_id: Snowflake,
    /// Guild of the channel, if any
    pub guild_id: Option<Snowflake>,
    /// The update payload as received
    pub data: Value,
    /// The cached message before the update was applied
    pub cached_message: Option<Message>,
}

impl RawMessageUpdateEvent {
    /// Keep the whole payload alongside the IDs.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(Self {
            message_id: snowflake(data, "id")?,
            channel_id: snowflake(data, "channel_id")?,
            guild_id: opt_snowflake(data, "guild_id"),
            data: data.clone(),
            cached_message: None,
        })
    }
}

/// Whether a reaction was added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionAction {
    /// `MESSAGE_REACTION_ADD`
    Add,
    /// `MESSAGE_REACTION_REMOVE`
    Remove,
}

/// `MESSAGE_REACTION_ADD` and `MESSAGE_REACTION_REMOVE`
#[derive(Debug, Clone)]
pub struct RawReactionActionEvent {
    /// Reacted-to message
    pub message_id: Snowflake,
    /// Channel of the message
    pub channel_id: Snowflake,
    /// Guild of the channel, if any
    pub guild_id: Option<Snowflake>,
    /// Reacting user
    pub user_id: Snowflake,
    /// Emoji added or removed
    pub emoji: PartialEmoji,
    /// Add or remove
    pub action: ReactionAction,
    /// Super reaction
    pub burst: bool,
    /// The reacting member, for guild reaction-add events
    pub member: Option<Member>,
}

impl RawReactionActionEvent {
    /// Fails with `MissingField("emoji")` when the emoji object is absent.
    pub fn from_payload(data: &Value, action: ReactionAction) -> Result<Self> {
        let emoji = data
            .get("emoji")
            .map(PartialEmoji::from_payload)
            .ok_or(crate::error::StateError::MissingField("emoji"))?;
        Ok(Self {
            message_id: snowflake(data, "message_id")?,
            channel_id: snowflake(data, "channel_id")?,
            guild_id: opt_snowflake(data, "guild_id"),
            user_id: snowflake(data, "user_id")?,
            emoji,
            action,
            burst: super::flag(data, "burst"),
            member: None,
        })
    }
}

/// `MESSAGE_REACTION_REMOVE_ALL`
#[derive(Debug, Clone)]
pub struct RawReactionClearEvent {
    /// Cleared message
    pub message_id: Snowflake,
    /// Channel of the message
    pub channel_id: Snowflake,
    /// Guild of the channel, if any
    pub guild_id: Option<Snowflake>,
}

impl RawReactionClearEvent {
    /// Read the IDs from the payload.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(Self {
            message_id: snowflake(data, "message_id")?,
            channel_id: snowflake(data, "channel_id")?,
            guild_id: opt_snowflake(data, "guild_id"),
        })
    }
}

/// `MESSAGE_REACTION_REMOVE_EMOJI`
#[derive(Debug, Clone)]
pub struct RawReactionClearEmojiEvent {
    /// Cleared message
    pub message_id: Snowflake,
    /// Channel of the message
    pub channel_id: Snowflake,
    /// Guild of the channel, if any
    pub guild_id: Option<Snowflake>,
    /// Emoji whose reactions were removed
    pub emoji: PartialEmoji,
}

impl RawReactionClearEmojiEvent {
    /// Fails with `MissingField("emoji")` when the emoji object is absent.
    pub fn from_payload(data: &Value) -> Result<Self> {
        let emoji = data
            .get("emoji")
            .map(PartialEmoji::from_payload)
            .ok_or(crate::error::StateError::MissingField("emoji"))?;
        Ok(Self {
            message_id: snowflake(data, "message_id")?,
            channel_id: snowflake(data, "channel_id")?,
            guild_id: opt_snowflake(data, "guild_id"),
            emoji,
        })
    }
}

/// `TYPING_START`
#[derive(Debug, Clone)]
pub struct RawTypingEvent {
    /// Channel being typed in
    pub channel_id: Snowflake,
    /// Typing user
    pub user_id: Snowflake,
    /// Guild of the channel, if any
    pub guild_id: Option<Snowflake>,
    /// Unix seconds
    pub timestamp: u64,
    /// Typing member, for cached guilds
    pub member: Option<Member>,
}

impl RawTypingEvent {
    /// Read the IDs from the payload; a missing timestamp reads as zero.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(Self {
            channel_id: snowflake(data, "channel_id")?,
            user_id: snowflake(data, "user_id")?,
            guild_id: opt_snowflake(data, "guild_id"),
            timestamp: super::opt_u64(data, "timestamp").unwrap_or(0),
            member: None,
        })
    }
}

/// `GUILD_MEMBER_REMOVE`
#[derive(Debug, Clone)]
pub struct RawMemberRemoveEvent {
    /// Guild the member left
    pub guild_id: Snowflake,
    /// The departed user
    pub user: User,
}

impl RawMemberRemoveEvent {
    /// Build the user from the embedded object.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(Self {
            guild_id: snowflake(data, "guild_id")?,
            user: User::from_payload(super::object(data, "user")?)?,
        })
    }
}

/// `THREAD_DELETE`
#[derive(Debug, Clone)]
pub struct RawThreadDeleteEvent {
    /// Deleted thread
    pub thread_id: Snowflake,
    /// Guild of the thread
    pub guild_id: Snowflake,
    /// Parent channel
    pub parent_id: Option<Snowflake>,
    /// The thread as it was cached, if it was
    pub thread: Option<Thread>,
}

impl RawThreadDeleteEvent {
    /// Read the IDs from the payload.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(Self {
            thread_id: snowflake(data, "id")?,
            guild_id: snowflake(data, "guild_id")?,
            parent_id: opt_snowflake(data, "parent_id"),
            thread: None,
        })
    }
}

/// `INTEGRATION_DELETE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIntegrationDeleteEvent {
    /// Removed integration
    pub integration_id: Snowflake,
    /// Guild it was removed from
    pub guild_id: Snowflake,
    /// Bot application of the integration, if any
    pub application_id: Option<Snowflake>,
}

impl RawIntegrationDeleteEvent {
    /// Read the IDs from the payload.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(Self {
            integration_id: snowflake(data, "id")?,
            guild_id: snowflake(data, "guild_id")?,
            application_id: opt_snowflake(data, "application_id"),
        })
    }
}
