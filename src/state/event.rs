//! Application-visible notifications.
//!
//! Every parser emits zero or more [`Event`]s after it has finished mutating
//! the cache. Events are delivered in emission order through an
//! [`EventStream`].
//!
//! # Examples
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let (state, mut events) = ConnectionState::new(config, gateway, http)?;
//! while let Some(event) = events.next().await {
//!     if let Event::GuildChannelCreate(channel) = &event {
//!         println!("new channel {}", channel.name);
//!     }
//! }
//! ```

use crate::model::raw::{
    RawBulkMessageDeleteEvent, RawIntegrationDeleteEvent, RawMemberRemoveEvent, RawMessageDeleteEvent,
    RawMessageUpdateEvent, RawReactionActionEvent, RawReactionClearEmojiEvent,
    RawReactionClearEvent, RawThreadDeleteEvent, RawTypingEvent,
};
use crate::model::{
    Channel, Emoji, GroupChannel, Guild, GuildChannel, GuildInfo, GuildSticker, Member, Message,
    PrivateChannel, Reaction, Role, ScheduledEvent, Shared, Snowflake, SoundboardSound,
    StageInstance, Thread, ThreadMember, User,
};
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// The user behind a notification, as a guild member when one is known.
#[derive(Debug, Clone, PartialEq)]
pub enum Actor {
    /// Resolved through the guild's member list
    Member(Member),
    /// Resolved through a private channel or the user cache
    User(User),
}

impl Actor {
    /// The underlying user.
    pub fn user(&self) -> &User {
        match self {
            Actor::Member(member) => &member.user,
            Actor::User(user) => user,
        }
    }

    /// ID of the underlying user.
    pub fn id(&self) -> Snowflake {
        self.user().id
    }
}

/// A notification derived from one or more gateway events.
#[derive(Debug, Clone)]
pub enum Event {
    /// A session started; the cache was reset
    Connect,
    /// The gateway resumed the previous session
    Resumed,
    /// Startup finished; every initial guild has been announced
    Ready,

    /// A message was received and cached
    Message {
        /// The cached message
        message: Shared<Message>,
        /// Where it was sent
        channel: Channel,
    },
    /// A message was deleted
    RawMessageDelete(RawMessageDeleteEvent),
    /// A cached message was deleted
    MessageDelete(Message),
    /// Messages were deleted in bulk
    RawBulkMessageDelete(RawBulkMessageDeleteEvent),
    /// Cached messages were deleted in bulk
    BulkMessageDelete(Vec<Message>),
    /// A message was edited
    RawMessageEdit(RawMessageUpdateEvent),
    /// A cached message was edited
    MessageEdit {
        /// Snapshot before the edit
        before: Message,
        /// The cached message, edited
        after: Shared<Message>,
    },

    /// A reaction was added
    RawReactionAdd(RawReactionActionEvent),
    /// A reaction was added to a cached message
    ReactionAdd {
        /// The reaction after the add
        reaction: Reaction,
        /// Reacted-to message
        message_id: Snowflake,
        /// Reacting user
        user_id: Snowflake,
    },
    /// A reaction was removed
    RawReactionRemove(RawReactionActionEvent),
    /// A reaction was removed from a cached message
    ReactionRemove {
        /// The reaction after the removal
        reaction: Reaction,
        /// Reacted-to message
        message_id: Snowflake,
        /// User whose reaction was removed
        user_id: Snowflake,
    },
    /// Every reaction was removed from a message
    RawReactionClear(RawReactionClearEvent),
    /// Reactions removed from a cached message, with the message as it was before
    ReactionClear {
        /// Snapshot before the clear
        message: Message,
        /// The removed reactions
        reactions: Vec<Reaction>,
    },
    /// Every reaction of one emoji was removed from a message
    RawReactionClearEmoji(RawReactionClearEmojiEvent),
    /// Every reaction of one emoji was removed from a cached message
    ReactionClearEmoji {
        /// The removed reaction
        reaction: Reaction,
        /// Cleared message
        message_id: Snowflake,
    },

    /// Interaction payload, passed through untouched
    Interaction(Value),
    /// A cached member's presence changed
    PresenceUpdate {
        /// Snapshot before the change
        before: Member,
        /// The member after the change
        after: Member,
    },
    /// The client's own user changed
    UserUpdate {
        /// Snapshot before the change
        before: User,
        /// The user after the change
        after: User,
    },
    /// Invite payload, passed through untouched
    InviteCreate(Value),
    /// Invite payload, passed through untouched
    InviteDelete(Value),

    /// A channel was created in a cached guild
    GuildChannelCreate(GuildChannel),
    /// A cached guild channel changed
    GuildChannelUpdate {
        /// Snapshot before the change
        before: GuildChannel,
        /// The channel after the change
        after: GuildChannel,
    },
    /// A cached guild channel was deleted
    GuildChannelDelete(GuildChannel),
    /// A cached group channel changed
    PrivateChannelUpdate {
        /// Snapshot before the change
        before: GroupChannel,
        /// The channel after the change
        after: GroupChannel,
    },
    /// Pins changed in a guild channel or thread
    GuildChannelPinsUpdate {
        /// The channel
        channel: Channel,
        /// Timestamp of the newest pin, if any remain
        last_pin: Option<String>,
    },
    /// Pins changed in a private channel
    PrivateChannelPinsUpdate {
        /// The channel
        channel: PrivateChannel,
        /// Timestamp of the newest pin, if any remain
        last_pin: Option<String>,
    },

    /// A thread was created
    ThreadCreate(Thread),
    /// The client gained access to a thread
    ThreadJoin(Thread),
    /// A cached thread changed
    ThreadUpdate {
        /// Snapshot before the change
        before: Thread,
        /// The thread after the change
        after: Thread,
    },
    /// A thread was deleted
    RawThreadDelete(RawThreadDeleteEvent),
    /// A cached thread was deleted
    ThreadDelete(Thread),
    /// The client lost access to a thread
    ThreadRemove(Thread),
    /// A member joined a cached thread
    ThreadMemberJoin(ThreadMember),
    /// A member left a cached thread
    ThreadMemberRemove(ThreadMember),

    /// A member joined a cached guild
    MemberJoin(Member),
    /// A member left a guild
    RawMemberRemove(RawMemberRemoveEvent),
    /// A cached member left
    MemberRemove(Member),
    /// A cached member changed
    MemberUpdate {
        /// Snapshot before the change
        before: Member,
        /// The member after the change
        after: Member,
    },
    /// A user was banned from a cached guild
    MemberBan {
        /// Guild of the ban
        guild_id: Snowflake,
        /// Banned user
        user: User,
    },
    /// A user was unbanned from a cached guild
    MemberUnban {
        /// Guild of the ban
        guild_id: Snowflake,
        /// Unbanned user
        user: User,
    },

    /// A guild's custom emojis were replaced
    GuildEmojisUpdate {
        /// The guild
        guild_id: Snowflake,
        /// Emojis before the update
        before: Vec<Arc<Emoji>>,
        /// Emojis after the update
        after: Vec<Arc<Emoji>>,
    },
    /// A guild's stickers were replaced
    GuildStickersUpdate {
        /// The guild
        guild_id: Snowflake,
        /// Stickers before the update
        before: Vec<Arc<GuildSticker>>,
        /// Stickers after the update
        after: Vec<Arc<GuildSticker>>,
    },

    /// A guild the client was already in became available
    GuildAvailable(Shared<Guild>),
    /// The client joined a guild
    GuildJoin(Shared<Guild>),
    /// A cached guild went through an outage
    GuildUnavailable(Shared<Guild>),
    /// A cached guild's settings changed
    GuildUpdate {
        /// Snapshot before the change
        before: GuildInfo,
        /// The guild after the change
        after: Shared<Guild>,
    },
    /// The client left or was removed from a guild
    GuildRemove(Shared<Guild>),

    /// A role was created
    GuildRoleCreate(Role),
    /// A cached role changed
    GuildRoleUpdate {
        /// Snapshot before the change
        before: Role,
        /// The role after the change
        after: Role,
    },
    /// A cached role was deleted
    GuildRoleDelete(Role),
    /// A cached guild's integrations changed
    GuildIntegrationsUpdate(Snowflake),
    /// An integration was added to a cached guild
    IntegrationCreate {
        /// The guild
        guild_id: Snowflake,
        /// Integration payload
        integration: Value,
    },
    /// An integration of a cached guild changed
    IntegrationUpdate {
        /// The guild
        guild_id: Snowflake,
        /// Integration payload
        integration: Value,
    },
    /// An integration was removed from a cached guild
    RawIntegrationDelete(RawIntegrationDeleteEvent),
    /// A channel's webhooks changed
    WebhooksUpdate(GuildChannel),
    /// An audit log entry was written in a cached guild
    GuildAuditLogEntryCreate {
        /// The guild
        guild_id: Snowflake,
        /// Entry payload
        entry: Value,
        /// The acting user, when cached
        user: Option<User>,
    },

    /// Rule payload, passed through untouched
    AutoModerationRuleCreate(Value),
    /// Rule payload, passed through untouched
    AutoModerationRuleUpdate(Value),
    /// Rule payload, passed through untouched
    AutoModerationRuleDelete(Value),
    /// Execution payload, passed through untouched
    AutoModerationActionExecution(Value),

    /// A stage instance started
    StageInstanceCreate(StageInstance),
    /// A cached stage instance changed
    StageInstanceUpdate {
        /// Snapshot before the change
        before: StageInstance,
        /// The instance after the change
        after: StageInstance,
    },
    /// A cached stage instance ended
    StageInstanceDelete(StageInstance),

    /// A scheduled event was created
    ScheduledEventCreate(ScheduledEvent),
    /// A cached scheduled event changed
    ScheduledEventUpdate {
        /// Snapshot before the change
        before: ScheduledEvent,
        /// The event after the change
        after: ScheduledEvent,
    },
    /// A cached scheduled event was deleted
    ScheduledEventDelete(ScheduledEvent),
    /// A user subscribed to a cached scheduled event
    ScheduledEventUserAdd {
        /// The event after the change
        event: ScheduledEvent,
        /// Subscribing user
        user_id: Snowflake,
    },
    /// A user unsubscribed from a cached scheduled event
    ScheduledEventUserRemove {
        /// The event after the change
        event: ScheduledEvent,
        /// Unsubscribing user
        user_id: Snowflake,
    },

    /// A soundboard sound was added to a cached guild
    SoundboardSoundCreate(Arc<SoundboardSound>),
    /// A cached soundboard sound changed
    SoundboardSoundUpdate {
        /// Snapshot before the change
        before: Arc<SoundboardSound>,
        /// The sound after the change
        after: Arc<SoundboardSound>,
    },
    /// A cached soundboard sound was deleted
    SoundboardSoundDelete(Arc<SoundboardSound>),

    /// Someone started typing
    RawTyping(RawTypingEvent),
    /// A known user started typing
    Typing {
        /// Where they are typing
        channel: Channel,
        /// Who is typing
        user: Actor,
        /// Unix seconds
        timestamp: u64,
    },
}

impl Event {
    /// Snake-case notification name.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Connect => "connect",
            Event::Resumed => "resumed",
            Event::Ready => "ready",
            Event::Message { .. } => "message",
            Event::RawMessageDelete(_) => "raw_message_delete",
            Event::MessageDelete(_) => "message_delete",
            Event::RawBulkMessageDelete(_) => "raw_bulk_message_delete",
            Event::BulkMessageDelete(_) => "bulk_message_delete",
            Event::RawMessageEdit(_) => "raw_message_edit",
            Event::MessageEdit { .. } => "message_edit",
            Event::RawReactionAdd(_) => "raw_reaction_add",
            Event::ReactionAdd { .. } => "reaction_add",
            Event::RawReactionRemove(_) => "raw_reaction_remove",
            Event::ReactionRemove { .. } => "reaction_remove",
            Event::RawReactionClear(_) => "raw_reaction_clear",
            Event::ReactionClear { .. } => "reaction_clear",
            Event::RawReactionClearEmoji(_) => "raw_reaction_clear_emoji",
            Event::ReactionClearEmoji { .. } => "reaction_clear_emoji",
            Event::Interaction(_) => "interaction",
            Event::PresenceUpdate { .. } => "presence_update",
            Event::UserUpdate { .. } => "user_update",
            Event::InviteCreate(_) => "invite_create",
            Event::InviteDelete(_) => "invite_delete",
            Event::GuildChannelCreate(_) => "guild_channel_create",
            Event::GuildChannelUpdate { .. } => "guild_channel_update",
            Event::GuildChannelDelete(_) => "guild_channel_delete",
            Event::PrivateChannelUpdate { .. } => "private_channel_update",
            Event::GuildChannelPinsUpdate { .. } => "guild_channel_pins_update",
            Event::PrivateChannelPinsUpdate { .. } => "private_channel_pins_update",
            Event::ThreadCreate(_) => "thread_create",
            Event::ThreadJoin(_) => "thread_join",
            Event::ThreadUpdate { .. } => "thread_update",
            Event::RawThreadDelete(_) => "raw_thread_delete",
            Event::ThreadDelete(_) => "thread_delete",
            Event::ThreadRemove(_) => "thread_remove",
            Event::ThreadMemberJoin(_) => "thread_member_join",
            Event::ThreadMemberRemove(_) => "thread_member_remove",
            Event::MemberJoin(_) => "member_join",
            Event::RawMemberRemove(_) => "raw_member_remove",
            Event::MemberRemove(_) => "member_remove",
            Event::MemberUpdate { .. } => "member_update",
            Event::MemberBan { .. } => "member_ban",
            Event::MemberUnban { .. } => "member_unban",
            Event::GuildEmojisUpdate { .. } => "guild_emojis_update",
            Event::GuildStickersUpdate { .. } => "guild_stickers_update",
            Event::GuildAvailable(_) => "guild_available",
            Event::GuildJoin(_) => "guild_join",
            Event::GuildUnavailable(_) => "guild_unavailable",
            Event::GuildUpdate { .. } => "guild_update",
            Event::GuildRemove(_) => "guild_remove",
            Event::GuildRoleCreate(_) => "guild_role_create",
            Event::GuildRoleUpdate { .. } => "guild_role_update",
            Event::GuildRoleDelete(_) => "guild_role_delete",
            Event::GuildIntegrationsUpdate(_) => "guild_integrations_update",
            Event::IntegrationCreate { .. } => "integration_create",
            Event::IntegrationUpdate { .. } => "integration_update",
            Event::RawIntegrationDelete(_) => "raw_integration_delete",
            Event::WebhooksUpdate(_) => "webhooks_update",
            Event::GuildAuditLogEntryCreate { .. } => "guild_audit_log_entry_create",
            Event::AutoModerationRuleCreate(_) => "auto_moderation_rule_create",
            Event::AutoModerationRuleUpdate(_) => "auto_moderation_rule_update",
            Event::AutoModerationRuleDelete(_) => "auto_moderation_rule_delete",
            Event::AutoModerationActionExecution(_) => "auto_moderation_action_execution",
            Event::StageInstanceCreate(_) => "stage_instance_create",
            Event::StageInstanceUpdate { .. } => "stage_instance_update",
            Event::StageInstanceDelete(_) => "stage_instance_delete",
            Event::ScheduledEventCreate(_) => "guild_scheduled_event_create",
            Event::ScheduledEventUpdate { .. } => "guild_scheduled_event_update",
            Event::ScheduledEventDelete(_) => "guild_scheduled_event_delete",
            Event::ScheduledEventUserAdd { .. } => "guild_scheduled_event_user_add",
            Event::ScheduledEventUserRemove { .. } => "guild_scheduled_event_user_remove",
            Event::SoundboardSoundCreate(_) => "soundboard_sound_create",
            Event::SoundboardSoundUpdate { .. } => "soundboard_sound_update",
            Event::SoundboardSoundDelete(_) => "soundboard_sound_delete",
            Event::RawTyping(_) => "raw_typing",
            Event::Typing { .. } => "typing",
        }
    }
}

/// Receiving half of the notification channel.
///
/// Yields `None` once every [`ConnectionState`](crate::ConnectionState) clone
/// has been dropped.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { receiver }
    }

    /// Receive the next event.
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Take an already queued event without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Drain every queued event.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Convert into a `tokio-stream` wrapper for use with `StreamExt` combinators.
    pub fn into_stream(self) -> UnboundedReceiverStream<Event> {
        UnboundedReceiverStream::new(self.receiver)
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
