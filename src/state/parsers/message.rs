//! Messages, reactions and typing.

use crate::cache::EntityCache;
use crate::error::Result;
use crate::model::raw::{
    RawBulkMessageDeleteEvent, RawMessageDeleteEvent, RawMessageUpdateEvent,
    RawReactionActionEvent, RawReactionClearEmojiEvent, RawReactionClearEvent, RawTypingEvent,
    ReactionAction,
};
use crate::model::{
    Channel, ChannelType, DmChannel, Member, Message, PartialEmoji, PartialMessageable, PrivateChannel,
    ReactionEmoji, Snowflake,
};
use crate::state::{Actor, ConnectionState, Event};
use serde_json::Value;

/// The channel a message-like event happened in.
///
/// Without a guild the channel is a DM; an unknown guild channel becomes a
/// [`PartialMessageable`].
fn message_channel(cache: &mut EntityCache, channel_id: Snowflake, guild_id: Option<Snowflake>) -> Channel {
    let Some(guild_id) = guild_id else {
        let channel = cache
            .get_private_channel(channel_id)
            .unwrap_or_else(|| PrivateChannel::Dm(DmChannel::from_message(channel_id)));
        return Channel::Private(channel);
    };
    cache
        .get_guild(guild_id)
        .and_then(|guild| guild.read().resolve_channel(channel_id))
        .unwrap_or(Channel::Partial(PartialMessageable {
            id: channel_id,
            guild_id: Some(guild_id),
        }))
}

fn track_last_message(cache: &mut EntityCache, message: &Message) {
    match message.guild_id.and_then(|id| cache.get_guild(id)) {
        Some(guild) => {
            let mut guild = guild.write();
            if let Some(channel) = guild.channels.get_mut(&message.channel_id) {
                if channel.kind.tracks_last_message() {
                    channel.last_message_id = Some(message.id);
                }
            } else if let Some(thread) = guild.threads.get_mut(&message.channel_id) {
                thread.last_message_id = Some(message.id);
                thread.message_count += 1;
            }
        }
        None => {
            if let Some(PrivateChannel::Dm(dm)) = cache.private_channel_mut(message.channel_id) {
                dm.last_message_id = Some(message.id);
            }
        }
    }
}

/// Resolve a reaction emoji against the emoji cache.
fn reaction_emoji(cache: &EntityCache, emoji: PartialEmoji) -> ReactionEmoji {
    match emoji.id.and_then(|id| cache.get_emoji(id)) {
        Some(custom) => ReactionEmoji::Custom(custom),
        None => ReactionEmoji::from_partial(emoji),
    }
}

fn reacting_member(data: &Value, guild_id: Option<Snowflake>) -> Option<Member> {
    let guild_id = guild_id?;
    let member = data.get("member").filter(|m| m.is_object())?;
    Member::from_payload(guild_id, member).ok()
}

pub(super) fn parse_message_create(state: &ConnectionState, data: &Value) -> Result<()> {
    let message = Message::from_payload(data)?;
    let (handle, channel) = {
        let mut cache = state.cache_mut();
        if let Some(author) = data.get("author") {
            cache.store_user(author)?;
        }
        track_last_message(&mut cache, &message);
        let channel = message_channel(&mut cache, message.channel_id, message.guild_id);
        (cache.store_message(message), channel)
    };
    state.dispatch(Event::Message {
        message: handle,
        channel,
    });
    Ok(())
}

pub(super) fn parse_message_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    let mut raw = RawMessageDeleteEvent::from_payload(data)?;
    let found = state.cache_mut().remove_message(raw.message_id);
    let snapshot = found.map(|m| m.read().clone());
    raw.cached_message = snapshot.clone();
    state.dispatch(Event::RawMessageDelete(raw));
    if let Some(message) = snapshot {
        state.dispatch(Event::MessageDelete(message));
    }
    Ok(())
}

pub(super) fn parse_message_delete_bulk(state: &ConnectionState, data: &Value) -> Result<()> {
    let mut raw = RawBulkMessageDeleteEvent::from_payload(data)?;
    let found: Vec<Message> = {
        let mut cache = state.cache_mut();
        raw.message_ids
            .iter()
            .filter_map(|id| cache.remove_message(*id))
            .map(|m| m.read().clone())
            .collect()
    };
    raw.cached_messages = found.clone();
    state.dispatch(Event::RawBulkMessageDelete(raw));
    if !found.is_empty() {
        state.dispatch(Event::BulkMessageDelete(found));
    }
    Ok(())
}

pub(super) fn parse_message_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let mut raw = RawMessageUpdateEvent::from_payload(data)?;
    let Some(message) = state.get_message(raw.message_id) else {
        state.dispatch(Event::RawMessageEdit(raw));
        return Ok(());
    };
    let before = {
        let mut message = message.write();
        let before = message.clone();
        message.update(data);
        before
    };
    raw.cached_message = Some(before.clone());
    state.dispatch(Event::RawMessageEdit(raw));
    state.dispatch(Event::MessageEdit {
        before,
        after: message,
    });
    Ok(())
}

pub(super) fn parse_reaction_add(state: &ConnectionState, data: &Value) -> Result<()> {
    let mut raw = RawReactionActionEvent::from_payload(data, ReactionAction::Add)?;
    raw.member = reacting_member(data, raw.guild_id);
    let (emoji, me, message) = {
        let cache = state.cache();
        let me = cache.user.as_ref().is_some_and(|u| u.id == raw.user_id);
        (reaction_emoji(&cache, raw.emoji.clone()), me, cache.get_message(raw.message_id))
    };
    let (message_id, user_id) = (raw.message_id, raw.user_id);
    state.dispatch(Event::RawReactionAdd(raw));

    if let Some(message) = message {
        let reaction = message.write().add_reaction(emoji, me);
        state.dispatch(Event::ReactionAdd {
            reaction,
            message_id,
            user_id,
        });
    }
    Ok(())
}

pub(super) fn parse_reaction_remove(state: &ConnectionState, data: &Value) -> Result<()> {
    let raw = RawReactionActionEvent::from_payload(data, ReactionAction::Remove)?;
    let (emoji, me, message) = {
        let cache = state.cache();
        let me = cache.user.as_ref().is_some_and(|u| u.id == raw.user_id);
        (reaction_emoji(&cache, raw.emoji.clone()), me, cache.get_message(raw.message_id))
    };
    let (message_id, user_id) = (raw.message_id, raw.user_id);
    state.dispatch(Event::RawReactionRemove(raw));

    let removed = message.and_then(|m| m.write().remove_reaction(&emoji, me));
    if let Some(reaction) = removed {
        state.dispatch(Event::ReactionRemove {
            reaction,
            message_id,
            user_id,
        });
    }
    Ok(())
}

pub(super) fn parse_reaction_remove_all(state: &ConnectionState, data: &Value) -> Result<()> {
    let raw = RawReactionClearEvent::from_payload(data)?;
    let message = state.get_message(raw.message_id);
    state.dispatch(Event::RawReactionClear(raw));

    if let Some(message) = message {
        let before = {
            let mut message = message.write();
            let before = message.clone();
            message.reactions.clear();
            before
        };
        let reactions = before.reactions.clone();
        state.dispatch(Event::ReactionClear {
            message: before,
            reactions,
        });
    }
    Ok(())
}

pub(super) fn parse_reaction_remove_emoji(state: &ConnectionState, data: &Value) -> Result<()> {
    let raw = RawReactionClearEmojiEvent::from_payload(data)?;
    let emoji = reaction_emoji(&state.cache(), raw.emoji.clone());
    let message_id = raw.message_id;
    let message = state.get_message(message_id);
    state.dispatch(Event::RawReactionClearEmoji(raw));

    let removed = message.and_then(|m| m.write().clear_emoji(&emoji));
    if let Some(reaction) = removed {
        state.dispatch(Event::ReactionClearEmoji { reaction, message_id });
    }
    Ok(())
}

pub(super) fn parse_typing_start(state: &ConnectionState, data: &Value) -> Result<()> {
    let mut raw = RawTypingEvent::from_payload(data)?;
    if raw.guild_id.is_some_and(|id| state.get_guild(id).is_some()) {
        raw.member = reacting_member(data, raw.guild_id);
    }
    let (channel_id, guild_id, user_id, timestamp) = (raw.channel_id, raw.guild_id, raw.user_id, raw.timestamp);
    let member = raw.member.clone();
    state.dispatch(Event::RawTyping(raw));

    let (channel, user) = {
        let mut cache = state.cache_mut();
        let channel = message_channel(&mut cache, channel_id, guild_id);
        let user = member.map(Actor::Member).or_else(|| typing_user(&cache, &channel, user_id));
        (channel, user)
    };
    if let Some(user) = user {
        state.dispatch(Event::Typing {
            channel,
            user,
            timestamp,
        });
    }
    Ok(())
}

/// Resolve who is typing from what the channel knows about its participants.
fn typing_user(cache: &EntityCache, channel: &Channel, user_id: Snowflake) -> Option<Actor> {
    let cached_user = || cache.get_user(user_id).map(|user| Actor::User(user.read().clone()));
    let guild_member = |guild_id: Snowflake| {
        let guild = cache.get_guild(guild_id)?;
        let member = guild.read().get_member(user_id).cloned();
        member.map(Actor::Member)
    };
    match channel {
        Channel::Private(PrivateChannel::Dm(dm)) => dm.recipient.clone().map(Actor::User).or_else(cached_user),
        Channel::Private(PrivateChannel::Group(group)) => group
            .recipients
            .iter()
            .find(|recipient| recipient.id == user_id)
            .cloned()
            .map(Actor::User),
        Channel::Thread(thread) => guild_member(thread.guild_id),
        Channel::Guild(text) if matches!(text.kind, ChannelType::Text | ChannelType::News) => {
            guild_member(text.guild_id)
        }
        _ => cached_user(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{names, state, state_with_guild};
    use crate::model::{Channel, ReactionEmoji};
    use crate::state::{Actor, Event};
    use serde_json::{json, Value};

    fn message(id: &str, channel_id: &str) -> Value {
        json!({
            "id": id,
            "channel_id": channel_id,
            "guild_id": "1",
            "author": {"id": "5", "username": "ann"},
            "content": "hello"
        })
    }

    fn reaction(kind_user: &str, emoji: Value) -> Value {
        json!({
            "message_id": "100",
            "channel_id": "10",
            "guild_id": "1",
            "user_id": kind_user,
            "emoji": emoji
        })
    }

    #[test]
    fn test_message_create_caches_and_tracks_channel() {
        let (state, mut events) = state_with_guild();
        state.parse("MESSAGE_CREATE", &message("100", "10")).unwrap();

        match events.try_next() {
            Some(Event::Message { message, channel }) => {
                assert_eq!(message.read().content, "hello");
                assert!(matches!(channel, Channel::Guild(ref c) if c.last_message_id == Some(100)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(state.get_message(100).is_some());
        assert!(state.get_user(5).is_some());
    }

    #[test]
    fn test_message_create_unknown_channel_is_partial() {
        let (state, mut events) = state_with_guild();
        state.parse("MESSAGE_CREATE", &message("100", "77")).unwrap();
        match events.try_next() {
            Some(Event::Message { channel, .. }) => {
                assert!(channel.is_partial());
                assert_eq!(channel.id(), 77);
                assert_eq!(channel.guild_id(), Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_message_delete_emits_cached_copy_only_when_cached() {
        let (state, mut events) = state_with_guild();
        state.parse("MESSAGE_CREATE", &message("100", "10")).unwrap();
        events.drain();

        let delete = json!({"id": "100", "channel_id": "10", "guild_id": "1"});
        state.parse("MESSAGE_DELETE", &delete).unwrap();
        match events.drain().as_slice() {
            [Event::RawMessageDelete(raw), Event::MessageDelete(message)] => {
                assert_eq!(raw.cached_message.as_ref().map(|m| m.id), Some(100));
                assert_eq!(message.content, "hello");
            }
            other => panic!("unexpected {other:?}"),
        }

        state.parse("MESSAGE_DELETE", &delete).unwrap();
        assert_eq!(names(&mut events), vec!["raw_message_delete"]);
    }

    #[test]
    fn test_bulk_delete_reports_found_messages() {
        let (state, mut events) = state_with_guild();
        state.parse("MESSAGE_CREATE", &message("100", "10")).unwrap();
        state.parse("MESSAGE_CREATE", &message("101", "10")).unwrap();
        events.drain();

        state
            .parse("MESSAGE_DELETE_BULK", &json!({"ids": ["100", "999"], "channel_id": "10"}))
            .unwrap();
        match events.drain().as_slice() {
            [Event::RawBulkMessageDelete(raw), Event::BulkMessageDelete(found)] => {
                assert_eq!(raw.message_ids, vec![100, 999]);
                assert_eq!(found.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(state.get_message(101).is_some());
    }

    #[test]
    fn test_message_update_snapshots_before() {
        let (state, mut events) = state_with_guild();
        state.parse("MESSAGE_CREATE", &message("100", "10")).unwrap();
        events.drain();

        state
            .parse("MESSAGE_UPDATE", &json!({"id": "100", "channel_id": "10", "content": "edited"}))
            .unwrap();
        match events.drain().as_slice() {
            [Event::RawMessageEdit(_), Event::MessageEdit { before, after }] => {
                assert_eq!(before.content, "hello");
                assert_eq!(after.read().content, "edited");
            }
            other => panic!("unexpected {other:?}"),
        }

        state
            .parse("MESSAGE_UPDATE", &json!({"id": "404", "channel_id": "10"}))
            .unwrap();
        assert_eq!(names(&mut events), vec!["raw_message_edit"]);
    }

    #[test]
    fn test_reactions_on_cached_message() {
        let (state, mut events) = state_with_guild();
        state.parse("MESSAGE_CREATE", &message("100", "10")).unwrap();
        events.drain();

        let custom = json!({"id": "30", "name": "party"});
        state.parse("MESSAGE_REACTION_ADD", &reaction("5", custom.clone())).unwrap();
        state.parse("MESSAGE_REACTION_ADD", &reaction("6", custom.clone())).unwrap();
        assert_eq!(
            names(&mut events),
            vec!["raw_reaction_add", "reaction_add", "raw_reaction_add", "reaction_add"]
        );
        {
            let message = state.get_message(100).unwrap();
            let message = message.read();
            assert_eq!(message.reactions.len(), 1);
            assert_eq!(message.reactions[0].count, 2);
            assert!(matches!(message.reactions[0].emoji, ReactionEmoji::Custom(_)));
        }

        state.parse("MESSAGE_REACTION_REMOVE", &reaction("5", custom.clone())).unwrap();
        assert_eq!(names(&mut events), vec!["raw_reaction_remove", "reaction_remove"]);

        state
            .parse("MESSAGE_REACTION_REMOVE_EMOJI", &reaction("5", custom))
            .unwrap();
        assert_eq!(names(&mut events), vec!["raw_reaction_clear_emoji", "reaction_clear_emoji"]);
        assert!(state.get_message(100).unwrap().read().reactions.is_empty());
    }

    #[test]
    fn test_reaction_removal_without_cached_reaction_is_noop() {
        let (state, mut events) = state_with_guild();
        let unicode = json!({"name": "👍"});
        state.parse("MESSAGE_REACTION_REMOVE", &reaction("5", unicode.clone())).unwrap();
        assert_eq!(names(&mut events), vec!["raw_reaction_remove"]);

        state.parse("MESSAGE_CREATE", &message("100", "10")).unwrap();
        events.drain();
        state.parse("MESSAGE_REACTION_REMOVE", &reaction("5", unicode)).unwrap();
        assert_eq!(names(&mut events), vec!["raw_reaction_remove"]);
    }

    #[test]
    fn test_reaction_clear_reports_previous_reactions() {
        let (state, mut events) = state_with_guild();
        state.parse("MESSAGE_CREATE", &message("100", "10")).unwrap();
        state
            .parse("MESSAGE_REACTION_ADD", &reaction("5", json!({"name": "👍"})))
            .unwrap();
        events.drain();

        state
            .parse("MESSAGE_REACTION_REMOVE_ALL", &json!({"message_id": "100", "channel_id": "10"}))
            .unwrap();
        match events.drain().as_slice() {
            [Event::RawReactionClear(_), Event::ReactionClear { reactions, .. }] => {
                assert_eq!(reactions.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_typing_needs_a_known_user() {
        let (state, mut events) = state_with_guild();
        let typing = |user: &str| json!({"channel_id": "10", "guild_id": "1", "user_id": user, "timestamp": 1});
        state.parse("TYPING_START", &typing("5")).unwrap();
        assert_eq!(names(&mut events), vec!["raw_typing", "typing"]);

        state.parse("TYPING_START", &typing("6")).unwrap();
        assert_eq!(names(&mut events), vec!["raw_typing"]);
    }

    #[test]
    fn test_typing_carries_the_resolved_user() {
        let (state, mut events) = state_with_guild();
        state
            .parse("TYPING_START", &json!({"channel_id": "10", "guild_id": "1", "user_id": "5", "timestamp": 7}))
            .unwrap();
        match events.drain().as_slice() {
            [Event::RawTyping(_), Event::Typing { channel, user, timestamp }] => {
                assert_eq!(channel.id(), 10);
                assert!(matches!(user, Actor::Member(member) if member.guild_id == 1));
                assert_eq!(user.id(), 5);
                assert_eq!(*timestamp, 7);
            }
            other => panic!("unexpected {other:?}"),
        }

        // a DM resolves to its recipient whoever the payload names
        let dm = json!({"id": "60", "type": 1, "recipients": [{"id": "8", "username": "dee"}]});
        state.parse("CHANNEL_CREATE", &dm).unwrap();
        state
            .parse("TYPING_START", &json!({"channel_id": "60", "user_id": "9", "timestamp": 1}))
            .unwrap();
        match events.drain().as_slice() {
            [Event::RawTyping(_), Event::Typing { user: Actor::User(user), .. }] => assert_eq!(user.id, 8),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_typing_in_voice_channel_needs_a_cached_user() {
        let (state, mut events) = state_with_guild();
        let typing = json!({"channel_id": "11", "guild_id": "1", "user_id": "5"});
        // member 5 exists, but voice channels resolve through the user cache
        state.parse("TYPING_START", &typing).unwrap();
        assert_eq!(names(&mut events), vec!["raw_typing"]);

        state.parse("MESSAGE_CREATE", &message("100", "10")).unwrap();
        events.drain();
        state.parse("TYPING_START", &typing).unwrap();
        match events.drain().as_slice() {
            [Event::RawTyping(_), Event::Typing { user: Actor::User(user), .. }] => assert_eq!(user.id, 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dm_message_without_cache() {
        let (state, mut events) = state();
        let dm = json!({"id": "1", "channel_id": "50", "author": {"id": "5", "username": "ann"}});
        state.parse("MESSAGE_CREATE", &dm).unwrap();
        match events.try_next() {
            Some(Event::Message { channel, .. }) => {
                assert!(matches!(channel, Channel::Private(_)));
                assert_eq!(channel.id(), 50);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
