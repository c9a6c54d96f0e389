//! Channel and thread lifecycle.

use crate::error::Result;
use crate::model::raw::RawThreadDeleteEvent;
use crate::model::{
    array, as_snowflake, channel_factory, flag, opt_snowflake, opt_string, opt_u64, snowflake,
    ChannelKind, ChannelType, DmChannel, GroupChannel, GuildChannel, PrivateChannel, Thread,
    ThreadMember,
};
use crate::state::{ConnectionState, Event};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub(super) fn parse_channel_create(state: &ConnectionState, data: &Value) -> Result<()> {
    let code = opt_u64(data, "type").unwrap_or(u64::MAX);
    let Some((kind, _)) = channel_factory(code) else {
        tracing::debug!("CHANNEL_CREATE referencing an unknown channel type {}. Discarding.", code);
        return Ok(());
    };
    match kind {
        ChannelKind::Dm => {
            let dm = DmChannel::from_payload(data)?;
            state.cache_mut().add_private_channel(PrivateChannel::Dm(dm));
        }
        ChannelKind::Group => {
            let group = GroupChannel::from_payload(data)?;
            state.cache_mut().add_private_channel(PrivateChannel::Group(group));
        }
        ChannelKind::Thread => {
            tracing::debug!("CHANNEL_CREATE carrying a thread; threads arrive through THREAD_CREATE. Discarding.");
        }
        ChannelKind::Guild => {
            let Some(guild) = state.known_guild(data, "CHANNEL_CREATE") else {
                return Ok(());
            };
            let channel = {
                let mut cache = state.cache_mut();
                let mut guild = guild.write();
                let channel = GuildChannel::from_payload(guild.id(), data)?;
                cache.index_channel(channel.id, guild.id());
                guild.channels.insert(channel.id, channel.clone());
                channel
            };
            state.dispatch(Event::GuildChannelCreate(channel));
        }
    }
    Ok(())
}

pub(super) fn parse_channel_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let channel_id = snowflake(data, "id")?;
    if opt_u64(data, "type") == Some(ChannelType::Group as u64) {
        let updated = {
            let mut cache = state.cache_mut();
            match cache.private_channel_mut(channel_id) {
                Some(PrivateChannel::Group(group)) => {
                    let before = group.clone();
                    group.update(data)?;
                    Some((before, group.clone()))
                }
                _ => None,
            }
        };
        match updated {
            Some((before, after)) => state.dispatch(Event::PrivateChannelUpdate { before, after }),
            None => tracing::debug!("CHANNEL_UPDATE referencing an unknown group ID: {}. Discarding.", channel_id),
        }
        return Ok(());
    }

    let Some(guild) = state.known_guild(data, "CHANNEL_UPDATE") else {
        return Ok(());
    };
    let updated = {
        let mut guild = guild.write();
        guild.channels.get_mut(&channel_id).map(|channel| {
            let before = channel.clone();
            channel.update(data);
            (before, channel.clone())
        })
    };
    match updated {
        Some((before, after)) => state.dispatch(Event::GuildChannelUpdate { before, after }),
        None => tracing::debug!("CHANNEL_UPDATE referencing an unknown channel ID: {}. Discarding.", channel_id),
    }
    Ok(())
}

pub(super) fn parse_channel_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    let channel_id = snowflake(data, "id")?;
    if opt_snowflake(data, "guild_id").is_none() {
        state.cache_mut().remove_private_channel(channel_id);
        return Ok(());
    }
    let Some(guild) = state.known_guild(data, "CHANNEL_DELETE") else {
        return Ok(());
    };
    let removed = {
        let mut cache = state.cache_mut();
        let removed = guild.write().channels.remove(&channel_id);
        if removed.is_some() {
            cache.unindex_channel(channel_id);
        }
        removed
    };
    if let Some(channel) = removed {
        state.dispatch(Event::GuildChannelDelete(channel));
    }
    Ok(())
}

pub(super) fn parse_channel_pins_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let channel_id = snowflake(data, "channel_id")?;
    let last_pin = opt_string(data, "last_pin_timestamp");
    match opt_snowflake(data, "guild_id") {
        None => match state.get_private_channel(channel_id) {
            Some(channel) => state.dispatch(Event::PrivateChannelPinsUpdate { channel, last_pin }),
            None => tracing::debug!("CHANNEL_PINS_UPDATE referencing an unknown channel ID: {}. Discarding.", channel_id),
        },
        Some(guild_id) => {
            let channel = state
                .get_guild(guild_id)
                .and_then(|guild| guild.read().resolve_channel(channel_id));
            match channel {
                Some(channel) => state.dispatch(Event::GuildChannelPinsUpdate { channel, last_pin }),
                None => tracing::debug!("CHANNEL_PINS_UPDATE referencing an unknown channel ID: {}. Discarding.", channel_id),
            }
        }
    }
    Ok(())
}

pub(super) fn parse_thread_create(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "THREAD_CREATE") else {
        return Ok(());
    };
    let newly_created = flag(data, "newly_created");
    let (thread, known) = {
        let mut cache = state.cache_mut();
        let mut guild = guild.write();
        let thread = Thread::from_payload(guild.id(), data)?;
        let known = guild.threads.contains_key(&thread.id);
        cache.index_channel(thread.id, guild.id());
        guild.threads.insert(thread.id, thread.clone());
        if !known && newly_created {
            let parent = thread.parent_id.and_then(|id| guild.channels.get_mut(&id));
            if let Some(parent) = parent.filter(|p| p.kind == ChannelType::Forum) {
                parent.last_message_id = Some(thread.id);
            }
        }
        (thread, known)
    };
    if known {
        return Ok(());
    }
    if newly_created {
        state.dispatch(Event::ThreadCreate(thread));
    } else {
        state.dispatch(Event::ThreadJoin(thread));
    }
    Ok(())
}

pub(super) fn parse_thread_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "THREAD_UPDATE") else {
        return Ok(());
    };
    let thread_id = snowflake(data, "id")?;
    let mut cache = state.cache_mut();
    let mut guild = guild.write();
    let event = match guild.threads.get_mut(&thread_id) {
        Some(thread) => {
            let before = thread.clone();
            thread.update(data);
            let after = thread.clone();
            if after.archived {
                guild.threads.remove(&thread_id);
                cache.unindex_channel(thread_id);
            }
            Event::ThreadUpdate { before, after }
        }
        None => {
            let thread = Thread::from_payload(guild.id(), data)?;
            if !thread.archived {
                cache.index_channel(thread.id, guild.id());
                guild.threads.insert(thread.id, thread.clone());
            }
            Event::ThreadJoin(thread)
        }
    };
    drop(guild);
    drop(cache);
    state.dispatch(event);
    Ok(())
}

pub(super) fn parse_thread_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "THREAD_DELETE") else {
        return Ok(());
    };
    let mut raw = RawThreadDeleteEvent::from_payload(data)?;
    let removed = {
        let mut cache = state.cache_mut();
        let removed = guild.write().threads.remove(&raw.thread_id);
        if removed.is_some() {
            cache.unindex_channel(raw.thread_id);
        }
        removed
    };
    raw.thread = removed.clone();
    state.dispatch(Event::RawThreadDelete(raw));
    if let Some(thread) = removed {
        state.dispatch(Event::ThreadDelete(thread));
    }
    Ok(())
}

pub(super) fn parse_thread_list_sync(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "THREAD_LIST_SYNC") else {
        return Ok(());
    };
    let (joined, removed) = {
        let mut cache = state.cache_mut();
        let mut guild = guild.write();
        // a sync without channel IDs covers the whole guild
        let previous: HashMap<_, _> = match data.get("channel_ids") {
            Some(ids) => {
                let ids: HashSet<_> = ids.as_array().into_iter().flatten().filter_map(as_snowflake).collect();
                guild.filter_threads(&ids)
            }
            None => guild.clear_threads(),
        };
        for id in previous.keys() {
            cache.unindex_channel(*id);
        }

        let mut synced = Vec::new();
        for raw in array(data, "threads") {
            let thread = Thread::from_payload(guild.id(), raw)?;
            synced.push(thread.id);
            cache.index_channel(thread.id, guild.id());
            guild.threads.insert(thread.id, thread);
        }
        for raw in array(data, "members") {
            let Some(thread) = opt_snowflake(raw, "id").and_then(|id| guild.threads.get_mut(&id)) else {
                continue;
            };
            if let Ok(member) = ThreadMember::from_payload(thread.id, raw) {
                thread.add_member(member);
            }
        }
        let joined: Vec<Thread> = synced
            .iter()
            .filter(|id| !previous.contains_key(*id))
            .filter_map(|id| guild.threads.get(id).cloned())
            .collect();
        let mut removed: Vec<Thread> = previous
            .into_values()
            .filter(|old| !synced.contains(&old.id))
            .collect();
        removed.sort_by_key(|t| t.id);
        (joined, removed)
    };

    for thread in joined {
        state.dispatch(Event::ThreadJoin(thread));
    }
    for thread in removed {
        state.dispatch(Event::ThreadRemove(thread));
    }
    Ok(())
}

pub(super) fn parse_thread_member_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "THREAD_MEMBER_UPDATE") else {
        return Ok(());
    };
    let thread_id = snowflake(data, "id")?;
    let member = ThreadMember::from_payload(thread_id, data)?;
    match guild.write().threads.get_mut(&thread_id) {
        Some(thread) => thread.me = Some(member),
        None => tracing::debug!("THREAD_MEMBER_UPDATE referencing an unknown thread ID: {}. Discarding.", thread_id),
    }
    Ok(())
}

pub(super) fn parse_thread_members_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "THREAD_MEMBERS_UPDATE") else {
        return Ok(());
    };
    let thread_id = snowflake(data, "id")?;
    let self_id = state.user().map(|u| u.id);

    let mut events = Vec::new();
    {
        let mut guild = guild.write();
        let Some(thread) = guild.threads.get_mut(&thread_id) else {
            tracing::debug!("THREAD_MEMBERS_UPDATE referencing an unknown thread ID: {}. Discarding.", thread_id);
            return Ok(());
        };
        for raw in array(data, "added_members") {
            let member = ThreadMember::from_payload(thread_id, raw)?;
            if Some(member.id) == self_id {
                thread.me = Some(member);
                events.push(Event::ThreadJoin(thread.clone()));
            } else {
                thread.add_member(member.clone());
                events.push(Event::ThreadMemberJoin(member));
            }
        }
        for id in array(data, "removed_member_ids").iter().filter_map(as_snowflake) {
            if Some(id) == self_id {
                thread.me = None;
                events.push(Event::ThreadRemove(thread.clone()));
            } else if let Some(member) = thread.pop_member(id) {
                events.push(Event::ThreadMemberRemove(member));
            }
        }
    }
    for event in events {
        state.dispatch(event);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{names, state, state_with_guild};
    use crate::model::Channel;
    use crate::state::Event;
    use serde_json::json;

    #[test]
    fn test_channel_create_indexes_channel() {
        let (state, mut events) = state_with_guild();
        state
            .parse("CHANNEL_CREATE", &json!({"id": "12", "type": 0, "guild_id": "1", "name": "new"}))
            .unwrap();
        assert_eq!(names(&mut events), vec!["guild_channel_create"]);
        assert!(state.get_guild(1).unwrap().read().get_channel(12).is_some());
        assert!(matches!(state.get_channel(12), Some(Channel::Guild(c)) if c.name == "new"));
    }

    #[test]
    fn test_channel_create_unknown_type_or_guild_is_discarded() {
        let (state, mut events) = state_with_guild();
        state
            .parse("CHANNEL_CREATE", &json!({"id": "12", "type": 99, "guild_id": "1"}))
            .unwrap();
        state
            .parse("CHANNEL_CREATE", &json!({"id": "13", "type": 0, "guild_id": "2"}))
            .unwrap();
        assert!(events.drain().is_empty());
        assert!(state.get_channel(13).is_none());
    }

    #[test]
    fn test_channel_update_reports_before_and_after() {
        let (state, mut events) = state_with_guild();
        state
            .parse("CHANNEL_UPDATE", &json!({"id": "10", "type": 0, "guild_id": "1", "name": "renamed"}))
            .unwrap();
        match events.drain().as_slice() {
            [Event::GuildChannelUpdate { before, after }] => {
                assert_eq!(before.name, "general");
                assert_eq!(after.name, "renamed");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_group_update() {
        let (state, mut events) = state();
        let group = json!({"id": "60", "type": 3, "name": "pals", "recipients": []});
        state.parse("CHANNEL_CREATE", &group).unwrap();
        state
            .parse("CHANNEL_UPDATE", &json!({"id": "60", "type": 3, "name": "friends", "recipients": []}))
            .unwrap();
        match events.drain().as_slice() {
            [Event::PrivateChannelUpdate { before, after }] => {
                assert_eq!(before.name.as_deref(), Some("pals"));
                assert_eq!(after.name.as_deref(), Some("friends"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_channel_delete_unindexes() {
        let (state, mut events) = state_with_guild();
        state
            .parse("CHANNEL_DELETE", &json!({"id": "10", "type": 0, "guild_id": "1"}))
            .unwrap();
        assert_eq!(names(&mut events), vec!["guild_channel_delete"]);
        assert!(state.get_channel(10).is_none());

        state
            .parse("CHANNEL_DELETE", &json!({"id": "10", "type": 0, "guild_id": "1"}))
            .unwrap();
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_pins_update_resolves_threads() {
        let (state, mut events) = state_with_guild();
        state
            .parse("CHANNEL_PINS_UPDATE", &json!({"channel_id": "20", "guild_id": "1", "last_pin_timestamp": "t"}))
            .unwrap();
        state
            .parse("CHANNEL_PINS_UPDATE", &json!({"channel_id": "99", "guild_id": "1"}))
            .unwrap();
        match events.drain().as_slice() {
            [Event::GuildChannelPinsUpdate { channel: Channel::Thread(thread), last_pin }] => {
                assert_eq!(thread.id, 20);
                assert_eq!(last_pin.as_deref(), Some("t"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_thread_create_new_or_joined() {
        let (state, mut events) = state_with_guild();
        let created = json!({"id": "21", "type": 11, "guild_id": "1", "parent_id": "10", "newly_created": true});
        let joined = json!({"id": "22", "type": 11, "guild_id": "1", "parent_id": "10"});
        state.parse("THREAD_CREATE", &created).unwrap();
        state.parse("THREAD_CREATE", &joined).unwrap();
        state.parse("THREAD_CREATE", &joined).unwrap();
        assert_eq!(names(&mut events), vec!["thread_create", "thread_join"]);
        assert!(matches!(state.get_channel(22), Some(Channel::Thread(_))));
    }

    #[test]
    fn test_thread_update_archives_or_joins() {
        let (state, mut events) = state_with_guild();
        state
            .parse(
                "THREAD_UPDATE",
                &json!({"id": "20", "type": 11, "guild_id": "1", "thread_metadata": {"archived": true}}),
            )
            .unwrap();
        assert_eq!(names(&mut events), vec!["thread_update"]);
        assert!(state.get_channel(20).is_none());

        state
            .parse("THREAD_UPDATE", &json!({"id": "23", "type": 11, "guild_id": "1", "name": "t"}))
            .unwrap();
        assert_eq!(names(&mut events), vec!["thread_join"]);
        assert!(state.get_channel(23).is_some());
    }

    #[test]
    fn test_thread_delete_raw_then_cached() {
        let (state, mut events) = state_with_guild();
        let payload = json!({"id": "20", "guild_id": "1", "parent_id": "10", "type": 11});
        state.parse("THREAD_DELETE", &payload).unwrap();
        match events.drain().as_slice() {
            [Event::RawThreadDelete(raw), Event::ThreadDelete(thread)] => {
                assert_eq!(raw.thread.as_ref().map(|t| t.id), Some(20));
                assert_eq!(thread.id, 20);
            }
            other => panic!("unexpected {other:?}"),
        }
        state.parse("THREAD_DELETE", &payload).unwrap();
        assert_eq!(names(&mut events), vec!["raw_thread_delete"]);
    }

    #[test]
    fn test_thread_list_sync_joins_and_removes() {
        let (state, mut events) = state_with_guild();
        let sync = json!({
            "guild_id": "1",
            "channel_ids": ["10"],
            "threads": [{"id": "24", "type": 11, "parent_id": "10"}],
            "members": [{"id": "24", "user_id": "5"}]
        });
        state.parse("THREAD_LIST_SYNC", &sync).unwrap();
        assert_eq!(names(&mut events), vec!["thread_join", "thread_remove"]);

        let guild = state.get_guild(1).unwrap();
        let guild = guild.read();
        assert!(guild.get_thread(20).is_none());
        assert!(guild.get_thread(24).unwrap().members.contains_key(&5));
    }

    #[test]
    fn test_thread_list_sync_keeps_surviving_threads_quiet() {
        let (state, mut events) = state_with_guild();
        let sync = json!({
            "guild_id": "1",
            "threads": [{"id": "20", "type": 11, "parent_id": "10"}]
        });
        state.parse("THREAD_LIST_SYNC", &sync).unwrap();
        assert!(events.drain().is_empty());
        assert!(state.get_channel(20).is_some());
    }

    #[test]
    fn test_thread_members_update() {
        let (state, mut events) = state_with_guild();
        state
            .parse(
                "THREAD_MEMBERS_UPDATE",
                &json!({"id": "20", "guild_id": "1", "added_members": [{"user_id": "6"}]}),
            )
            .unwrap();
        state
            .parse(
                "THREAD_MEMBERS_UPDATE",
                &json!({"id": "20", "guild_id": "1", "removed_member_ids": ["6", "7"]}),
            )
            .unwrap();
        assert_eq!(names(&mut events), vec!["thread_member_join", "thread_member_remove"]);
    }

    #[test]
    fn test_thread_member_update_sets_me() {
        let (state, _events) = state_with_guild();
        state
            .parse("THREAD_MEMBER_UPDATE", &json!({"id": "20", "guild_id": "1", "user_id": "9"}))
            .unwrap();
        let guild = state.get_guild(1).unwrap();
        assert_eq!(guild.read().get_thread(20).unwrap().me.as_ref().map(|m| m.id), Some(9));
    }
}
