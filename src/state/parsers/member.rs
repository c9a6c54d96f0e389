//! Members, presences, bans and the client user.

use crate::error::Result;
use crate::model::raw::RawMemberRemoveEvent;
use crate::model::{array, object, opt_snowflake, opt_u64, snowflake, Member, Snowflake, User};
use crate::state::{ConnectionState, Event};
use serde_json::Value;
use std::collections::HashMap;

pub(super) fn parse_member_add(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_MEMBER_ADD") else {
        return Ok(());
    };
    let guild_id = guild.read().id();
    let member = Member::from_payload(guild_id, data)?;
    {
        let mut guild = guild.write();
        if state.config().member_cache_flags().joined {
            guild.add_member(member.clone());
        }
        guild.adjust_member_count(1);
    }
    state.dispatch(Event::MemberJoin(member));
    Ok(())
}

pub(super) fn parse_member_remove(state: &ConnectionState, data: &Value) -> Result<()> {
    let raw = RawMemberRemoveEvent::from_payload(data)?;
    match state.get_guild(raw.guild_id) {
        Some(guild) => {
            let removed = {
                let mut guild = guild.write();
                guild.adjust_member_count(-1);
                guild.remove_member(raw.user.id)
            };
            if let Some(member) = removed {
                state.dispatch(Event::MemberRemove(member));
            }
        }
        None => tracing::debug!(
            "GUILD_MEMBER_REMOVE referencing an unknown guild ID: {}. Discarding.",
            raw.guild_id
        ),
    }
    state.dispatch(Event::RawMemberRemove(raw));
    Ok(())
}

/// Mirror a user change into the global user cache.
fn refresh_cached_user(state: &ConnectionState, user_id: Snowflake, data: &Value) {
    if let Some(user) = state.get_user(user_id) {
        user.write().update(data);
    }
}

pub(super) fn parse_member_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_MEMBER_UPDATE") else {
        return Ok(());
    };
    let raw_user = object(data, "user")?;
    let user_id = snowflake(raw_user, "id")?;

    let (member_change, user_change) = {
        let mut guild = guild.write();
        let guild_id = guild.id();
        match guild.members.get_mut(&user_id) {
            Some(member) => {
                let before = member.clone();
                member.update(data);
                let user_change = member.update_inner_user(raw_user);
                (Some((before, member.clone())), user_change)
            }
            None => {
                tracing::debug!(
                    "GUILD_MEMBER_UPDATE referencing an unknown member ID: {}. Discarding.",
                    user_id
                );
                if state.config().member_cache_flags().joined {
                    guild.add_member(Member::from_payload(guild_id, data)?);
                }
                (None, None)
            }
        }
    };

    if let Some((before, after)) = user_change {
        refresh_cached_user(state, user_id, raw_user);
        state.dispatch(Event::UserUpdate { before, after });
    }
    if let Some((before, after)) = member_change {
        state.dispatch(Event::MemberUpdate { before, after });
    }
    Ok(())
}

pub(super) fn parse_members_chunk(state: &ConnectionState, data: &Value) -> Result<()> {
    let guild_id = snowflake(data, "guild_id")?;
    let mut members = array(data, "members")
        .iter()
        .map(|raw| Member::from_payload(guild_id, raw))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!("Processed a chunk for {} members in guild ID {}.", members.len(), guild_id);

    let presences = array(data, "presences");
    if !presences.is_empty() {
        let mut by_id: HashMap<Snowflake, &mut Member> = members.iter_mut().map(|m| (m.id(), m)).collect();
        for presence in presences {
            let Some(user) = presence.get("user") else {
                continue;
            };
            if let Some(member) = opt_snowflake(user, "id").and_then(|id| by_id.get_mut(&id)) {
                member.presence_update(presence, user);
            }
        }
    }

    let Some(nonce) = data.get("nonce").and_then(Value::as_str) else {
        return Ok(());
    };
    let request = state.chunks().lock().get(nonce);
    let Some(request) = request.filter(|r| r.guild_id() == guild_id) else {
        return Ok(());
    };
    match state.get_guild(guild_id) {
        Some(guild) => {
            let mut guild = guild.write();
            request.add_members(members, Some(&mut *guild));
        }
        None => request.add_members(members, None),
    }

    let complete = opt_u64(data, "chunk_index").unwrap_or(0) + 1 == opt_u64(data, "chunk_count").unwrap_or(1);
    if complete {
        state.chunks().lock().complete(nonce);
    }
    Ok(())
}

pub(super) fn parse_presence_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "PRESENCE_UPDATE") else {
        return Ok(());
    };
    let raw_user = object(data, "user")?;
    let user_id = snowflake(raw_user, "id")?;

    let updated = {
        let mut guild = guild.write();
        guild.members.get_mut(&user_id).map(|member| {
            let before = member.clone();
            let user_change = member.presence_update(data, raw_user);
            (before, member.clone(), user_change)
        })
    };
    let Some((before, after, user_change)) = updated else {
        tracing::debug!("PRESENCE_UPDATE referencing an unknown member ID: {}. Discarding.", user_id);
        return Ok(());
    };
    if let Some((old, new)) = user_change {
        refresh_cached_user(state, user_id, raw_user);
        state.dispatch(Event::UserUpdate { before: old, after: new });
    }
    state.dispatch(Event::PresenceUpdate { before, after });
    Ok(())
}

/// The client user changed. No notification is emitted.
pub(super) fn parse_user_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let user_id = {
        let mut cache = state.cache_mut();
        let Some(user) = cache.user.as_mut() else {
            return Ok(());
        };
        user.update(data);
        user.id
    };
    refresh_cached_user(state, user_id, data);
    Ok(())
}

pub(super) fn parse_ban_add(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_BAN_ADD") else {
        return Ok(());
    };
    let guild_id = guild.read().id();
    let user = User::from_payload(object(data, "user")?)?;
    state.dispatch(Event::MemberBan { guild_id, user });
    Ok(())
}

pub(super) fn parse_ban_remove(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_BAN_REMOVE") else {
        return Ok(());
    };
    let guild_id = guild.read().id();
    let user = User::from_payload(object(data, "user")?)?;
    state.dispatch(Event::MemberUnban { guild_id, user });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{names, state_with_guild};
    use crate::model::User;
    use crate::state::Event;
    use serde_json::json;

    fn member(id: &str, name: &str) -> serde_json::Value {
        json!({"guild_id": "1", "user": {"id": id, "username": name}, "joined_at": "2024-02-02"})
    }

    #[test]
    fn test_member_add_and_remove_track_count() {
        let (state, mut events) = state_with_guild();
        state.parse("GUILD_MEMBER_ADD", &member("6", "bob")).unwrap();
        {
            let guild = state.get_guild(1).unwrap();
            let guild = guild.read();
            assert!(guild.get_member(6).is_some());
            assert_eq!(guild.info.member_count, Some(2));
        }

        state.parse("GUILD_MEMBER_REMOVE", &member("6", "bob")).unwrap();
        state.parse("GUILD_MEMBER_REMOVE", &member("7", "eve")).unwrap();
        assert_eq!(
            names(&mut events),
            vec!["member_join", "member_remove", "raw_member_remove", "raw_member_remove"]
        );
        assert_eq!(state.get_guild(1).unwrap().read().info.member_count, Some(0));
    }

    #[test]
    fn test_member_update_reports_user_change_first() {
        let (state, mut events) = state_with_guild();
        let update = json!({"guild_id": "1", "user": {"id": "5", "username": "annie"}, "nick": "a", "roles": []});
        state.parse("GUILD_MEMBER_UPDATE", &update).unwrap();
        match events.drain().as_slice() {
            [Event::UserUpdate { before, after }, Event::MemberUpdate { before: old, after: new }] => {
                assert_eq!(before.name, "ann");
                assert_eq!(after.name, "annie");
                assert_eq!(old.nick, None);
                assert_eq!(new.nick.as_deref(), Some("a"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_member_update_for_unknown_member_caches_silently() {
        let (state, mut events) = state_with_guild();
        state.parse("GUILD_MEMBER_UPDATE", &member("8", "new")).unwrap();
        assert!(events.drain().is_empty());
        assert!(state.get_guild(1).unwrap().read().get_member(8).is_some());
    }

    #[test]
    fn test_presence_update() {
        let (state, mut events) = state_with_guild();
        let presence = json!({"guild_id": "1", "user": {"id": "5"}, "status": "idle", "activities": []});
        state.parse("PRESENCE_UPDATE", &presence).unwrap();
        match events.drain().as_slice() {
            [Event::PresenceUpdate { before, after }] => {
                assert_eq!(before.status, None);
                assert_eq!(after.status.as_deref(), Some("idle"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let stranger = json!({"guild_id": "1", "user": {"id": "9"}, "status": "idle"});
        state.parse("PRESENCE_UPDATE", &stranger).unwrap();
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_chunk_fills_request_and_guild() {
        let (state, _events) = state_with_guild();
        let request = state.chunks().lock().request(1, true);
        let chunk = |index: u64, id: &str| {
            json!({
                "guild_id": "1",
                "nonce": request.nonce(),
                "chunk_index": index,
                "chunk_count": 2,
                "members": [{"user": {"id": id, "username": "m"}}],
                "presences": [{"user": {"id": id}, "status": "online"}]
            })
        };

        state.parse("GUILD_MEMBERS_CHUNK", &chunk(0, "40")).unwrap();
        assert!(!request.is_done());
        assert_eq!(request.buffered(), 1);

        state.parse("GUILD_MEMBERS_CHUNK", &chunk(1, "41")).unwrap();
        assert!(request.is_done());
        assert!(state.chunks().lock().is_empty());

        let guild = state.get_guild(1).unwrap();
        let guild = guild.read();
        assert_eq!(guild.get_member(41).unwrap().status.as_deref(), Some("online"));
    }

    #[test]
    fn test_chunk_for_other_guild_is_ignored() {
        let (state, _events) = state_with_guild();
        let request = state.chunks().lock().request(2, true);
        let chunk = json!({
            "guild_id": "1",
            "nonce": request.nonce(),
            "chunk_index": 0,
            "chunk_count": 1,
            "members": []
        });
        state.parse("GUILD_MEMBERS_CHUNK", &chunk).unwrap();
        assert!(!request.is_done());
    }

    #[test]
    fn test_user_update_touches_client_user() {
        let (state, mut events) = state_with_guild();
        state.cache_mut().user = Some(User::from_payload(&json!({"id": "99", "username": "me"})).unwrap());
        state.parse("USER_UPDATE", &json!({"id": "99", "username": "renamed"})).unwrap();
        assert!(events.drain().is_empty());
        assert_eq!(state.user().unwrap().name, "renamed");
    }

    #[test]
    fn test_bans() {
        let (state, mut events) = state_with_guild();
        let ban = json!({"guild_id": "1", "user": {"id": "6", "username": "bob"}});
        state.parse("GUILD_BAN_ADD", &ban).unwrap();
        state.parse("GUILD_BAN_REMOVE", &ban).unwrap();
        assert_eq!(names(&mut events), vec!["member_ban", "member_unban"]);
    }
}
