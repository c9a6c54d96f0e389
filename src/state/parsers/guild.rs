//! Guild lifecycle and the entities a guild owns.

use crate::error::Result;
use crate::model::{array, opt_snowflake, snowflake, Role, ScheduledEvent, Snowflake, StageInstance};
use crate::state::{ConnectionState, Event};
use serde_json::Value;

pub(super) fn parse_guild_create(state: &ConnectionState, data: &Value) -> Result<()> {
    let unavailable = data.get("unavailable").and_then(Value::as_bool);
    if unavailable == Some(true) {
        return Ok(());
    }
    // an explicit `false` marks a guild from READY coming online
    let available = unavailable == Some(false);
    let guild_id = snowflake(data, "id")?;

    let guild = {
        let mut cache = state.cache_mut();
        match cache.get_guild(guild_id) {
            Some(guild) if available => {
                cache.refresh_guild(&guild, data)?;
                guild
            }
            Some(_) => cache.replace_guild(data)?,
            None => cache.add_guild_from_data(data)?,
        }
    };

    if state.queue_guild(&guild, available) {
        return Ok(());
    }
    let needs_chunking = state.needs_chunking(&guild.read());
    if needs_chunking {
        state.chunk_and_announce(guild, available);
    } else {
        state.announce_guild(guild, available);
    }
    Ok(())
}

pub(super) fn parse_guild_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let guild_id = snowflake(data, "id")?;
    let Some(guild) = state.get_guild(guild_id) else {
        tracing::debug!("GUILD_UPDATE referencing an unknown guild ID: {}. Discarding.", guild_id);
        return Ok(());
    };
    let before = {
        let mut guild = guild.write();
        let before = guild.info.clone();
        guild.update(data);
        before
    };
    state.dispatch(Event::GuildUpdate { before, after: guild });
    Ok(())
}

pub(super) fn parse_guild_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    let guild_id = snowflake(data, "id")?;
    let Some(guild) = state.get_guild(guild_id) else {
        tracing::debug!("GUILD_DELETE referencing an unknown guild ID: {}. Discarding.", guild_id);
        return Ok(());
    };
    if data.get("unavailable").and_then(Value::as_bool).unwrap_or(false) {
        guild.write().info.unavailable = true;
        state.dispatch(Event::GuildUnavailable(guild));
        return Ok(());
    }
    let removed = state.cache_mut().remove_guild(guild_id);
    if let Some(removed) = removed {
        state.dispatch(Event::GuildRemove(removed));
    }
    Ok(())
}

// ========== Expressions ==========

pub(super) fn parse_emojis_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_EMOJIS_UPDATE") else {
        return Ok(());
    };
    let (guild_id, before, after) = {
        let mut cache = state.cache_mut();
        let mut guild = guild.write();
        let (before, after) = cache.replace_guild_emojis(&mut guild, array(data, "emojis"))?;
        (guild.id(), before, after)
    };
    state.dispatch(Event::GuildEmojisUpdate { guild_id, before, after });
    Ok(())
}

pub(super) fn parse_stickers_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_STICKERS_UPDATE") else {
        return Ok(());
    };
    let (guild_id, before, after) = {
        let mut cache = state.cache_mut();
        let mut guild = guild.write();
        let (before, after) = cache.replace_guild_stickers(&mut guild, array(data, "stickers"))?;
        (guild.id(), before, after)
    };
    state.dispatch(Event::GuildStickersUpdate { guild_id, before, after });
    Ok(())
}

// ========== Roles ==========

pub(super) fn parse_role_create(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_ROLE_CREATE") else {
        return Ok(());
    };
    let role_data = data.get("role").unwrap_or(&Value::Null);
    let role = {
        let mut guild = guild.write();
        let role = Role::from_payload(guild.id(), role_data)?;
        guild.add_role(role.clone());
        role
    };
    state.dispatch(Event::GuildRoleCreate(role));
    Ok(())
}

pub(super) fn parse_role_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_ROLE_UPDATE") else {
        return Ok(());
    };
    let role_data = data.get("role").unwrap_or(&Value::Null);
    let role_id = snowflake(role_data, "id")?;
    let updated = {
        let mut guild = guild.write();
        match guild.get_role(role_id).cloned() {
            Some(before) => {
                let after = Role::from_payload(guild.id(), role_data)?;
                guild.add_role(after.clone());
                Some((before, after))
            }
            None => None,
        }
    };
    if let Some((before, after)) = updated {
        state.dispatch(Event::GuildRoleUpdate { before, after });
    }
    Ok(())
}

pub(super) fn parse_role_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_ROLE_DELETE") else {
        return Ok(());
    };
    let role_id = snowflake(data, "role_id")?;
    let removed = guild.write().remove_role(role_id);
    if let Some(role) = removed {
        state.dispatch(Event::GuildRoleDelete(role));
    }
    Ok(())
}

// ========== Stage instances ==========

pub(super) fn parse_stage_instance_create(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "STAGE_INSTANCE_CREATE") else {
        return Ok(());
    };
    let instance = {
        let mut guild = guild.write();
        let instance = StageInstance::from_payload(guild.id(), data)?;
        guild.stage_instances.insert(instance.id, instance.clone());
        instance
    };
    state.dispatch(Event::StageInstanceCreate(instance));
    Ok(())
}

pub(super) fn parse_stage_instance_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "STAGE_INSTANCE_UPDATE") else {
        return Ok(());
    };
    let id = snowflake(data, "id")?;
    let updated = guild.write().stage_instances.get_mut(&id).map(|instance| {
        let before = instance.clone();
        instance.update(data);
        (before, instance.clone())
    });
    match updated {
        Some((before, after)) => state.dispatch(Event::StageInstanceUpdate { before, after }),
        None => tracing::debug!("STAGE_INSTANCE_UPDATE referencing unknown stage instance ID: {}. Discarding.", id),
    }
    Ok(())
}

pub(super) fn parse_stage_instance_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "STAGE_INSTANCE_DELETE") else {
        return Ok(());
    };
    let id = snowflake(data, "id")?;
    let removed = guild.write().stage_instances.remove(&id);
    if let Some(instance) = removed {
        state.dispatch(Event::StageInstanceDelete(instance));
    }
    Ok(())
}

// ========== Scheduled events ==========

pub(super) fn parse_scheduled_event_create(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_SCHEDULED_EVENT_CREATE") else {
        return Ok(());
    };
    let event = {
        let mut guild = guild.write();
        let event = ScheduledEvent::from_payload(guild.id(), data)?;
        guild.scheduled_events.insert(event.id, event.clone());
        event
    };
    state.dispatch(Event::ScheduledEventCreate(event));
    Ok(())
}

pub(super) fn parse_scheduled_event_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_SCHEDULED_EVENT_UPDATE") else {
        return Ok(());
    };
    let id = snowflake(data, "id")?;
    let updated = {
        let mut guild = guild.write();
        match guild.scheduled_events.get_mut(&id) {
            Some(event) => {
                let before = event.clone();
                event.update(data)?;
                Some((before, event.clone()))
            }
            None => None,
        }
    };
    match updated {
        Some((before, after)) => state.dispatch(Event::ScheduledEventUpdate { before, after }),
        None => tracing::debug!("GUILD_SCHEDULED_EVENT_UPDATE referencing unknown event ID: {}. Discarding.", id),
    }
    Ok(())
}

pub(super) fn parse_scheduled_event_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_SCHEDULED_EVENT_DELETE") else {
        return Ok(());
    };
    let id = snowflake(data, "id")?;
    let removed = guild.write().scheduled_events.remove(&id);
    match removed {
        Some(event) => state.dispatch(Event::ScheduledEventDelete(event)),
        None => tracing::debug!("GUILD_SCHEDULED_EVENT_DELETE referencing unknown event ID: {}. Discarding.", id),
    }
    Ok(())
}

/// Apply a subscription change; `subscribed` is the new state for the user.
fn scheduled_event_subscription(
    state: &ConnectionState,
    data: &Value,
    event_name: &str,
    subscribed: bool,
) -> Result<Option<(ScheduledEvent, Snowflake)>> {
    let Some(guild) = state.known_guild(data, event_name) else {
        return Ok(None);
    };
    let id = snowflake(data, "guild_scheduled_event_id")?;
    let user_id = snowflake(data, "user_id")?;
    let mut guild = guild.write();
    let Some(event) = guild.scheduled_events.get_mut(&id) else {
        tracing::debug!("{} referencing unknown event ID: {}. Discarding.", event_name, id);
        return Ok(None);
    };
    let changed = if subscribed {
        event.subscribers.insert(user_id)
    } else {
        event.subscribers.remove(&user_id)
    };
    if changed {
        if let Some(count) = event.user_count.as_mut() {
            *count = if subscribed { *count + 1 } else { count.saturating_sub(1) };
        }
    }
    Ok(Some((event.clone(), user_id)))
}

pub(super) fn parse_scheduled_event_user_add(state: &ConnectionState, data: &Value) -> Result<()> {
    if let Some((event, user_id)) =
        scheduled_event_subscription(state, data, "GUILD_SCHEDULED_EVENT_USER_ADD", true)?
    {
        state.dispatch(Event::ScheduledEventUserAdd { event, user_id });
    }
    Ok(())
}

pub(super) fn parse_scheduled_event_user_remove(state: &ConnectionState, data: &Value) -> Result<()> {
    if let Some((event, user_id)) =
        scheduled_event_subscription(state, data, "GUILD_SCHEDULED_EVENT_USER_REMOVE", false)?
    {
        state.dispatch(Event::ScheduledEventUserRemove { event, user_id });
    }
    Ok(())
}

// ========== Soundboard ==========

pub(super) fn parse_soundboard_sound_create(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_SOUNDBOARD_SOUND_CREATE") else {
        return Ok(());
    };
    let sound = {
        let mut cache = state.cache_mut();
        let sound = cache.store_soundboard_sound(data)?;
        let mut guild = guild.write();
        if !guild.soundboard_sounds.contains(&sound.id) {
            guild.soundboard_sounds.push(sound.id);
        }
        sound
    };
    state.dispatch(Event::SoundboardSoundCreate(sound));
    Ok(())
}

pub(super) fn parse_soundboard_sound_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let sound_id = snowflake(data, "sound_id")?;
    let updated = {
        let mut cache = state.cache_mut();
        match cache.get_soundboard_sound(sound_id) {
            Some(before) => Some((before, cache.store_soundboard_sound(data)?)),
            None => None,
        }
    };
    match updated {
        Some((before, after)) => state.dispatch(Event::SoundboardSoundUpdate { before, after }),
        None => tracing::debug!("GUILD_SOUNDBOARD_SOUND_UPDATE referencing unknown sound ID: {}. Discarding.", sound_id),
    }
    Ok(())
}

pub(super) fn parse_soundboard_sound_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    let sound_id = snowflake(data, "sound_id")?;
    let removed = {
        let mut cache = state.cache_mut();
        if let Some(guild) = opt_snowflake(data, "guild_id").and_then(|id| cache.get_guild(id)) {
            guild.write().soundboard_sounds.retain(|id| *id != sound_id);
        }
        cache.remove_soundboard_sound(sound_id)
    };
    match removed {
        Some(sound) => state.dispatch(Event::SoundboardSoundDelete(sound)),
        None => tracing::debug!("GUILD_SOUNDBOARD_SOUND_DELETE referencing unknown sound ID: {}. Discarding.", sound_id),
    }
    Ok(())
}

/// A full sound list for one guild. Cached silently.
pub(super) fn parse_soundboard_sounds(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "SOUNDBOARD_SOUNDS") else {
        return Ok(());
    };
    let mut cache = state.cache_mut();
    let mut guild = guild.write();
    for raw in array(data, "soundboard_sounds") {
        let mut raw = raw.clone();
        if raw.get("guild_id").is_none() {
            raw["guild_id"] = Value::String(guild.id().to_string());
        }
        let sound = cache.store_soundboard_sound(&raw)?;
        if !guild.soundboard_sounds.contains(&sound.id) {
            guild.soundboard_sounds.push(sound.id);
        }
    }
    Ok(())
}
