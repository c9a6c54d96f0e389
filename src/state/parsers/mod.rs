//! Event name → parser table.
//!
//! Parsers resolve what the payload references, mutate the cache, and only
//! then emit notifications. Entities are snapshotted before an update is
//! applied so `before` and `after` can both be reported.

mod channel;
mod guild;
mod member;
mod message;

use super::ready::{parse_ready, parse_resumed};
use super::{ConnectionState, Event, Parser};
use crate::error::Result;
use crate::model::raw::RawIntegrationDeleteEvent;
use crate::model::{opt_snowflake, snowflake};
use serde_json::Value;
use std::collections::HashMap;

/// Build the dispatch table. Keys are upper-case gateway event names.
pub(super) fn table() -> HashMap<&'static str, Parser> {
    let entries: &[(&'static str, Parser)] = &[
        ("READY", parse_ready),
        ("RESUMED", parse_resumed),
        ("MESSAGE_CREATE", message::parse_message_create),
        ("MESSAGE_DELETE", message::parse_message_delete),
        ("MESSAGE_DELETE_BULK", message::parse_message_delete_bulk),
        ("MESSAGE_UPDATE", message::parse_message_update),
        ("MESSAGE_REACTION_ADD", message::parse_reaction_add),
        ("MESSAGE_REACTION_REMOVE", message::parse_reaction_remove),
        ("MESSAGE_REACTION_REMOVE_ALL", message::parse_reaction_remove_all),
        ("MESSAGE_REACTION_REMOVE_EMOJI", message::parse_reaction_remove_emoji),
        ("TYPING_START", message::parse_typing_start),
        ("INTERACTION_CREATE", parse_interaction_create),
        ("PRESENCE_UPDATE", member::parse_presence_update),
        ("USER_UPDATE", member::parse_user_update),
        ("INVITE_CREATE", parse_invite_create),
        ("INVITE_DELETE", parse_invite_delete),
        ("CHANNEL_CREATE", channel::parse_channel_create),
        ("CHANNEL_UPDATE", channel::parse_channel_update),
        ("CHANNEL_DELETE", channel::parse_channel_delete),
        ("CHANNEL_PINS_UPDATE", channel::parse_channel_pins_update),
        ("THREAD_CREATE", channel::parse_thread_create),
        ("THREAD_UPDATE", channel::parse_thread_update),
        ("THREAD_DELETE", channel::parse_thread_delete),
        ("THREAD_LIST_SYNC", channel::parse_thread_list_sync),
        ("THREAD_MEMBER_UPDATE", channel::parse_thread_member_update),
        ("THREAD_MEMBERS_UPDATE", channel::parse_thread_members_update),
        ("WEBHOOKS_UPDATE", parse_webhooks_update),
        ("GUILD_MEMBER_ADD", member::parse_member_add),
        ("GUILD_MEMBER_REMOVE", member::parse_member_remove),
        ("GUILD_MEMBER_UPDATE", member::parse_member_update),
        ("GUILD_MEMBERS_CHUNK", member::parse_members_chunk),
        ("GUILD_BAN_ADD", member::parse_ban_add),
        ("GUILD_BAN_REMOVE", member::parse_ban_remove),
        ("GUILD_CREATE", guild::parse_guild_create),
        ("GUILD_UPDATE", guild::parse_guild_update),
        ("GUILD_DELETE", guild::parse_guild_delete),
        ("GUILD_EMOJIS_UPDATE", guild::parse_emojis_update),
        ("GUILD_STICKERS_UPDATE", guild::parse_stickers_update),
        ("GUILD_ROLE_CREATE", guild::parse_role_create),
        ("GUILD_ROLE_UPDATE", guild::parse_role_update),
        ("GUILD_ROLE_DELETE", guild::parse_role_delete),
        ("GUILD_INTEGRATIONS_UPDATE", parse_integrations_update),
        ("INTEGRATION_CREATE", parse_integration_create),
        ("INTEGRATION_UPDATE", parse_integration_update),
        ("INTEGRATION_DELETE", parse_integration_delete),
        ("GUILD_AUDIT_LOG_ENTRY_CREATE", parse_audit_log_entry_create),
        ("AUTO_MODERATION_RULE_CREATE", parse_auto_moderation_rule_create),
        ("AUTO_MODERATION_RULE_UPDATE", parse_auto_moderation_rule_update),
        ("AUTO_MODERATION_RULE_DELETE", parse_auto_moderation_rule_delete),
        ("AUTO_MODERATION_ACTION_EXECUTION", parse_auto_moderation_action_execution),
        ("STAGE_INSTANCE_CREATE", guild::parse_stage_instance_create),
        ("STAGE_INSTANCE_UPDATE", guild::parse_stage_instance_update),
        ("STAGE_INSTANCE_DELETE", guild::parse_stage_instance_delete),
        ("GUILD_SCHEDULED_EVENT_CREATE", guild::parse_scheduled_event_create),
        ("GUILD_SCHEDULED_EVENT_UPDATE", guild::parse_scheduled_event_update),
        ("GUILD_SCHEDULED_EVENT_DELETE", guild::parse_scheduled_event_delete),
        ("GUILD_SCHEDULED_EVENT_USER_ADD", guild::parse_scheduled_event_user_add),
        ("GUILD_SCHEDULED_EVENT_USER_REMOVE", guild::parse_scheduled_event_user_remove),
        ("GUILD_SOUNDBOARD_SOUND_CREATE", guild::parse_soundboard_sound_create),
        ("GUILD_SOUNDBOARD_SOUND_UPDATE", guild::parse_soundboard_sound_update),
        ("GUILD_SOUNDBOARD_SOUND_DELETE", guild::parse_soundboard_sound_delete),
        ("SOUNDBOARD_SOUNDS", guild::parse_soundboard_sounds),
        ("GUILD_SOUNDBOARD_SOUNDS_UPDATE", guild::parse_soundboard_sounds),
        ("GUILD_MEMBER_LIST_UPDATE", parse_ignored),
        ("VOICE_STATE_UPDATE", parse_ignored),
        ("VOICE_SERVER_UPDATE", parse_ignored),
        ("VOICE_CHANNEL_EFFECT_SEND", parse_ignored),
    ];
    entries.iter().copied().collect()
}

/// Known events the state has no use for.
fn parse_ignored(_state: &ConnectionState, _data: &Value) -> Result<()> {
    Ok(())
}

fn parse_interaction_create(state: &ConnectionState, data: &Value) -> Result<()> {
    if let Some(user) = data.get("user").or_else(|| data.get("member").and_then(|m| m.get("user"))) {
        state.cache_mut().store_user(user)?;
    }
    state.dispatch(Event::Interaction(data.clone()));
    Ok(())
}

fn parse_invite_create(state: &ConnectionState, data: &Value) -> Result<()> {
    state.dispatch(Event::InviteCreate(data.clone()));
    Ok(())
}

fn parse_invite_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    state.dispatch(Event::InviteDelete(data.clone()));
    Ok(())
}

fn parse_integrations_update(state: &ConnectionState, data: &Value) -> Result<()> {
    if let Some(guild) = state.known_guild(data, "GUILD_INTEGRATIONS_UPDATE") {
        let guild_id = guild.read().id();
        state.dispatch(Event::GuildIntegrationsUpdate(guild_id));
    }
    Ok(())
}

fn parse_integration_create(state: &ConnectionState, data: &Value) -> Result<()> {
    if let Some(guild) = state.known_guild(data, "INTEGRATION_CREATE") {
        let guild_id = guild.read().id();
        state.dispatch(Event::IntegrationCreate {
            guild_id,
            integration: data.clone(),
        });
    }
    Ok(())
}

fn parse_integration_update(state: &ConnectionState, data: &Value) -> Result<()> {
    if let Some(guild) = state.known_guild(data, "INTEGRATION_UPDATE") {
        let guild_id = guild.read().id();
        state.dispatch(Event::IntegrationUpdate {
            guild_id,
            integration: data.clone(),
        });
    }
    Ok(())
}

fn parse_integration_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    let raw = RawIntegrationDeleteEvent::from_payload(data)?;
    if state.known_guild(data, "INTEGRATION_DELETE").is_some() {
        state.dispatch(Event::RawIntegrationDelete(raw));
    }
    Ok(())
}

fn parse_audit_log_entry_create(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "GUILD_AUDIT_LOG_ENTRY_CREATE") else {
        return Ok(());
    };
    let guild_id = guild.read().id();
    let user = opt_snowflake(data, "user_id")
        .and_then(|id| state.get_user(id))
        .map(|user| user.read().clone());
    state.dispatch(Event::GuildAuditLogEntryCreate {
        guild_id,
        entry: data.clone(),
        user,
    });
    Ok(())
}

fn parse_auto_moderation_rule_create(state: &ConnectionState, data: &Value) -> Result<()> {
    state.dispatch(Event::AutoModerationRuleCreate(data.clone()));
    Ok(())
}

fn parse_auto_moderation_rule_update(state: &ConnectionState, data: &Value) -> Result<()> {
    state.dispatch(Event::AutoModerationRuleUpdate(data.clone()));
    Ok(())
}

fn parse_auto_moderation_rule_delete(state: &ConnectionState, data: &Value) -> Result<()> {
    state.dispatch(Event::AutoModerationRuleDelete(data.clone()));
    Ok(())
}

fn parse_auto_moderation_action_execution(state: &ConnectionState, data: &Value) -> Result<()> {
    state.dispatch(Event::AutoModerationActionExecution(data.clone()));
    Ok(())
}

fn parse_webhooks_update(state: &ConnectionState, data: &Value) -> Result<()> {
    let Some(guild) = state.known_guild(data, "WEBHOOKS_UPDATE") else {
        return Ok(());
    };
    let channel_id = snowflake(data, "channel_id")?;
    let channel = guild.read().get_channel(channel_id).cloned();
    match channel {
        Some(channel) => state.dispatch(Event::WebhooksUpdate(channel)),
        None => tracing::debug!("WEBHOOKS_UPDATE referencing an unknown channel ID: {}. Discarding.", channel_id),
    }
    Ok(())
}
