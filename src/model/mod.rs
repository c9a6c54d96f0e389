//! Object models built from raw event payloads.
//!
//! The cache only needs these objects to be constructible from a raw payload
//! and to expose an identifier. Rich behaviour (sending, editing) lives
//! elsewhere; attributes here are the ones the state engine reads or that
//! applications commonly inspect on a snapshot.
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Guild`] | Guild with owned child collections |
//! | [`Channel`] | Closed sum over guild, thread, private and partial channels |
//! | [`Member`] | Guild member with embedded [`User`] |
//! | [`Message`] | Cached message with reactions |
//! | [`raw`] | Raw event payloads carrying cached copies when available |

mod channel;
mod emoji;
mod guild;
mod member;
mod message;
pub mod raw;
mod user;

pub use channel::{
    channel_factory, Channel, ChannelKind, ChannelType, DmChannel, GroupChannel, GuildChannel,
    PartialMessageable, PrivateChannel, Thread, ThreadMember,
};
pub use emoji::{Emoji, GuildSticker, PartialEmoji, SoundboardSound};
pub use guild::{Guild, GuildInfo, Role, ScheduledEvent, StageInstance};
pub use member::Member;
pub use message::{Message, Reaction, ReactionEmoji};
pub use user::User;

use crate::error::{Result, StateError};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// 64-bit platform identifier.
pub type Snowflake = u64;

/// A cached entity shared between the cache and everyone holding a handle.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wrap a value into a [`Shared`] handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// Parse a snowflake that may be encoded as a string or a number.
pub(crate) fn as_snowflake(value: &Value) -> Option<Snowflake> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Required snowflake field.
pub(crate) fn snowflake(data: &Value, key: &'static str) -> Result<Snowflake> {
    data.get(key)
        .and_then(as_snowflake)
        .ok_or(StateError::MissingField(key))
}

/// Optional snowflake field; `null` and absent both map to `None`.
pub(crate) fn opt_snowflake(data: &Value, key: &str) -> Option<Snowflake> {
    data.get(key).and_then(as_snowflake)
}

/// Required string field.
pub(crate) fn string(data: &Value, key: &'static str) -> Result<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(StateError::MissingField(key))
}

pub(crate) fn opt_string(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_owned)
}

pub(crate) fn flag(data: &Value, key: &str) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn opt_u64(data: &Value, key: &str) -> Option<u64> {
    data.get(key).and_then(Value::as_u64)
}

/// Array field, empty when absent.
pub(crate) fn array<'a>(data: &'a Value, key: &str) -> &'a [Value] {
    data.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Required object field.
pub(crate) fn object<'a>(data: &'a Value, key: &'static str) -> Result<&'a Value> {
    match data.get(key) {
        Some(v @ Value::Object(_)) => Ok(v),
        _ => Err(StateError::MissingField(key)),
    }
}

/// Snowflake list, skipping unparseable entries.
pub(crate) fn snowflakes(data: &Value, key: &str) -> Vec<Snowflake> {
    array(data, key).iter().filter_map(as_snowflake).collect()
}
