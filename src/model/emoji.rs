use super::{flag, opt_snowflake, opt_string, snowflake, snowflakes, Snowflake};
use crate::error::Result;
use serde_json::Value;

/// A custom guild emoji.
#[derive(Debug, Clone, PartialEq)]
pub struct Emoji {
    /// Emoji ID
    pub id: Snowflake,
    /// Owning guild
    pub guild_id: Snowflake,
    /// Emoji name
    pub name: String,
    /// Animated image
    pub animated: bool,
    /// False when lost to a boost downgrade
    pub available: bool,
    /// Roles allowed to use it; empty means everyone
    pub roles: Vec<Snowflake>,
}

impl Emoji {
    /// Build from an emoji payload of `guild_id`.
    pub fn from_payload(guild_id: Snowflake, data: &Value) -> Result<Self> {
        Ok(Emoji {
            id: snowflake(data, "id")?,
            guild_id,
            name: opt_string(data, "name").unwrap_or_default(),
            animated: flag(data, "animated"),
            available: data.get("available").and_then(Value::as_bool).unwrap_or(true),
            roles: snowflakes(data, "roles"),
        })
    }
}

/// An emoji as referenced by reactions: custom (with ID) or unicode (name only).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartialEmoji {
    /// Set for custom emojis
    pub id: Option<Snowflake>,
    /// Unicode text, or the custom emoji's name
    pub name: Option<String>,
    /// Animated image
    pub animated: bool,
}

impl PartialEmoji {
    /// Build from an emoji object; every field is optional.
    pub fn from_payload(data: &Value) -> Self {
        PartialEmoji {
            id: opt_snowflake(data, "id"),
            name: opt_string(data, "name"),
            animated: flag(data, "animated"),
        }
    }

    /// Whether this is a unicode emoji.
    pub fn is_unicode(&self) -> bool {
        self.id.is_none()
    }
}

/// A guild sticker.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildSticker {
    /// Sticker ID
    pub id: Snowflake,
    /// Owning guild
    pub guild_id: Snowflake,
    /// Sticker name
    pub name: String,
    /// Sticker description
    pub description: Option<String>,
    /// Image format code
    pub format_type: u64,
    /// False when lost to a boost downgrade
    pub available: bool,
}

impl GuildSticker {
    /// Build from a sticker payload of `guild_id`.
    pub fn from_payload(guild_id: Snowflake, data: &Value) -> Result<Self> {
        Ok(GuildSticker {
            id: snowflake(data, "id")?,
            guild_id,
            name: opt_string(data, "name").unwrap_or_default(),
            description: opt_string(data, "description"),
            format_type: super::opt_u64(data, "format_type").unwrap_or(1),
            available: data.get("available").and_then(Value::as_bool).unwrap_or(true),
        })
    }
}

/// A soundboard sound, guild-owned or a platform default.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundboardSound {
    /// Sound ID, `sound_id` on the wire
    pub id: Snowflake,
    /// Owning guild; `None` for platform defaults
    pub guild_id: Option<Snowflake>,
    /// Sound name
    pub name: String,
    /// Playback volume, 0 to 1
    pub volume: f64,
    /// Custom emoji shown with the sound
    pub emoji_id: Option<Snowflake>,
    /// Unicode emoji shown with the sound
    pub emoji_name: Option<String>,
    /// False when lost to a boost downgrade
    pub available: bool,
}

impl SoundboardSound {
    /// Build from a sound payload.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(SoundboardSound {
            id: snowflake(data, "sound_id")?,
            guild_id: opt_snowflake(data, "guild_id"),
            name: opt_string(data, "name").unwrap_or_default(),
            volume: data.get("volume").and_then(Value::as_f64).unwrap_or(1.0),
            emoji_id: opt_snowflake(data, "emoji_id"),
            emoji_name: opt_string(data, "emoji_name"),
            available: data.get("available").and_then(Value::as_bool).unwrap_or(true),
        })
    }
}
