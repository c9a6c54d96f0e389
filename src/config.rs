//! Connection-state configuration.
//!
//! # Examples
//!
//! ```
//! use chord_state::config::{Intents, StateConfig};
//! use std::time::Duration;
//!
//! let config = StateConfig {
//!     intents: Intents::default() | Intents::GUILD_MEMBERS,
//!     guild_ready_timeout: Duration::from_millis(500),
//!     ..Default::default()
//! };
//! assert!(config.chunk_guilds());
//! ```

use crate::error::{Result, StateError};
use crate::model::Snowflake;
use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use std::time::Duration;

/// Gateway intent bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intents(pub u64);

impl Intents {
    /// Guild lifecycle, channels, roles, threads
    pub const GUILDS: Intents = Intents(1 << 0);
    /// Member add/update/remove (privileged)
    pub const GUILD_MEMBERS: Intents = Intents(1 << 1);
    /// Bans
    pub const GUILD_MODERATION: Intents = Intents(1 << 2);
    /// Emojis, stickers, soundboard sounds
    pub const GUILD_EXPRESSIONS: Intents = Intents(1 << 3);
    /// Integrations
    pub const GUILD_INTEGRATIONS: Intents = Intents(1 << 4);
    /// Webhooks
    pub const GUILD_WEBHOOKS: Intents = Intents(1 << 5);
    /// Invites
    pub const GUILD_INVITES: Intents = Intents(1 << 6);
    /// Voice states
    pub const GUILD_VOICE_STATES: Intents = Intents(1 << 7);
    /// Presences (privileged)
    pub const GUILD_PRESENCES: Intents = Intents(1 << 8);
    /// Guild messages
    pub const GUILD_MESSAGES: Intents = Intents(1 << 9);
    /// Guild message reactions
    pub const GUILD_MESSAGE_REACTIONS: Intents = Intents(1 << 10);
    /// Guild typing
    pub const GUILD_MESSAGE_TYPING: Intents = Intents(1 << 11);
    /// Direct messages
    pub const DIRECT_MESSAGES: Intents = Intents(1 << 12);
    /// Direct message reactions
    pub const DIRECT_MESSAGE_REACTIONS: Intents = Intents(1 << 13);
    /// Direct message typing
    pub const DIRECT_MESSAGE_TYPING: Intents = Intents(1 << 14);
    /// Message content (privileged)
    pub const MESSAGE_CONTENT: Intents = Intents(1 << 15);
    /// Scheduled events
    pub const GUILD_SCHEDULED_EVENTS: Intents = Intents(1 << 16);

    const PRIVILEGED: u64 = (1 << 1) | (1 << 8) | (1 << 15);
    const ALL: u64 = (1 << 17) - 1;

    /// No intents.
    pub const fn none() -> Self {
        Intents(0)
    }

    /// Every known intent, privileged ones included.
    pub const fn all() -> Self {
        Intents(Self::ALL)
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: Intents) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the guilds intent is enabled.
    pub const fn guilds(self) -> bool {
        self.contains(Self::GUILDS)
    }

    /// Whether the members intent is enabled.
    pub const fn members(self) -> bool {
        self.contains(Self::GUILD_MEMBERS)
    }

    /// Whether the presences intent is enabled.
    pub const fn presences(self) -> bool {
        self.contains(Self::GUILD_PRESENCES)
    }

    /// Whether the voice states intent is enabled.
    pub const fn voice_states(self) -> bool {
        self.contains(Self::GUILD_VOICE_STATES)
    }
}

impl Default for Intents {
    /// Every non-privileged intent.
    fn default() -> Self {
        Intents(Self::ALL & !Self::PRIVILEGED)
    }
}

impl BitOr for Intents {
    type Output = Intents;

    fn bitor(self, rhs: Intents) -> Intents {
        Intents(self.0 | rhs.0)
    }
}

/// Which members are kept in guild member collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCacheFlags {
    /// Cache members that join or are chunked
    pub joined: bool,
    /// Cache members seen in voice
    pub voice: bool,
}

impl MemberCacheFlags {
    /// Derive the flags the given intents can support.
    pub fn from_intents(intents: Intents) -> Self {
        MemberCacheFlags {
            joined: intents.members(),
            voice: intents.voice_states(),
        }
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        !self.joined && !self.voice
    }

    fn verify(&self, intents: Intents) -> Result<()> {
        if self.joined && !intents.members() {
            return Err(StateError::Config(
                "MemberCacheFlags.joined requires the GUILD_MEMBERS intent".into(),
            ));
        }
        if self.voice && !intents.voice_states() {
            return Err(StateError::Config(
                "MemberCacheFlags.voice requires the GUILD_VOICE_STATES intent".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`ConnectionState`](crate::ConnectionState).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Capacity of the recent-message ring; `None` disables message caching
    #[serde(default = "default_max_messages")]
    pub max_messages: Option<usize>,

    /// Application ID, if known before the session starts
    #[serde(default)]
    pub application_id: Option<Snowflake>,

    /// Grace period between guild-create events during startup
    #[serde(default = "default_guild_ready_timeout", with = "duration_ms")]
    pub guild_ready_timeout: Duration,

    /// How long `query_members` waits for its chunks
    #[serde(default = "default_chunk_timeout", with = "duration_ms")]
    pub chunk_timeout: Duration,

    /// How long the startup sequencer waits for each guild's chunks
    #[serde(default = "default_startup_chunk_timeout", with = "duration_ms")]
    pub startup_chunk_timeout: Duration,

    /// How long a late guild-create waits for chunks before announcing the guild
    #[serde(default = "default_late_chunk_timeout", with = "duration_ms")]
    pub late_chunk_timeout: Duration,

    /// Gateway intents the session was identified with
    #[serde(default)]
    pub intents: Intents,

    /// Chunk guilds during startup; defaults to whether the members intent is on
    #[serde(default)]
    pub chunk_guilds_at_startup: Option<bool>,

    /// Member cache policy; defaults to what the intents allow
    #[serde(default)]
    pub member_cache_flags: Option<MemberCacheFlags>,

    /// Capacity of the private channel LRU
    #[serde(default = "default_private_channel_capacity")]
    pub private_channel_capacity: usize,
}

fn default_max_messages() -> Option<usize> {
    Some(1000)
}

fn default_guild_ready_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_chunk_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_startup_chunk_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_late_chunk_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_private_channel_capacity() -> usize {
    128
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

impl StateConfig {
    /// Whether guilds are chunked at startup.
    pub fn chunk_guilds(&self) -> bool {
        self.chunk_guilds_at_startup.unwrap_or_else(|| self.intents.members())
    }

    /// Effective member cache flags.
    pub fn member_cache_flags(&self) -> MemberCacheFlags {
        self.member_cache_flags
            .unwrap_or_else(|| MemberCacheFlags::from_intents(self.intents))
    }

    /// Effective message ring capacity. A zero capacity falls back to the default.
    pub fn message_capacity(&self) -> Option<usize> {
        match self.max_messages {
            Some(0) => default_max_messages(),
            other => other,
        }
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_guilds() && !self.intents.members() {
            return Err(StateError::Config(
                "the GUILD_MEMBERS intent must be enabled to chunk guilds at startup".into(),
            ));
        }
        if self.private_channel_capacity == 0 {
            return Err(StateError::Config(
                "private_channel_capacity must be at least 1".into(),
            ));
        }
        if let Some(flags) = self.member_cache_flags {
            flags.verify(self.intents)?;
        }
        if !self.intents.guilds() {
            tracing::warn!("Guilds intent seems to be disabled. This may cause state related issues.");
        }
        Ok(())
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            application_id: None,
            guild_ready_timeout: default_guild_ready_timeout(),
            chunk_timeout: default_chunk_timeout(),
            startup_chunk_timeout: default_startup_chunk_timeout(),
            late_chunk_timeout: default_late_chunk_timeout(),
            intents: Intents::default(),
            chunk_guilds_at_startup: None,
            member_cache_flags: None,
            private_channel_capacity: default_private_channel_capacity(),
        }
    }
}
