//! Outbound gateway seam.
//!
//! The state engine never owns the socket; it only needs to ask the gateway
//! to stream a guild's members. Implement [`Gateway`] over whatever
//! connection the client holds.

use crate::error::Result;
use crate::model::Snowflake;
use async_trait::async_trait;

/// A request-guild-members command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkQuery {
    /// Username prefix; empty with `limit = 0` requests every member
    pub query: Option<String>,
    /// Maximum members to return; 0 means no limit
    pub limit: u32,
    /// Specific users to fetch instead of a query
    pub user_ids: Vec<Snowflake>,
    /// Include presences in the chunks
    pub presences: bool,
    /// Echoed back on every chunk
    pub nonce: String,
}

impl ChunkQuery {
    /// Every member of the guild.
    pub fn all(nonce: impl Into<String>, presences: bool) -> Self {
        Self {
            query: Some(String::new()),
            limit: 0,
            user_ids: Vec::new(),
            presences,
            nonce: nonce.into(),
        }
    }
}

/// Outbound half of the gateway connection.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Ask the platform to stream members of `guild_id` as chunk events.
    async fn request_chunks(&self, guild_id: Snowflake, query: ChunkQuery) -> Result<()>;
}

/// A gateway that drops every request.
///
/// Useful for replaying recorded sessions where chunks already arrive in the
/// recording.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGateway;

#[async_trait]
impl Gateway for NullGateway {
    async fn request_chunks(&self, guild_id: Snowflake, _query: ChunkQuery) -> Result<()> {
        tracing::trace!(guild_id, "Dropping chunk request");
        Ok(())
    }
}
