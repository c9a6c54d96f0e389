//! REST seam for application command reconciliation.
//!
//! The reconciliation engine only needs six endpoints, captured by the
//! [`CommandHttp`] trait. [`RestClient`] implements it over `reqwest`; tests
//! substitute an in-memory recorder.
//!
//! # Module Organization
//!
//! ```text
//! http/
//! ├── rest  - RestClient and RestConfig
//! └── utils - status classification and backoff
//! ```

mod rest;
mod utils;

pub use rest::{RestClient, RestConfig};
pub use utils::{exponential_backoff, is_access_denied_status, is_retryable_status};

use crate::error::Result;
use crate::model::Snowflake;
use async_trait::async_trait;
use serde_json::Value;

/// Command endpoints of one application.
///
/// Implementations are bound to an application ID. Permission denials map to
/// [`StateError::Forbidden`](crate::StateError::Forbidden), missing resources
/// to [`StateError::NotFound`](crate::StateError::NotFound).
#[async_trait]
pub trait CommandHttp: Send + Sync {
    /// Every global command of the application.
    async fn get_global_commands(&self) -> Result<Vec<Value>>;

    /// Every command of the application scoped to `guild_id`.
    async fn get_guild_commands(&self, guild_id: Snowflake) -> Result<Vec<Value>>;

    /// Create or replace a global command; returns the stored command.
    async fn upsert_global_command(&self, payload: &Value) -> Result<Value>;

    /// Create or replace a guild command; returns the stored command.
    async fn upsert_guild_command(&self, guild_id: Snowflake, payload: &Value) -> Result<Value>;

    /// Delete a global command.
    async fn delete_global_command(&self, command_id: Snowflake) -> Result<()>;

    /// Delete a command scoped to `guild_id`.
    async fn delete_guild_command(&self, guild_id: Snowflake, command_id: Snowflake) -> Result<()>;
}
