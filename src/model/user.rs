use super::{opt_string, snowflake, string, Snowflake};
use crate::error::Result;
use serde_json::Value;

/// A platform user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// User ID
    pub id: Snowflake,
    /// Username
    pub name: String,
    /// Legacy four-digit tag; `"0"` for migrated users
    pub discriminator: String,
    /// Display name
    pub global_name: Option<String>,
    /// Avatar hash
    pub avatar: Option<String>,
    /// Bot account
    pub bot: bool,
}

impl User {
    /// Build from a user payload; `username` is required.
    pub fn from_payload(data: &Value) -> Result<Self> {
        Ok(User {
            id: snowflake(data, "id")?,
            name: string(data, "username")?,
            discriminator: opt_string(data, "discriminator").unwrap_or_else(|| "0".into()),
            global_name: opt_string(data, "global_name"),
            avatar: opt_string(data, "avatar"),
            bot: super::flag(data, "bot"),
        })
    }

    /// Webhook pseudo-users are never cached.
    pub fn is_webhook(&self) -> bool {
        self.discriminator == "0000"
    }

    /// Apply the fields present in `data`.
    pub(crate) fn update(&mut self, data: &Value) {
        if let Some(name) = opt_string(data, "username") {
            self.name = name;
        }
        if let Some(discriminator) = opt_string(data, "discriminator") {
            self.discriminator = discriminator;
        }
        if data.get("global_name").is_some() {
            self.global_name = opt_string(data, "global_name");
        }
        if data.get("avatar").is_some() {
            self.avatar = opt_string(data, "avatar");
        }
    }
}
