use super::{flag, object, opt_string, snowflakes, Snowflake, User};
use crate::error::Result;
use serde_json::Value;

/// A guild member.
///
/// `guild_id` is a non-owning back-reference; resolve the guild through the
/// cache when needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// The member's user
    pub user: User,
    /// Guild of the membership
    pub guild_id: Snowflake,
    /// Guild nickname
    pub nick: Option<String>,
    /// Role IDs
    pub roles: Vec<Snowflake>,
    /// Join timestamp
    pub joined_at: Option<String>,
    /// Boosting since
    pub premium_since: Option<String>,
    /// Has not passed membership screening
    pub pending: bool,
    /// Presence status, once a presence update arrived
    pub status: Option<String>,
    /// Presence activities as received
    pub activities: Vec<Value>,
}

impl Member {
    /// Build from a member payload of `guild_id`.
    pub fn from_payload(guild_id: Snowflake, data: &Value) -> Result<Self> {
        let user = User::from_payload(object(data, "user")?)?;
        Ok(Member {
            user,
            guild_id,
            nick: opt_string(data, "nick"),
            roles: snowflakes(data, "roles"),
            joined_at: opt_string(data, "joined_at"),
            premium_since: opt_string(data, "premium_since"),
            pending: flag(data, "pending"),
            status: None,
            activities: Vec::new(),
        })
    }

    /// ID of the member's user.
    pub fn id(&self) -> Snowflake {
        self.user.id
    }

    /// Apply a member update payload.
    pub(crate) fn update(&mut self, data: &Value) {
        if data.get("nick").is_some() {
            self.nick = opt_string(data, "nick");
        }
        if data.get("roles").is_some() {
            self.roles = snowflakes(data, "roles");
        }
        if data.get("premium_since").is_some() {
            self.premium_since = opt_string(data, "premium_since");
        }
        if let Some(joined_at) = opt_string(data, "joined_at") {
            self.joined_at = Some(joined_at);
        }
        self.pending = flag(data, "pending");
    }

    /// Refresh the embedded user, returning `(before, after)` if anything changed.
    pub(crate) fn update_inner_user(&mut self, data: &Value) -> Option<(User, User)> {
        let before = self.user.clone();
        self.user.update(data);
        if before != self.user {
            Some((before, self.user.clone()))
        } else {
            None
        }
    }

    /// Apply a presence payload, returning a user change if the embedded user changed.
    pub(crate) fn presence_update(&mut self, data: &Value, user: &Value) -> Option<(User, User)> {
        self.status = opt_string(data, "status");
        self.activities = super::array(data, "activities").to_vec();
        self.update_inner_user(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_inner_user_reports_change() {
        let mut member = Member::from_payload(
            1,
            &json!({"user": {"id": "5", "username": "old"}, "roles": ["2"]}),
        )
        .unwrap();
        assert_eq!(member.roles, vec![2]);
        assert!(member.update_inner_user(&json!({"username": "old"})).is_none());

        let (before, after) = member.update_inner_user(&json!({"username": "new"})).unwrap();
        assert_eq!(before.name, "old");
        assert_eq!(after.name, "new");
    }
}
