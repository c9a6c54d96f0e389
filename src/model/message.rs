use super::{array, flag, object, opt_snowflake, opt_string, opt_u64, snowflake, Emoji, PartialEmoji, Snowflake, User};
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// The emoji a reaction was made with.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionEmoji {
    /// A custom emoji found in the cache.
    Custom(Arc<Emoji>),
    /// A custom emoji the cache does not know.
    Partial(PartialEmoji),
    /// A unicode emoji.
    Unicode(String),
}

impl ReactionEmoji {
    /// Whether both refer to the same emoji. Custom emojis compare by ID, unicode by text.
    pub fn same_as(&self, other: &ReactionEmoji) -> bool {
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name() == other.name(),
            _ => false,
        }
    }

    /// Custom emoji ID; `None` for unicode.
    pub fn id(&self) -> Option<Snowflake> {
        match self {
            ReactionEmoji::Custom(emoji) => Some(emoji.id),
            ReactionEmoji::Partial(emoji) => emoji.id,
            ReactionEmoji::Unicode(_) => None,
        }
    }

    /// Emoji name or unicode text.
    pub fn name(&self) -> Option<&str> {
        match self {
            ReactionEmoji::Custom(emoji) => Some(&emoji.name),
            ReactionEmoji::Partial(emoji) => emoji.name.as_deref(),
            ReactionEmoji::Unicode(name) => Some(name),
        }
    }
}

/// A reaction on a cached message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    /// Reacted emoji
    pub emoji: ReactionEmoji,
    /// Number of users who reacted
    pub count: u64,
    /// Whether the client user reacted
    pub me: bool,
}

/// A cached message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message ID
    pub id: Snowflake,
    /// Channel it was sent in
    pub channel_id: Snowflake,
    /// Guild of the channel, if any
    pub guild_id: Option<Snowflake>,
    /// Sender
    pub author: User,
    /// Text content
    pub content: String,
    /// Message type code
    pub kind: u64,
    /// Message flags
    pub flags: u64,
    /// Pinned in its channel
    pub pinned: bool,
    /// Mentions `@everyone`
    pub mention_everyone: bool,
    /// Last edit, if edited
    pub edited_timestamp: Option<String>,
    /// Set when sent by a webhook
    pub webhook_id: Option<Snowflake>,
    /// Reactions in arrival order
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Build a message. Reactions in the payload are read as partial or unicode emojis.
    pub fn from_payload(data: &Value) -> Result<Self> {
        let reactions = array(data, "reactions")
            .iter()
            .filter_map(|r| {
                let emoji = ReactionEmoji::from_partial(PartialEmoji::from_payload(r.get("emoji")?));
                Some(Reaction {
                    emoji,
                    count: opt_u64(r, "count").unwrap_or(1),
                    me: flag(r, "me"),
                })
            })
            .collect();
        Ok(Message {
            id: snowflake(data, "id")?,
            channel_id: snowflake(data, "channel_id")?,
            guild_id: opt_snowflake(data, "guild_id"),
            author: User::from_payload(object(data, "author")?)?,
            content: opt_string(data, "content").unwrap_or_default(),
            kind: opt_u64(data, "type").unwrap_or(0),
            flags: opt_u64(data, "flags").unwrap_or(0),
            pinned: flag(data, "pinned"),
            mention_everyone: flag(data, "mention_everyone"),
            edited_timestamp: opt_string(data, "edited_timestamp"),
            webhook_id: opt_snowflake(data, "webhook_id"),
            reactions,
        })
    }

    /// Apply the fields present in a message-update payload.
    pub(crate) fn update(&mut self, data: &Value) {
        if let Some(content) = opt_string(data, "content") {
            self.content = content;
        }
        if let Some(pinned) = data.get("pinned").and_then(Value::as_bool) {
            self.pinned = pinned;
        }
        if let Some(flags) = opt_u64(data, "flags") {
            self.flags = flags;
        }
        if let Some(everyone) = data.get("mention_everyone").and_then(Value::as_bool) {
            self.mention_everyone = everyone;
        }
        if data.get("edited_timestamp").is_some() {
            self.edited_timestamp = opt_string(data, "edited_timestamp");
        }
        if let Some(author) = data.get("author") {
            self.author.update(author);
        }
    }

    /// Record a reaction, returning the reaction after the change.
    pub(crate) fn add_reaction(&mut self, emoji: ReactionEmoji, is_me: bool) -> Reaction {
        match self.reactions.iter_mut().find(|r| r.emoji.same_as(&emoji)) {
            Some(reaction) => {
                reaction.count += 1;
                reaction.me |= is_me;
                reaction.clone()
            }
            None => {
                let reaction = Reaction {
                    emoji,
                    count: 1,
                    me: is_me,
                };
                self.reactions.push(reaction.clone());
                reaction
            }
        }
    }

    /// Remove one reaction. Returns `None` when the message has no such reaction.
    pub(crate) fn remove_reaction(&mut self, emoji: &ReactionEmoji, is_me: bool) -> Option<Reaction> {
        let index = self.reactions.iter().position(|r| r.emoji.same_as(emoji))?;
        let reaction = &mut self.reactions[index];
        reaction.count = reaction.count.saturating_sub(1);
        if is_me {
            reaction.me = false;
        }
        if reaction.count == 0 {
            Some(self.reactions.remove(index))
        } else {
            Some(reaction.clone())
        }
    }

    /// Drop every reaction made with `emoji`.
    pub(crate) fn clear_emoji(&mut self, emoji: &ReactionEmoji) -> Option<Reaction> {
        let index = self.reactions.iter().position(|r| r.emoji.same_as(emoji))?;
        Some(self.reactions.remove(index))
    }
}

impl ReactionEmoji {
    pub(crate) fn from_partial(emoji: PartialEmoji) -> Self {
        match (emoji.id, emoji.name.clone()) {
            (None, Some(name)) => ReactionEmoji::Unicode(name),
            _ => ReactionEmoji::Partial(emoji),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message() -> Message {
        Message::from_payload(&json!({
            "id": "1",
            "channel_id": "2",
            "author": {"id": "3", "username": "author"},
            "content": "hi"
        }))
        .unwrap()
    }

    #[test]
    fn test_reaction_counts() {
        let mut msg = message();
        let thumbs = ReactionEmoji::Unicode("👍".into());
        msg.add_reaction(thumbs.clone(), false);
        let reaction = msg.add_reaction(thumbs.clone(), true);
        assert_eq!(reaction.count, 2);
        assert!(reaction.me);

        let reaction = msg.remove_reaction(&thumbs, true).unwrap();
        assert_eq!(reaction.count, 1);
        assert!(!reaction.me);
        msg.remove_reaction(&thumbs, false).unwrap();
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn test_remove_missing_reaction_is_none() {
        let mut msg = message();
        assert!(msg
            .remove_reaction(&ReactionEmoji::Unicode("x".into()), false)
            .is_none());
    }

    #[test]
    fn test_custom_matches_partial_by_id() {
        let partial = ReactionEmoji::Partial(PartialEmoji {
            id: Some(9),
            name: Some("old".into()),
            animated: false,
        });
        let custom = ReactionEmoji::Custom(Arc::new(
            Emoji::from_payload(1, &json!({"id": "9", "name": "new"})).unwrap(),
        ));
        assert!(partial.same_as(&custom));
    }
}
