use crate::model::{as_snowflake, Snowflake};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Description used for chat-input commands and options that declare none.
pub const DEFAULT_DESCRIPTION: &str = "No description provided.";

/// A locally declared command shared between the registry and its owner.
///
/// Identity is the allocation: two handles refer to the same command only
/// when `Arc::ptr_eq` holds.
pub type CommandHandle = Arc<RwLock<ApplicationCommand>>;

/// Wire command type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandType {
    /// Slash command
    ChatInput = 1,
    /// User context menu entry
    User = 2,
    /// Message context menu entry
    Message = 3,
}

impl CommandType {
    /// Parse a wire type code.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(CommandType::ChatInput),
            2 => Some(CommandType::User),
            3 => Some(CommandType::Message),
            _ => None,
        }
    }

    /// Wire type code.
    pub fn code(self) -> u64 {
        self as u64
    }
}

/// Wire option type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionType {
    /// Nested command
    SubCommand = 1,
    /// Group of nested commands
    SubCommandGroup = 2,
    /// Text input
    String = 3,
    /// Whole number input
    Integer = 4,
    /// True or false
    Boolean = 5,
    /// User mention
    User = 6,
    /// Channel mention
    Channel = 7,
    /// Role mention
    Role = 8,
    /// User or role mention
    Mentionable = 9,
    /// Floating point input
    Number = 10,
    /// Uploaded file
    Attachment = 11,
}

impl OptionType {
    /// Whether options of this type nest further options.
    pub fn is_sub_command(self) -> bool {
        matches!(self, OptionType::SubCommand | OptionType::SubCommandGroup)
    }
}

/// (name, type, guild) identity of a command in one scope. `None` is global.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandSignature {
    /// Command name
    pub name: String,
    /// Command type
    pub kind: CommandType,
    /// Guild scope; `None` is global
    pub guild_id: Option<Snowflake>,
}

impl CommandSignature {
    /// Signature of `name` in one scope.
    pub fn new(name: impl Into<String>, kind: CommandType, guild_id: Option<Snowflake>) -> Self {
        Self {
            name: name.into(),
            kind,
            guild_id,
        }
    }

    /// Signature of a remote listing entry. A missing `type` means chat input.
    pub fn from_remote(data: &Value) -> Option<Self> {
        let name = data.get("name")?.as_str()?;
        let kind = match data.get("type") {
            Some(code) => CommandType::from_code(as_snowflake(code)?)?,
            None => CommandType::ChatInput,
        };
        let guild_id = data.get("guild_id").and_then(as_snowflake).filter(|id| *id != 0);
        Some(Self::new(name, kind, guild_id))
    }
}

/// A fixed choice offered by an option.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandChoice {
    /// Shown to the user
    pub name: String,
    /// Sent back when picked
    pub value: Value,
    /// Localized names by locale
    pub name_localizations: BTreeMap<String, String>,
}

impl CommandChoice {
    /// A choice without localizations.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            name_localizations: BTreeMap::new(),
        }
    }

    fn payload(&self) -> Value {
        json!({
            "name": self.name,
            "value": self.value,
            "name_localizations": localizations(&self.name_localizations),
        })
    }
}

/// A command option, sub-command or sub-command group.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOption {
    /// Option type
    pub kind: OptionType,
    /// Option name
    pub name: String,
    /// Option description
    pub description: String,
    /// Localized names by locale
    pub name_localizations: BTreeMap<String, String>,
    /// Localized descriptions by locale
    pub description_localizations: BTreeMap<String, String>,
    /// Must be filled in
    pub required: bool,
    /// Fixed values to pick from
    pub choices: Vec<CommandChoice>,
    /// Channel type codes a channel option accepts
    pub channel_types: Vec<u64>,
    /// Lower bound of a numeric option
    pub min_value: Option<Value>,
    /// Upper bound of a numeric option
    pub max_value: Option<Value>,
    /// Minimum length of a text option
    pub min_length: Option<u64>,
    /// Maximum length of a text option
    pub max_length: Option<u64>,
    /// Values are suggested by the application
    pub autocomplete: bool,
    /// Children of a sub-command or group
    pub options: Vec<CommandOption>,
}

impl CommandOption {
    /// An optional option with nothing else set.
    pub fn new(kind: OptionType, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            name_localizations: BTreeMap::new(),
            description_localizations: BTreeMap::new(),
            required: false,
            choices: Vec::new(),
            channel_types: Vec::new(),
            min_value: None,
            max_value: None,
            min_length: None,
            max_length: None,
            autocomplete: false,
            options: Vec::new(),
        }
    }

    /// Make the option mandatory.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Add a localized name.
    pub fn name_localization(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.name_localizations.insert(locale.into(), name.into());
        self
    }

    /// Offer a fixed choice.
    pub fn choice(mut self, choice: CommandChoice) -> Self {
        self.choices.push(choice);
        self
    }

    /// Nest an option under a sub-command or group.
    pub fn option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    /// Restrict a channel option to these type codes.
    pub fn channel_types(mut self, types: impl IntoIterator<Item = u64>) -> Self {
        self.channel_types = types.into_iter().collect();
        self
    }

    /// Lower bound of a numeric option.
    pub fn min_value(mut self, value: impl Into<Value>) -> Self {
        self.min_value = Some(value.into());
        self
    }

    /// Upper bound of a numeric option.
    pub fn max_value(mut self, value: impl Into<Value>) -> Self {
        self.max_value = Some(value.into());
        self
    }

    /// Child sub-commands and groups, if any.
    pub fn children(&self) -> impl Iterator<Item = &CommandOption> {
        self.options.iter().filter(|o| o.kind.is_sub_command())
    }

    /// Wire form. Unset optional fields are omitted.
    pub fn payload(&self) -> Value {
        let mut ret = Map::new();
        ret.insert("type".into(), json!(self.kind as u64));
        ret.insert("name".into(), json!(self.name));
        ret.insert("description".into(), json!(self.description));
        ret.insert("name_localizations".into(), localizations(&self.name_localizations));
        ret.insert(
            "description_localizations".into(),
            localizations(&self.description_localizations),
        );
        // false is never sent
        if self.required {
            ret.insert("required".into(), json!(true));
        }
        if !self.choices.is_empty() {
            let choices = self.choices.iter().map(CommandChoice::payload).collect();
            ret.insert("choices".into(), Value::Array(choices));
        }
        if !self.channel_types.is_empty() {
            // the platform returns these sorted
            let mut types = self.channel_types.clone();
            types.sort_unstable();
            ret.insert("channel_types".into(), json!(types));
        }
        if let Some(min) = &self.min_value {
            ret.insert("min_value".into(), min.clone());
        }
        if let Some(max) = &self.max_value {
            ret.insert("max_value".into(), max.clone());
        }
        if let Some(min) = self.min_length {
            ret.insert("min_length".into(), json!(min));
        }
        if let Some(max) = self.max_length {
            ret.insert("max_length".into(), json!(max));
        }
        if self.autocomplete {
            ret.insert("autocomplete".into(), json!(true));
        }
        if !self.options.is_empty() {
            let options = self.options.iter().map(CommandOption::payload).collect();
            ret.insert("options".into(), Value::Array(options));
        }
        Value::Object(ret)
    }
}

fn localizations(map: &BTreeMap<String, String>) -> Value {
    if map.is_empty() {
        Value::Null
    } else {
        json!(map)
    }
}

/// A locally declared application command.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationCommand {
    /// Command name
    pub name: String,
    /// Command type
    pub kind: CommandType,
    /// Falls back to [`DEFAULT_DESCRIPTION`] for chat-input commands
    pub description: Option<String>,
    /// Top-level options and sub-commands
    pub options: Vec<CommandOption>,
    /// Localized names by locale
    pub name_localizations: BTreeMap<String, String>,
    /// Localized descriptions by locale
    pub description_localizations: BTreeMap<String, String>,
    /// Permission bits required by default
    pub default_member_permissions: Option<u64>,
    /// `None` sends the platform default (allowed)
    pub dm_permission: Option<bool>,
    /// Age-restricted
    pub nsfw: bool,
    /// Register globally even when guilds are targeted
    pub force_global: bool,
    /// Guilds this command should be rolled out to
    pub guild_ids_to_rollout: BTreeSet<Snowflake>,
    /// Remote IDs by scope; `None` is the global registration
    pub command_ids: HashMap<Option<Snowflake>, Snowflake>,
}

impl ApplicationCommand {
    /// A command with no options, targeting no guild.
    pub fn new(kind: CommandType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            options: Vec::new(),
            name_localizations: BTreeMap::new(),
            description_localizations: BTreeMap::new(),
            default_member_permissions: None,
            dm_permission: None,
            nsfw: false,
            force_global: false,
            guild_ids_to_rollout: BTreeSet::new(),
            command_ids: HashMap::new(),
        }
    }

    /// A chat-input command.
    pub fn slash(name: impl Into<String>) -> Self {
        Self::new(CommandType::ChatInput, name)
    }

    /// A user context menu command.
    pub fn user(name: impl Into<String>) -> Self {
        Self::new(CommandType::User, name)
    }

    /// A message context menu command.
    pub fn message(name: impl Into<String>) -> Self {
        Self::new(CommandType::Message, name)
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a top-level option or sub-command.
    pub fn option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    /// Target a guild for rollout.
    pub fn guild(mut self, guild_id: Snowflake) -> Self {
        self.guild_ids_to_rollout.insert(guild_id);
        self
    }

    /// Register globally even when guilds are targeted.
    pub fn force_global(mut self, force: bool) -> Self {
        self.force_global = force;
        self
    }

    /// Require these permission bits by default.
    pub fn default_member_permissions(mut self, permissions: u64) -> Self {
        self.default_member_permissions = Some(permissions);
        self
    }

    /// Allow or forbid use in DMs.
    pub fn dm_permission(mut self, allowed: bool) -> Self {
        self.dm_permission = Some(allowed);
        self
    }

    /// Mark age-restricted.
    pub fn nsfw(mut self, nsfw: bool) -> Self {
        self.nsfw = nsfw;
        self
    }

    /// Add a localized name.
    pub fn name_localization(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.name_localizations.insert(locale.into(), name.into());
        self
    }

    /// Wrap into a shared handle.
    pub fn into_handle(self) -> CommandHandle {
        Arc::new(RwLock::new(self))
    }

    /// Guilds this command is registered in.
    pub fn guild_ids(&self) -> BTreeSet<Snowflake> {
        self.command_ids.keys().flatten().copied().collect()
    }

    /// Whether the command is or should be registered to any guild.
    pub fn is_guild(&self) -> bool {
        !self.guild_ids_to_rollout.is_empty() || self.command_ids.keys().any(Option::is_some)
    }

    /// Whether the command is or should be registered globally.
    pub fn is_global(&self) -> bool {
        self.force_global || !self.is_guild() || self.command_ids.contains_key(&None)
    }

    /// Signature of this command in one scope.
    pub fn signature(&self, guild_id: Option<Snowflake>) -> CommandSignature {
        CommandSignature::new(self.name.clone(), self.kind, guild_id)
    }

    /// Signatures of the scopes this command is registered in.
    pub fn signatures(&self) -> BTreeSet<CommandSignature> {
        let mut ret = BTreeSet::new();
        if self.is_global() {
            ret.insert(self.signature(None));
        }
        for guild_id in self.guild_ids() {
            ret.insert(self.signature(Some(guild_id)));
        }
        ret
    }

    /// Signatures of every scope this command wants to be in.
    pub fn rollout_signatures(&self) -> BTreeSet<CommandSignature> {
        let mut ret = BTreeSet::new();
        if self.is_global() {
            ret.insert(self.signature(None));
        }
        for guild_id in &self.guild_ids_to_rollout {
            ret.insert(self.signature(Some(*guild_id)));
        }
        ret
    }

    /// The description actually sent.
    pub fn effective_description(&self) -> &str {
        match (&self.description, self.kind) {
            (Some(d), _) if !d.is_empty() => d,
            (_, CommandType::ChatInput) => DEFAULT_DESCRIPTION,
            _ => "",
        }
    }

    /// The payload to upsert into the given scope.
    pub fn payload(&self, guild_id: Option<Snowflake>) -> Value {
        let mut ret = Map::new();
        ret.insert("type".into(), json!(self.kind.code()));
        ret.insert("name".into(), json!(self.name));
        ret.insert("description".into(), json!(self.effective_description()));
        ret.insert("name_localizations".into(), localizations(&self.name_localizations));
        ret.insert(
            "description_localizations".into(),
            localizations(&self.description_localizations),
        );
        // the platform echoes permissions back as a string
        if let Some(permissions) = self.default_member_permissions {
            ret.insert("default_member_permissions".into(), json!(permissions.to_string()));
        }
        match guild_id {
            Some(guild_id) => {
                ret.insert("guild_id".into(), json!(guild_id.to_string()));
            }
            None => {
                ret.insert("dm_permission".into(), json!(self.dm_permission.unwrap_or(true)));
            }
        }
        ret.insert("nsfw".into(), json!(self.nsfw));
        if !self.options.is_empty() {
            let options = self.options.iter().map(CommandOption::payload).collect();
            ret.insert("options".into(), Value::Array(options));
        }
        Value::Object(ret)
    }

    /// Bind the remote ID from an upsert response or a matching listing entry.
    ///
    /// A guild-scoped response also marks the guild for rollout.
    pub fn parse_response(&mut self, data: &Value) -> crate::error::Result<Snowflake> {
        let id = crate::model::snowflake(data, "id")?;
        match data.get("guild_id").and_then(as_snowflake).filter(|g| *g != 0) {
            Some(guild_id) => {
                self.command_ids.insert(Some(guild_id), id);
                self.guild_ids_to_rollout.insert(guild_id);
            }
            None => {
                self.command_ids.insert(None, id);
            }
        }
        Ok(id)
    }

    /// Find a sub-command node by its path below the root.
    pub fn find_option(&self, path: &[String]) -> Option<&CommandOption> {
        let (first, rest) = path.split_first()?;
        let mut node = self.options.iter().find(|o| &o.name == first)?;
        for name in rest {
            node = node.options.iter().find(|o| &o.name == name)?;
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_payload_defaults() {
        let cmd = ApplicationCommand::slash("ping");
        let payload = cmd.payload(None);
        assert_eq!(payload["type"], 1);
        assert_eq!(payload["description"], DEFAULT_DESCRIPTION);
        assert_eq!(payload["dm_permission"], true);
        assert_eq!(payload["nsfw"], false);
        assert!(payload["name_localizations"].is_null());
        assert!(payload.get("guild_id").is_none());
        assert!(payload.get("options").is_none());
    }

    #[test]
    fn test_guild_payload() {
        let cmd = ApplicationCommand::user("inspect").default_member_permissions(8);
        let payload = cmd.payload(Some(42));
        assert_eq!(payload["guild_id"], "42");
        assert_eq!(payload["description"], "");
        assert_eq!(payload["default_member_permissions"], "8");
        assert!(payload.get("dm_permission").is_none());
    }

    #[test]
    fn test_scope_flags() {
        let mut cmd = ApplicationCommand::slash("a");
        assert!(cmd.is_global());
        assert!(!cmd.is_guild());

        cmd = cmd.guild(5);
        assert!(!cmd.is_global());
        assert!(cmd.signatures().is_empty());
        assert_eq!(cmd.rollout_signatures().len(), 1);

        cmd.parse_response(&serde_json::json!({"id": "9", "guild_id": "5"})).unwrap();
        assert_eq!(cmd.guild_ids(), BTreeSet::from([5]));
        assert_eq!(
            cmd.signatures().into_iter().next(),
            Some(CommandSignature::new("a", CommandType::ChatInput, Some(5)))
        );

        cmd = cmd.force_global(true);
        assert!(cmd.is_global());
        assert_eq!(cmd.rollout_signatures().len(), 2);
    }

    #[test]
    fn test_option_payload_omits_defaults() {
        let opt = CommandOption::new(OptionType::Channel, "where", "target")
            .channel_types([5, 0]);
        let payload = opt.payload();
        assert!(payload.get("required").is_none());
        assert!(payload.get("choices").is_none());
        assert_eq!(payload["channel_types"], serde_json::json!([0, 5]));
    }

    #[test]
    fn test_remote_signature_defaults_to_chat_input() {
        let sig = CommandSignature::from_remote(&serde_json::json!({"name": "x", "guild_id": null}))
            .unwrap();
        assert_eq!(sig, CommandSignature::new("x", CommandType::ChatInput, None));
    }
}
