//! Application command registry and reconciliation.
//!
//! The [`CommandRegistry`] indexes locally declared commands two ways: by
//! signature (name, type, scope) and by remote command ID. Both indexes are
//! unique: a signature or ID belongs to exactly one command.
//!
//! [`sync`] diffs the registry against the platform's remote listing and
//! issues the upsert and delete calls needed to converge.
//!
//! # Examples
//!
//! ```
//! use chord_state::commands::{AddOptions, ApplicationCommand, CommandRegistry, CommandType};
//!
//! let mut registry = CommandRegistry::new();
//! let ping = ApplicationCommand::slash("ping").into_handle();
//! registry.add(&ping, AddOptions::default()).unwrap();
//!
//! let found = registry.get_from_signature(CommandType::ChatInput, "ping", None).unwrap();
//! assert!(std::sync::Arc::ptr_eq(&found.command, &ping));
//! ```

mod command;
pub mod payload;
pub mod sync;

pub use command::{
    ApplicationCommand, CommandChoice, CommandHandle, CommandOption, CommandSignature,
    CommandType, OptionType, DEFAULT_DESCRIPTION,
};
pub use sync::{CommandSync, SyncOptions};

use crate::error::{DuplicateKind, Result, StateError};
use crate::model::Snowflake;
use std::collections::HashMap;
use std::sync::Arc;

/// Options for [`CommandRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOptions {
    /// Let this command take over signatures and IDs owned by another
    pub overwrite: bool,
    /// Register rollout signatures instead of registered ones
    pub use_rollout: bool,
    /// Drop this command's existing entries first
    pub pre_remove: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            use_rollout: false,
            pre_remove: true,
        }
    }
}

impl AddOptions {
    /// Defaults, indexing rollout signatures.
    pub fn rollout() -> Self {
        Self {
            use_rollout: true,
            ..Self::default()
        }
    }
}

/// A command resolved from a signature, possibly down to a sub-command.
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    /// The top-level command
    pub command: CommandHandle,
    /// Sub-command names below the top level; empty for the command itself
    pub path: Vec<String>,
}

impl ResolvedCommand {
    /// Whether the lookup descended into a sub-command.
    pub fn is_sub_command(&self) -> bool {
        !self.path.is_empty()
    }
}

/// Signature and ID indexes over shared command handles.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    signatures: HashMap<CommandSignature, CommandHandle>,
    ids: HashMap<Snowflake, CommandHandle>,
    commands: Vec<CommandHandle>,
}

impl CommandRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh a command.
    ///
    /// Every signature and remote ID is checked before anything is inserted,
    /// so a failed add leaves the registry as it was.
    ///
    /// # Errors
    ///
    /// [`StateError::DuplicateCommand`] when, without `overwrite`, a different
    /// command already owns one of the signatures or IDs.
    pub fn add(&mut self, command: &CommandHandle, options: AddOptions) -> Result<()> {
        let (name, signatures, ids) = {
            let cmd = command.read();
            let signatures = if options.use_rollout {
                cmd.rollout_signatures()
            } else {
                cmd.signatures()
            };
            let ids: Vec<Snowflake> = cmd.command_ids.values().copied().collect();
            (cmd.name.clone(), signatures, ids)
        };

        if !options.overwrite {
            let foreign = |owner: Option<&CommandHandle>| {
                owner.is_some_and(|owner| !Arc::ptr_eq(owner, command))
            };
            if signatures.iter().any(|sig| foreign(self.signatures.get(sig))) {
                return Err(StateError::DuplicateCommand {
                    command: name,
                    kind: DuplicateKind::Signature,
                });
            }
            if ids.iter().any(|id| foreign(self.ids.get(id))) {
                return Err(StateError::DuplicateCommand {
                    command: name,
                    kind: DuplicateKind::Id,
                });
            }
        }

        if options.pre_remove {
            self.remove(command);
        }
        for signature in signatures {
            self.signatures.insert(signature, command.clone());
        }
        for id in ids {
            self.ids.insert(id, command.clone());
        }
        if !self.contains(command) {
            self.commands.push(command.clone());
        }
        Ok(())
    }

    /// Drop a command and every signature and ID it owns. Absent commands are ignored.
    pub fn remove(&mut self, command: &CommandHandle) {
        self.signatures.retain(|_, owner| !Arc::ptr_eq(owner, command));
        self.ids.retain(|_, owner| !Arc::ptr_eq(owner, command));
        self.commands.retain(|owner| !Arc::ptr_eq(owner, command));
    }

    /// Whether this exact handle is registered.
    pub fn contains(&self, command: &CommandHandle) -> bool {
        self.commands.iter().any(|c| Arc::ptr_eq(c, command))
    }

    /// Registered commands in insertion order.
    pub fn commands(&self) -> &[CommandHandle] {
        &self.commands
    }

    /// The command owning a signature.
    pub fn get(&self, signature: &CommandSignature) -> Option<CommandHandle> {
        self.signatures.get(signature).cloned()
    }

    /// The command bound to a remote ID.
    pub fn get_by_id(&self, id: Snowflake) -> Option<CommandHandle> {
        self.ids.get(&id).cloned()
    }

    /// Every signature currently indexed, in no particular order.
    pub fn signatures(&self) -> impl Iterator<Item = (&CommandSignature, &CommandHandle)> {
        self.signatures.iter()
    }

    /// Resolve a possibly space-separated qualified name.
    ///
    /// The first token selects the top-level command; each further token walks
    /// one level of sub-commands. A node without sub-commands resolves to
    /// itself whatever tokens follow, a node with sub-commands but no match
    /// for the token resolves to nothing.
    pub fn get_from_signature(
        &self,
        kind: CommandType,
        qualified_name: &str,
        guild_id: Option<Snowflake>,
    ) -> Option<ResolvedCommand> {
        self.resolve(kind, qualified_name, guild_id, false)
    }

    /// [`get_from_signature`](Self::get_from_signature), also matching each
    /// token against the localized names at its level when no name matches.
    pub fn get_from_localized_signature(
        &self,
        kind: CommandType,
        qualified_name: &str,
        guild_id: Option<Snowflake>,
    ) -> Option<ResolvedCommand> {
        self.resolve(kind, qualified_name, guild_id, true)
    }

    fn resolve(
        &self,
        kind: CommandType,
        qualified_name: &str,
        guild_id: Option<Snowflake>,
        search_localizations: bool,
    ) -> Option<ResolvedCommand> {
        let mut tokens = qualified_name.split(' ').filter(|t| !t.is_empty());
        let root = tokens.next()?;
        let command = self.get(&CommandSignature::new(root, kind, guild_id)).or_else(|| {
            if !search_localizations {
                return None;
            }
            self.signatures
                .iter()
                .filter(|(sig, _)| sig.kind == kind && sig.guild_id == guild_id)
                .map(|(_, command)| command)
                .find(|command| command.read().name_localizations.values().any(|n| n == root))
                .cloned()
        })?;

        let mut path = Vec::new();
        {
            let cmd = command.read();
            let mut children: Vec<_> = cmd.options.iter().filter(|o| o.kind.is_sub_command()).collect();
            for token in tokens {
                if children.is_empty() {
                    break;
                }
                let localized = |c: &&CommandOption| c.name_localizations.values().any(|n| n == token);
                let child = match children.iter().copied().find(|c| c.name == token) {
                    Some(child) => child,
                    None if search_localizations => children.iter().copied().find(localized)?,
                    None => return None,
                };
                path.push(child.name.clone());
                children = child.children().collect();
            }
        }
        Some(ResolvedCommand { command, path })
    }

    /// Commands registered globally, or that want to be when `rollout` is set.
    pub fn global_commands(&self, rollout: bool) -> Vec<CommandHandle> {
        self.commands
            .iter()
            .filter(|c| {
                let c = c.read();
                (rollout && c.is_global()) || c.command_ids.contains_key(&None)
            })
            .cloned()
            .collect()
    }

    /// Commands targeting a guild. `None` returns every command.
    pub fn guild_commands(&self, guild_id: Option<Snowflake>, rollout: bool) -> Vec<CommandHandle> {
        self.commands
            .iter()
            .filter(|c| {
                let Some(guild_id) = guild_id else {
                    return true;
                };
                let c = c.read();
                c.command_ids.contains_key(&Some(guild_id))
                    || (rollout && c.guild_ids_to_rollout.contains(&guild_id))
            })
            .cloned()
            .collect()
    }

    /// Re-add every command with its rollout signatures.
    pub fn add_all_rollout_signatures(&mut self) -> Result<()> {
        for command in self.commands.clone() {
            self.add(&command, AddOptions::rollout())?;
        }
        Ok(())
    }

    /// Unbind a command's ID for one scope and drop the matching index entries.
    pub(crate) fn unbind(&mut self, command: &CommandHandle, guild_id: Option<Snowflake>) {
        let (id, signature) = {
            let mut cmd = command.write();
            (cmd.command_ids.remove(&guild_id), cmd.signature(guild_id))
        };
        if let Some(id) = id {
            if self.ids.get(&id).is_some_and(|owner| Arc::ptr_eq(owner, command)) {
                self.ids.remove(&id);
            }
        }
        if self
            .signatures
            .get(&signature)
            .is_some_and(|owner| Arc::ptr_eq(owner, command))
        {
            self.signatures.remove(&signature);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_signature_rejected() {
        let mut registry = CommandRegistry::new();
        let first = ApplicationCommand::slash("ping").into_handle();
        let second = ApplicationCommand::slash("ping").into_handle();
        registry.add(&first, AddOptions::default()).unwrap();

        let err = registry.add(&second, AddOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            StateError::DuplicateCommand {
                kind: DuplicateKind::Signature,
                ..
            }
        ));
        assert_eq!(registry.commands().len(), 1);

        registry
            .add(
                &second,
                AddOptions {
                    overwrite: true,
                    ..Default::default()
                },
            )
            .unwrap();
        let owner = registry
            .get(&CommandSignature::new("ping", CommandType::ChatInput, None))
            .unwrap();
        assert!(Arc::ptr_eq(&owner, &second));
    }

    #[test]
    fn test_readding_same_command_is_fine() {
        let mut registry = CommandRegistry::new();
        let cmd = ApplicationCommand::slash("ping").into_handle();
        registry.add(&cmd, AddOptions::default()).unwrap();
        registry.add(&cmd, AddOptions::default()).unwrap();
        assert_eq!(registry.commands().len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected_without_mutation() {
        let mut registry = CommandRegistry::new();
        let first = ApplicationCommand::slash("a").into_handle();
        first.write().parse_response(&json!({"id": "7"})).unwrap();
        registry.add(&first, AddOptions::default()).unwrap();

        let second = ApplicationCommand::slash("b").into_handle();
        second.write().parse_response(&json!({"id": "7"})).unwrap();
        let err = registry.add(&second, AddOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            StateError::DuplicateCommand {
                kind: DuplicateKind::Id,
                ..
            }
        ));
        assert!(registry
            .get(&CommandSignature::new("b", CommandType::ChatInput, None))
            .is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = CommandRegistry::new();
        let cmd = ApplicationCommand::slash("a").guild(3).into_handle();
        registry.add(&cmd, AddOptions::rollout()).unwrap();
        assert!(registry
            .get(&CommandSignature::new("a", CommandType::ChatInput, Some(3)))
            .is_some());
        registry.remove(&cmd);
        registry.remove(&cmd);
        assert!(registry.commands().is_empty());
        assert_eq!(registry.signatures().count(), 0);
    }

    #[test]
    fn test_sub_command_lookup() {
        let mut registry = CommandRegistry::new();
        let cmd = ApplicationCommand::slash("config")
            .option(
                CommandOption::new(OptionType::SubCommandGroup, "role", "roles")
                    .option(CommandOption::new(OptionType::SubCommand, "add", "add a role")),
            )
            .into_handle();
        let leaf = ApplicationCommand::slash("ping").into_handle();
        registry.add(&cmd, AddOptions::default()).unwrap();
        registry.add(&leaf, AddOptions::default()).unwrap();

        let found = registry
            .get_from_signature(CommandType::ChatInput, "config role add", None)
            .unwrap();
        assert_eq!(found.path, vec!["role".to_string(), "add".to_string()]);
        assert!(registry
            .get_from_signature(CommandType::ChatInput, "config missing", None)
            .is_none());

        // no children: extra tokens resolve to the node itself
        let found = registry
            .get_from_signature(CommandType::ChatInput, "ping extra", None)
            .unwrap();
        assert!(!found.is_sub_command());
        assert!(registry
            .get_from_signature(CommandType::User, "ping", None)
            .is_none());
    }

    #[test]
    fn test_localized_lookup() {
        let mut registry = CommandRegistry::new();
        let cmd = ApplicationCommand::slash("config")
            .name_localization("de", "einstellungen")
            .option(
                CommandOption::new(OptionType::SubCommand, "reset", "reset everything")
                    .name_localization("de", "zuruecksetzen"),
            )
            .into_handle();
        registry.add(&cmd, AddOptions::default()).unwrap();

        assert!(registry
            .get_from_signature(CommandType::ChatInput, "einstellungen", None)
            .is_none());
        let found = registry
            .get_from_localized_signature(CommandType::ChatInput, "einstellungen zuruecksetzen", None)
            .unwrap();
        assert!(Arc::ptr_eq(&found.command, &cmd));
        assert_eq!(found.path, vec!["reset".to_string()]);

        // canonical names still resolve, and the scope must match
        let found = registry
            .get_from_localized_signature(CommandType::ChatInput, "config zuruecksetzen", None)
            .unwrap();
        assert_eq!(found.path, vec!["reset".to_string()]);
        assert!(registry
            .get_from_localized_signature(CommandType::ChatInput, "einstellungen", Some(9))
            .is_none());
        assert!(registry
            .get_from_localized_signature(CommandType::ChatInput, "config unbekannt", None)
            .is_none());
    }

    #[test]
    fn test_scope_listings() {
        let mut registry = CommandRegistry::new();
        let global = ApplicationCommand::slash("g").into_handle();
        let guild = ApplicationCommand::slash("h").guild(9).into_handle();
        registry.add(&global, AddOptions::rollout()).unwrap();
        registry.add(&guild, AddOptions::rollout()).unwrap();

        assert_eq!(registry.global_commands(true).len(), 1);
        assert!(registry.global_commands(false).is_empty());
        assert_eq!(registry.guild_commands(Some(9), true).len(), 1);
        assert!(registry.guild_commands(Some(9), false).is_empty());
        assert_eq!(registry.guild_commands(None, false).len(), 2);
    }
}
