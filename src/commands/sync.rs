//! Reconciliation of local commands against the remote listing.
//!
//! For one scope (global, or one guild) the listing is walked in the order the
//! platform returned it:
//!
//! 1. each remote entry's signature is looked up in the registry;
//! 2. a match whose payload is structurally equal gets the remote ID bound
//!    (no network call);
//! 3. a match that drifted is re-upserted, or deleted when updates are off;
//! 4. an entry no local command claims is deleted.
//!
//! Afterwards every local signature of the scope missing from the listing is
//! upserted. Scopes are processed one at a time, network calls included.

use super::payload::is_payload_equal;
use super::{AddOptions, CommandHandle, CommandRegistry, CommandSignature};
use crate::error::{Result, StateError};
use crate::http::CommandHttp;
use crate::model::{snowflake, Snowflake};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Which reconciliation steps run. Everything is on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Bind remote IDs to local commands that match exactly
    pub associate_known: bool,
    /// Delete remote commands no local command claims
    pub delete_unknown: bool,
    /// Re-upsert local commands whose remote copy drifted
    pub update_known: bool,
    /// Upsert local commands the remote listing lacks
    pub register_new: bool,
    /// Use rollout guilds rather than registered guilds
    pub use_rollout: bool,
    /// Skip guilds whose listing is forbidden instead of failing
    pub ignore_forbidden: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            associate_known: true,
            delete_unknown: true,
            update_known: true,
            register_new: true,
            use_rollout: true,
            ignore_forbidden: true,
        }
    }
}

/// Remote listings keyed by scope; `None` is global.
pub type ScopedListings = BTreeMap<Option<Snowflake>, Vec<Value>>;

fn scope_name(guild_id: Option<Snowflake>) -> String {
    match guild_id {
        Some(guild_id) => format!("in guild {guild_id}"),
        None => "globally".into(),
    }
}

/// Drives reconciliation for one registry over one HTTP seam.
pub struct CommandSync<'a> {
    http: &'a dyn CommandHttp,
    registry: &'a RwLock<CommandRegistry>,
}

impl<'a> CommandSync<'a> {
    /// Sync `registry` through `http`.
    pub fn new(http: &'a dyn CommandHttp, registry: &'a RwLock<CommandRegistry>) -> Self {
        Self { http, registry }
    }

    async fn fetch(&self, guild_id: Option<Snowflake>) -> Result<Vec<Value>> {
        match guild_id {
            Some(guild_id) => self.http.get_guild_commands(guild_id).await,
            None => self.http.get_global_commands().await,
        }
    }

    async fn listing(&self, data: Option<Vec<Value>>, guild_id: Option<Snowflake>) -> Result<Vec<Value>> {
        match data {
            Some(data) => Ok(data),
            None => self.fetch(guild_id).await,
        }
    }

    /// Sync every scope any registered command targets.
    ///
    /// Listings missing from `data` are fetched. A forbidden guild listing is
    /// skipped with a warning unless `ignore_forbidden` is off. Scopes then sync
    /// in order: global first, then guilds by ascending ID.
    pub async fn sync_all(&self, data: Option<ScopedListings>, options: SyncOptions) -> Result<()> {
        tracing::debug!("Beginning sync of all application commands");
        let mut data = data.unwrap_or_default();
        let add = AddOptions {
            use_rollout: options.use_rollout,
            ..AddOptions::default()
        };

        let commands = self.registry.read().commands().to_vec();
        for command in &commands {
            self.registry.write().add(command, add)?;
            let (is_global, guilds) = {
                let cmd = command.read();
                let guilds = if options.use_rollout {
                    cmd.guild_ids_to_rollout.clone()
                } else {
                    cmd.guild_ids()
                };
                (cmd.is_global(), guilds)
            };

            if is_global && !data.contains_key(&None) {
                let listing = self.http.get_global_commands().await?;
                tracing::debug!("Fetched global application command data");
                data.insert(None, listing);
            }
            for guild_id in guilds {
                if data.contains_key(&Some(guild_id)) {
                    continue;
                }
                match self.http.get_guild_commands(guild_id).await {
                    Ok(listing) => {
                        tracing::debug!(guild_id, "Fetched guild application command data");
                        data.insert(Some(guild_id), listing);
                    }
                    Err(e) if e.is_forbidden() && options.ignore_forbidden => {
                        tracing::warn!(
                            guild_id,
                            "Forbidden error fetching commands, is the applications.commands scope enabled? {}",
                            e
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        for (guild_id, listing) in data {
            tracing::debug!(scope = %scope_name(guild_id), "Running command sync");
            self.sync(Some(listing), guild_id, options).await?;
        }
        Ok(())
    }

    /// Discover, then register new commands when `register_new` is set.
    pub async fn sync(
        &self,
        data: Option<Vec<Value>>,
        guild_id: Option<Snowflake>,
        options: SyncOptions,
    ) -> Result<()> {
        let data = self.listing(data, guild_id).await?;
        self.discover(Some(data.clone()), guild_id, options).await?;
        if options.register_new {
            self.register_new(Some(data), guild_id).await?;
        }
        tracing::debug!(scope = %scope_name(guild_id), "Command sync finished");
        Ok(())
    }

    /// Associate, update and delete against one scope's listing.
    pub async fn discover(
        &self,
        data: Option<Vec<Value>>,
        guild_id: Option<Snowflake>,
        options: SyncOptions,
    ) -> Result<()> {
        if !options.associate_known && !options.delete_unknown && !options.update_known {
            return Ok(());
        }
        let data = self.listing(data, guild_id).await?;

        for raw in &data {
            let signature = CommandSignature::from_remote(raw).ok_or(StateError::MissingField("name"))?;
            let remote_id = snowflake(raw, "id")?;
            let found = self.registry.read().get(&signature);

            let Some(command) = found else {
                if options.delete_unknown {
                    tracing::debug!(?signature, "Remote command has no local match, deleting");
                    self.delete_remote(guild_id, remote_id).await?;
                }
                continue;
            };

            let local = command.read().payload(guild_id);
            if is_payload_equal(&local, raw) {
                if options.associate_known {
                    tracing::debug!(?signature, "Associated remote command");
                    command.write().parse_response(raw)?;
                    self.registry.write().add(&command, AddOptions::rollout())?;
                }
            } else if options.update_known {
                tracing::debug!(?signature, "Remote command drifted, updating");
                self.register_command(&command, guild_id).await?;
            } else if options.delete_unknown {
                tracing::debug!(?signature, "Remote command drifted, deleting");
                self.delete_remote(guild_id, remote_id).await?;
                let bound = command.read().command_ids.get(&guild_id) == Some(&remote_id);
                if bound {
                    self.registry.write().unbind(&command, guild_id);
                }
            }
        }
        Ok(())
    }

    /// Upsert every local command of the scope the listing lacks.
    pub async fn register_new(&self, data: Option<Vec<Value>>, guild_id: Option<Snowflake>) -> Result<()> {
        let data = self.listing(data, guild_id).await?;
        let remote: HashSet<CommandSignature> =
            data.iter().filter_map(CommandSignature::from_remote).collect();

        let mut pending: Vec<CommandHandle> = Vec::new();
        for (signature, command) in self.registry.read().signatures() {
            if signature.guild_id == guild_id
                && !remote.contains(signature)
                && !pending.iter().any(|p| Arc::ptr_eq(p, command))
            {
                pending.push(command.clone());
            }
        }
        for command in pending {
            self.register_command(&command, guild_id).await?;
        }
        Ok(())
    }

    /// Upsert one command into a scope and bind the returned ID.
    pub async fn register_command(&self, command: &CommandHandle, guild_id: Option<Snowflake>) -> Result<()> {
        let (payload, signature) = {
            let cmd = command.read();
            (cmd.payload(guild_id), cmd.signature(guild_id))
        };
        tracing::info!(?signature, "Registering command");

        let response = match guild_id {
            Some(guild_id) => self.http.upsert_guild_command(guild_id, &payload).await,
            None => self.http.upsert_global_command(&payload).await,
        };
        let response = response.inspect_err(|e| {
            tracing::error!(command = %signature.name, "Error registering command: {}", e);
        })?;

        command.write().parse_response(&response)?;
        self.registry.write().add(
            command,
            AddOptions {
                pre_remove: false,
                ..AddOptions::default()
            },
        )
    }

    /// Delete a command's bound remote copy in a scope and unbind it.
    ///
    /// # Errors
    ///
    /// [`StateError::CommandNotRegistered`] when the command has no ID in that scope.
    pub async fn delete_command(&self, command: &CommandHandle, guild_id: Option<Snowflake>) -> Result<()> {
        let (id, name) = {
            let cmd = command.read();
            (cmd.command_ids.get(&guild_id).copied(), cmd.name.clone())
        };
        let Some(id) = id else {
            tracing::error!(command = %name, "Could not unregister command {}", scope_name(guild_id));
            return Err(StateError::CommandNotRegistered {
                command: name,
                scope: scope_name(guild_id),
            });
        };
        self.delete_remote(guild_id, id).await.inspect_err(|e| {
            tracing::error!(command = %name, "Error unregistering command: {}", e);
        })?;
        self.registry.write().unbind(command, guild_id);
        Ok(())
    }

    async fn delete_remote(&self, guild_id: Option<Snowflake>, id: Snowflake) -> Result<()> {
        match guild_id {
            Some(guild_id) => self.http.delete_guild_command(guild_id, id).await,
            None => self.http.delete_global_command(id).await,
        }
    }
}
