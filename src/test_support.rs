//! In-memory transports for tests.

use crate::error::{Result, StateError};
use crate::gateway::{ChunkQuery, Gateway};
use crate::http::CommandHttp;
use crate::model::Snowflake;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum HttpCall {
    GetGlobal,
    GetGuild(Snowflake),
    UpsertGlobal(Value),
    UpsertGuild(Snowflake, Value),
    DeleteGlobal(Snowflake),
    DeleteGuild(Snowflake, Snowflake),
}

/// Records every call and answers from canned listings.
#[derive(Debug)]
pub struct RecordingHttp {
    calls: Mutex<Vec<HttpCall>>,
    listings: HashMap<Option<Snowflake>, Vec<Value>>,
    forbidden: HashSet<Snowflake>,
    next_id: AtomicU64,
}

impl Default for RecordingHttp {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            listings: HashMap::new(),
            forbidden: HashSet::new(),
            next_id: AtomicU64::new(1000),
        }
    }
}

impl RecordingHttp {
    pub fn forbid_guild(mut self, guild_id: Snowflake) -> Self {
        self.forbidden.insert(guild_id);
        self
    }

    pub fn with_listing(mut self, guild_id: Option<Snowflake>, listing: Vec<Value>) -> Self {
        self.listings.insert(guild_id, listing);
        self
    }

    pub fn calls(&self) -> Vec<HttpCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: HttpCall) {
        self.calls.lock().push(call);
    }

    fn stored(&self, payload: &Value, guild_id: Option<Snowflake>) -> Value {
        let mut stored = payload.clone();
        stored["id"] = json!(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
        if let Some(guild_id) = guild_id {
            stored["guild_id"] = json!(guild_id.to_string());
        }
        stored
    }
}

#[async_trait]
impl CommandHttp for RecordingHttp {
    async fn get_global_commands(&self) -> Result<Vec<Value>> {
        self.record(HttpCall::GetGlobal);
        Ok(self.listings.get(&None).cloned().unwrap_or_default())
    }

    async fn get_guild_commands(&self, guild_id: Snowflake) -> Result<Vec<Value>> {
        self.record(HttpCall::GetGuild(guild_id));
        if self.forbidden.contains(&guild_id) {
            return Err(StateError::Forbidden("Missing Access".into()));
        }
        Ok(self.listings.get(&Some(guild_id)).cloned().unwrap_or_default())
    }

    async fn upsert_global_command(&self, payload: &Value) -> Result<Value> {
        self.record(HttpCall::UpsertGlobal(payload.clone()));
        Ok(self.stored(payload, None))
    }

    async fn upsert_guild_command(&self, guild_id: Snowflake, payload: &Value) -> Result<Value> {
        self.record(HttpCall::UpsertGuild(guild_id, payload.clone()));
        Ok(self.stored(payload, Some(guild_id)))
    }

    async fn delete_global_command(&self, command_id: Snowflake) -> Result<()> {
        self.record(HttpCall::DeleteGlobal(command_id));
        Ok(())
    }

    async fn delete_guild_command(&self, guild_id: Snowflake, command_id: Snowflake) -> Result<()> {
        self.record(HttpCall::DeleteGuild(guild_id, command_id));
        Ok(())
    }
}

/// Records chunk requests; optionally fails them.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    requests: Mutex<Vec<(Snowflake, ChunkQuery)>>,
    fail: bool,
}

impl RecordingGateway {
    pub fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn requests(&self) -> Vec<(Snowflake, ChunkQuery)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn request_chunks(&self, guild_id: Snowflake, query: ChunkQuery) -> Result<()> {
        self.requests.lock().push((guild_id, query));
        if self.fail {
            return Err(StateError::Gateway("connection closed".into()));
        }
        Ok(())
    }
}
