#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # Chord State: connection state for chat-platform clients
//!
//! This crate keeps a client's view of a chat platform in step with the
//! gateway event stream. It owns the entity cache, matches member chunks to
//! the requests that asked for them, gates the `ready` notification on guild
//! startup, and reconciles locally declared application commands with the
//! platform's registry.
//!
//! ## Overview
//!
//! 1. **Entity cache** - ID-indexed users, guilds, channels, expressions and a bounded message ring
//! 2. **Event dispatch** - a table from gateway event names to parsers that mutate the cache then emit [`Event`]s
//! 3. **Member chunking** - nonce-keyed requests completed by `GUILD_MEMBERS_CHUNK` batches
//! 4. **Startup sequencing** - initial guilds are collected, optionally chunked, announced, then `ready` fires
//! 5. **Command reconciliation** - signature-indexed registry diffed against the remote listing
//!
//! The gateway socket and the REST transport stay outside: the state talks to
//! them through the [`gateway::Gateway`] and [`http::CommandHttp`] traits.
//!
//! ## Usage
//!
//! ```ignore
//! use chord_state::{ConnectionState, StateConfig};
//! use chord_state::gateway::NullGateway;
//! use chord_state::http::{RestClient, RestConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> chord_state::Result<()> {
//!     let http = Arc::new(RestClient::new(RestConfig::default())?);
//!     let (state, mut events) = ConnectionState::new(StateConfig::default(), Arc::new(NullGateway), http)?;
//!
//!     // feed (event name, payload) pairs from the gateway
//!     tokio::spawn({
//!         let state = state.clone();
//!         async move { state.process_events(gateway_stream()).await }
//!     });
//!
//!     while let Some(event) = events.next().await {
//!         println!("{}", event.name());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`state`] - [`ConnectionState`], the parser table and the startup sequencer
//! - [`cache`] - [`cache::EntityCache`] and its bounded stores
//! - [`chunk`] - member chunk requests
//! - [`commands`] - command model, registry and reconciliation
//! - [`model`] - entities built from raw payloads
//! - [`config`] - [`StateConfig`] and gateway intents
//! - [`gateway`] / [`http`] - transport seams
//! - [`error`] - [`StateError`]

pub mod cache;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod model;
pub mod state;

pub use config::{Intents, MemberCacheFlags, StateConfig};
pub use error::{Result, StateError};
pub use state::{Actor, ConnectionState, Event, EventStream, MemberQuery};

#[cfg(test)]
mod test_support;
