//! Error types for the connection-state engine.
//!
//! Cache misses are never errors: lookups return `Option`. Everything that can
//! actually fail (malformed payloads, duplicate command registration, HTTP and
//! gateway failures, chunk timeouts) is reported through [`StateError`].

use crate::model::Snowflake;
use std::fmt;
use thiserror::Error;

/// Which part of a command's identity collided during registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    /// Another command already owns a (name, type, guild) signature.
    Signature,
    /// Another command is already bound to the same remote command ID.
    Id,
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateKind::Signature => f.write_str("signatures"),
            DuplicateKind::Id => f.write_str("IDs"),
        }
    }
}

/// Errors produced by the state engine and its transports.
#[derive(Error, Debug)]
pub enum StateError {
    /// An event payload lacked a key the handler reads, or it had the wrong shape
    #[error("malformed payload: missing or invalid field `{0}`")]
    MissingField(&'static str),

    /// Two distinct command objects tried to claim the same signature or ID
    #[error("command `{command}`: cannot add application commands with duplicate {kind}")]
    DuplicateCommand {
        /// Name of the command that failed to register
        command: String,
        /// What collided
        kind: DuplicateKind,
    },

    /// A command has no remote ID in the requested scope
    #[error("command `{command}` is not registered {scope}")]
    CommandNotRegistered {
        /// Command name
        command: String,
        /// Human readable scope ("globally" or "in guild N")
        scope: String,
    },

    /// The platform denied access (HTTP 401/403)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The platform reported the resource missing (HTTP 404)
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success HTTP status
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Transport-level HTTP failure (connect, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The gateway could not send a request
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Member chunks did not arrive in time
    #[error("timed out waiting for member chunks for guild {guild_id}")]
    ChunkTimeout {
        /// Guild whose members were requested
        guild_id: Snowflake,
    },

    /// A chunk request was dropped before it completed
    #[error("member chunk request for guild {0} was dropped before completion")]
    ChunkCancelled(Snowflake),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL could not be parsed or joined
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl StateError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            StateError::Http(_) => true,
            StateError::Api { status, .. } => crate::http::is_retryable_status(*status),
            _ => false,
        }
    }

    /// Whether this error is a permission denial.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, StateError::Forbidden(_))
    }
}

impl From<reqwest::Error> for StateError {
    fn from(e: reqwest::Error) -> Self {
        StateError::Http(e.to_string())
    }
}

/// Result type for state operations.
pub type Result<T> = std::result::Result<T, StateError>;
