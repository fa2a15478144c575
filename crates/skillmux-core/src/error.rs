//! Error taxonomy for the connection manager
//!
//! Every variant carries a human-readable message that already names the
//! server/skill involved. Messages never contain unredacted URLs.
//!
//! `McpError` is `Clone` because a single connection failure is fanned out to
//! every caller that joined the same pending connection.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

lazy_static! {
    static ref SCOPE_HINT: Regex = Regex::new(r#"scope="([^"]*)""#).unwrap();
}

/// Substrings that identify a dropped or never-established transport.
const STALE_INDICATORS: &[&str] = &[
    "not connected",
    "connection closed",
    "transport closed",
    "channel closed",
    "broken pipe",
    "connection reset",
    "econnreset",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum McpError {
    /// Missing or ambiguous connection fields. Never retried.
    #[error("{0}")]
    Configuration(String),

    /// Spawn or handshake failure. Resources are closed before this is raised.
    #[error("{0}")]
    Connection(String),

    /// The pooled transport is gone. Recovered by evict + retry.
    #[error("Not connected: {0}")]
    StaleConnection(String),

    /// The server wants a broader OAuth scope than the current token carries.
    #[error("Insufficient scope: {message}")]
    StepUpRequired {
        message: String,
        scope: Option<String>,
    },

    /// OAuth login failed or timed out.
    #[error("{0}")]
    Authorization(String),

    /// Error response returned by the MCP server itself.
    #[error("MCP error: {0}")]
    Protocol(String),

    /// Terminal error of the retry coordinator.
    #[error("Operation '{operation}' on MCP server \"{server}\" failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        server: String,
        attempts: u32,
        last: String,
    },

    /// Anything else.
    #[error("{0}")]
    Operation(String),
}

impl McpError {
    /// Build an error from free-form text reported by a client library.
    ///
    /// Used when no typed error kind is available.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message_is_step_up(&message) {
            let scope = scope_hint(&message);
            McpError::StepUpRequired { message, scope }
        } else if message_is_stale(&message) {
            McpError::StaleConnection(message)
        } else {
            McpError::Operation(message)
        }
    }

    /// Whether the pooled connection should be evicted and the call retried.
    pub fn is_stale(&self) -> bool {
        match self {
            McpError::StaleConnection(_) => true,
            McpError::Operation(msg) => message_is_stale(msg),
            _ => false,
        }
    }

    /// Whether this failure is an OAuth scope shortfall.
    pub fn is_step_up(&self) -> bool {
        match self {
            McpError::StepUpRequired { .. } => true,
            McpError::Operation(msg) | McpError::Protocol(msg) => message_is_step_up(msg),
            _ => false,
        }
    }

    /// Scope the server asked for, if it said.
    pub fn required_scope(&self) -> Option<String> {
        match self {
            McpError::StepUpRequired { scope, .. } => scope.clone(),
            McpError::Operation(msg) | McpError::Protocol(msg) => scope_hint(msg),
            _ => None,
        }
    }
}

fn message_is_stale(message: &str) -> bool {
    let lower = message.to_lowercase();
    STALE_INDICATORS.iter().any(|s| lower.contains(s))
}

fn message_is_step_up(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("insufficient_scope")
        || lower.contains("insufficient scope")
        || (lower.contains("403") && lower.contains("scope"))
}

fn scope_hint(message: &str) -> Option<String> {
    SCOPE_HINT
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}
