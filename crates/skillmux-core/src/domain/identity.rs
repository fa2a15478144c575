//! Client identity
//!
//! Each (session_id, skill_name, server_name) triple gets its own isolated
//! pool slot. Two skills referencing a server with the same name never share
//! a connection, and neither do two sessions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one logical connection slot in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub server_name: String,
    pub skill_name: String,
    pub session_id: String,
}

impl ClientIdentity {
    pub fn new(
        session_id: impl Into<String>,
        skill_name: impl Into<String>,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            skill_name: skill_name.into(),
            session_id: session_id.into(),
        }
    }

    /// Pool key for this identity: `session:skill:server`.
    ///
    /// `\` and `:` inside a component are backslash-escaped, so names that
    /// themselves contain colons never share a key.
    pub fn pool_key(&self) -> String {
        format!(
            "{}:{}:{}",
            escape_key_part(&self.session_id),
            escape_key_part(&self.skill_name),
            escape_key_part(&self.server_name)
        )
    }

    /// Whether this identity belongs to the given session.
    pub fn in_session(&self, session_id: &str) -> bool {
        self.session_id == session_id
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} (session {})", self.skill_name, self.server_name, self.session_id)
    }
}

fn escape_key_part(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        if c == '\\' || c == ':' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
