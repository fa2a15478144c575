//! Raw per-server configuration
//!
//! This follows the standard MCP server entry format used by skill manifests
//! (and by VS Code, Cursor, Claude Desktop): transport fields sit at the top
//! level, either `command`/`args`/`env` or `url`/`headers`. An optional `type`
//! field names the transport explicitly. The classifier decides which shape a
//! value is; nothing here validates it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::oauth::OAuthSettings;

/// A single server entry as handed over by the skill loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServerConfig {
    /// Explicit transport type ("stdio", "http", "sse")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<String>,

    // --- Stdio Transport (command-based) ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,

    // --- HTTP Transport (URL-based) ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthSettings>,
}

impl RawServerConfig {
    /// Stdio entry with the given command and args.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args: Some(args),
            ..Default::default()
        }
    }

    /// HTTP entry pointing at the given URL.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, transport_type: impl Into<String>) -> Self {
        self.transport_type = Some(transport_type.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_oauth(mut self, oauth: OAuthSettings) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// Whether the server declares an `oauth` block.
    pub fn has_oauth(&self) -> bool {
        self.oauth.is_some()
    }
}

/// Per-call context: which skill is asking, and the server's raw config.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerContext {
    pub skill_name: String,
    pub config: RawServerConfig,
}

impl ServerContext {
    pub fn new(skill_name: impl Into<String>, config: RawServerConfig) -> Self {
        Self {
            skill_name: skill_name.into(),
            config,
        }
    }
}
