//! Connection classification
//!
//! Decides whether a raw server entry is a stdio or an HTTP server. An
//! explicit `type` always wins, even when both `url` and `command` are set;
//! otherwise the kind is inferred from which of the two is present.

use skillmux_core::{ClientIdentity, McpError, McpResult, RawServerConfig, TransportType};

use super::ResolvedTransport;

/// Classify `config` for the server named by `identity`.
pub fn classify_transport(
    identity: &ClientIdentity,
    config: &RawServerConfig,
) -> McpResult<TransportType> {
    if let Some(explicit) = config.transport_type.as_deref() {
        match explicit.trim().to_ascii_lowercase().as_str() {
            "http" | "sse" => return Ok(TransportType::Http),
            "stdio" => return Ok(TransportType::Stdio),
            other => {
                tracing::debug!(
                    server = %identity.server_name,
                    transport_type = %other,
                    "[TransportClassifier] Unrecognised transport type, inferring from fields"
                );
            }
        }
    }

    if config.url.is_some() {
        return Ok(TransportType::Http);
    }
    if config.command.is_some() {
        return Ok(TransportType::Stdio);
    }

    Err(McpError::Configuration(missing_connection_message(identity)))
}

/// Classify and turn `config` into a [`ResolvedTransport`].
pub fn resolve_transport(
    identity: &ClientIdentity,
    config: &RawServerConfig,
) -> McpResult<ResolvedTransport> {
    let resolved = match classify_transport(identity, config)? {
        TransportType::Stdio => ResolvedTransport::Stdio {
            command: config.command.clone().unwrap_or_default(),
            args: config.args.clone().unwrap_or_default(),
            env: config.env.clone().unwrap_or_default(),
        },
        TransportType::Http => ResolvedTransport::Http {
            url: config.url.clone().unwrap_or_default(),
            headers: config.headers.clone().unwrap_or_default(),
            oauth: config.has_oauth(),
        },
    };
    Ok(resolved)
}

fn missing_connection_message(identity: &ClientIdentity) -> String {
    format!(
        "MCP server \"{server}\" in skill \"{skill}\" has no usable connection configuration.\n\
         \n\
         Each MCP server needs either a \"url\" (HTTP) or a \"command\" (Stdio), \
         optionally with an explicit \"type\".\n\
         \n\
         HTTP example:\n\
         \x20 \"{server}\": {{\n\
         \x20   \"url\": \"https://mcp.example.com/mcp\",\n\
         \x20   \"headers\": {{ \"Authorization\": \"Bearer ${{API_TOKEN}}\" }}\n\
         \x20 }}\n\
         \n\
         Stdio example:\n\
         \x20 \"{server}\": {{\n\
         \x20   \"command\": \"npx\",\n\
         \x20   \"args\": [\"-y\", \"@modelcontextprotocol/server-filesystem\", \".\"]\n\
         \x20 }}",
        server = identity.server_name,
        skill = identity.skill_name,
    )
}
