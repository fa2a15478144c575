//! Transport abstraction for MCP connections
//!
//! Provides a Transport trait and factory for creating the concrete transport
//! for a classified server config. The manager only depends on the
//! `TransportFactory` trait, so embedders and tests can substitute their own.

mod classify;
pub mod env;
mod http;
mod stdio;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use skillmux_core::{redact_url, ClientIdentity, ManagerConfig, McpResult, TransportType};

pub use classify::{classify_transport, resolve_transport};
pub use http::HttpTransport;
pub(crate) use http::scrub_url;
pub use stdio::{configure_child_process_platform, StdioTransport};

use super::instance::{McpClientHandler, McpConnection};
use super::oauth::OAuthProvider;

/// Transport trait for MCP connections
///
/// Each implementation handles the specifics of opening one connection.
/// A failed `connect` must not leave a process or socket behind.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection and complete the MCP handshake
    async fn connect(&self) -> McpResult<Arc<dyn McpConnection>>;

    /// Get the transport type
    fn transport_type(&self) -> TransportType;

    /// Get a description for logging (credentials redacted)
    fn description(&self) -> String;
}

/// Resolved transport configuration ready for connection.
///
/// Produced by the classifier from a `RawServerConfig`; `${VAR}` placeholders
/// are expanded by the adapters at connect time.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedTransport {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        headers: HashMap<String, String>,
        /// The server declares an `oauth` block
        oauth: bool,
    },
}

impl ResolvedTransport {
    /// Get the transport type for this config
    pub fn transport_type(&self) -> TransportType {
        match self {
            ResolvedTransport::Stdio { .. } => TransportType::Stdio,
            ResolvedTransport::Http { .. } => TransportType::Http,
        }
    }

    /// Get URL for HTTP transports
    pub fn url(&self) -> Option<&str> {
        match self {
            ResolvedTransport::Http { url, .. } => Some(url),
            ResolvedTransport::Stdio { .. } => None,
        }
    }

    /// Loggable one-liner, URL redacted
    pub fn describe(&self) -> String {
        match self {
            ResolvedTransport::Stdio { command, args, .. } => {
                if args.is_empty() {
                    format!("stdio:{}", command)
                } else {
                    format!("stdio:{} {}", command, args.join(" "))
                }
            }
            ResolvedTransport::Http { url, .. } => format!("http:{}", redact_url(url)),
        }
    }
}

/// Creates the transport for one connection attempt.
pub trait TransportFactory: Send + Sync {
    /// `auth_provider` is `Some` only for servers that declare `oauth`.
    fn create(
        &self,
        identity: &ClientIdentity,
        transport: &ResolvedTransport,
        auth_provider: Option<Arc<dyn OAuthProvider>>,
    ) -> Box<dyn Transport>;
}

/// Production factory: rmcp child-process and Streamable HTTP transports
#[derive(Debug, Clone)]
pub struct RmcpTransportFactory {
    client_name: String,
    connect_timeout: Duration,
    close_timeout: Duration,
}

impl RmcpTransportFactory {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            client_name: config.client_name.clone(),
            connect_timeout: config.connect_timeout,
            close_timeout: config.close_timeout,
        }
    }
}

impl TransportFactory for RmcpTransportFactory {
    fn create(
        &self,
        identity: &ClientIdentity,
        transport: &ResolvedTransport,
        auth_provider: Option<Arc<dyn OAuthProvider>>,
    ) -> Box<dyn Transport> {
        let handler = create_client_handler(&self.client_name, &identity.server_name);
        match transport {
            ResolvedTransport::Stdio { command, args, env } => Box::new(StdioTransport::new(
                identity.clone(),
                command.clone(),
                args.clone(),
                env.clone(),
                handler,
                self.connect_timeout,
                self.close_timeout,
            )),
            ResolvedTransport::Http {
                url,
                headers,
                oauth,
            } => Box::new(HttpTransport::new(
                identity.clone(),
                url.clone(),
                headers.clone(),
                if *oauth { auth_provider } else { None },
                handler,
                self.connect_timeout,
                self.close_timeout,
            )),
        }
    }
}

/// Create an MCP client handler for a server
pub fn create_client_handler(client_name: &str, server_name: &str) -> McpClientHandler {
    McpClientHandler::new(client_name, server_name)
}
