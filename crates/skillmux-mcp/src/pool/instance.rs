//! Pooled client representation
//!
//! `McpConnection` is the seam between the pool and the MCP client library:
//! the pool only ever talks to `Arc<dyn McpConnection>`. `RmcpConnection` is
//! the production implementation wrapping an `rmcp` running service, which
//! owns its transport (child process or HTTP client).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo,
    GetPromptRequestParams, GetPromptResult, Implementation, LoggingLevel, Prompt,
    ReadResourceRequestParams, ReadResourceResult, Resource, Tool,
};
use rmcp::service::{NotificationContext, Peer, RunningService, ServiceError};
use rmcp::RoleClient;
use serde_json::{Map, Value};
use skillmux_core::{ClientIdentity, McpError, McpResult, TransportType};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::transport::scrub_url;

/// Type alias for the MCP client service
pub type McpClient = RunningService<RoleClient, McpClientHandler>;

/// One live MCP client, as seen by the pool.
#[async_trait]
pub trait McpConnection: Send + Sync {
    fn transport_type(&self) -> TransportType;

    async fn list_tools(&self) -> McpResult<Vec<Tool>>;

    async fn list_resources(&self) -> McpResult<Vec<Resource>>;

    async fn list_prompts(&self) -> McpResult<Vec<Prompt>>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult>;

    async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult>;

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<GetPromptResult>;

    /// Shut the connection down. Calling it twice is a no-op.
    async fn close(&self) -> McpResult<()>;
}

/// Client handler announced to every backend server
#[derive(Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
    server_name: String,
}

impl std::fmt::Debug for McpClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientHandler")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl McpClientHandler {
    pub fn new(client_name: &str, server_name: &str) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("{}-{}", client_name, server_name),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("SkillMux".to_string()),
                    ..Default::default()
                },
                meta: None,
            },
            server_name: server_name.to_string(),
        }
    }
}

impl rmcp::ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_logging_message(
        &self,
        params: rmcp::model::LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server_name = self.server_name.clone();
        async move {
            let message = match &params.data {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match params.level {
                LoggingLevel::Debug => debug!(server = %server_name, "[McpServer] {}", message),
                LoggingLevel::Info | LoggingLevel::Notice => {
                    info!(server = %server_name, "[McpServer] {}", message)
                }
                _ => warn!(server = %server_name, level = ?params.level, "[McpServer] {}", message),
            }
        }
    }
}

/// Map an rmcp service error onto the pool's taxonomy.
///
/// Typed variants are used where rmcp exposes them; everything else goes
/// through text classification. `url` is redacted from every message.
pub(crate) fn map_service_error(
    server_name: &str,
    operation: &str,
    url: Option<&str>,
    err: ServiceError,
) -> McpError {
    let scrub = |text: String| match url {
        Some(url) => scrub_url(&text, url),
        None => text,
    };
    match err {
        ServiceError::McpError(data) => {
            let message = scrub(format!(
                "{} on MCP server \"{}\" returned error {}: {}",
                operation, server_name, data.code.0, data.message
            ));
            // Server-reported errors are never stale; only step-up is recoverable.
            match McpError::from_message(message.clone()) {
                step_up @ McpError::StepUpRequired { .. } => step_up,
                _ => McpError::Protocol(message),
            }
        }
        ServiceError::TransportClosed => McpError::StaleConnection(format!(
            "transport to MCP server \"{}\" closed during {}",
            server_name, operation
        )),
        ServiceError::TransportSend(e) => McpError::StaleConnection(scrub(format!(
            "{} on MCP server \"{}\" could not be sent: {}",
            operation, server_name, e
        ))),
        other => McpError::from_message(scrub(format!(
            "{} on MCP server \"{}\" failed: {}",
            operation, server_name, other
        ))),
    }
}

/// `McpConnection` backed by an rmcp running service.
pub struct RmcpConnection {
    server_name: String,
    transport_type: TransportType,
    /// Server URL for HTTP connections, redacted from errors
    url: Option<String>,
    peer: Peer<RoleClient>,
    service: tokio::sync::Mutex<Option<McpClient>>,
    close_timeout: Duration,
}

impl RmcpConnection {
    pub fn new(
        server_name: impl Into<String>,
        transport_type: TransportType,
        client: McpClient,
        close_timeout: Duration,
    ) -> Self {
        let peer = client.peer().clone();
        Self {
            server_name: server_name.into(),
            transport_type,
            url: None,
            peer,
            service: tokio::sync::Mutex::new(Some(client)),
            close_timeout,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn err(&self, operation: &str, e: ServiceError) -> McpError {
        map_service_error(&self.server_name, operation, self.url.as_deref(), e)
    }
}

#[async_trait]
impl McpConnection for RmcpConnection {
    fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.peer
            .list_all_tools()
            .await
            .map_err(|e| self.err("tools/list", e))
    }

    async fn list_resources(&self) -> McpResult<Vec<Resource>> {
        self.peer
            .list_all_resources()
            .await
            .map_err(|e| self.err("resources/list", e))
    }

    async fn list_prompts(&self) -> McpResult<Vec<Prompt>> {
        self.peer
            .list_all_prompts()
            .await
            .map_err(|e| self.err("prompts/list", e))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        debug!(server = %self.server_name, tool = %name, "[McpClient] Calling tool");
        let params = CallToolRequestParams {
            name: name.to_string().into(),
            arguments,
            task: None,
            meta: None,
        };
        self.peer
            .call_tool(params)
            .await
            .map_err(|e| self.err("tools/call", e))
    }

    async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        let params = ReadResourceRequestParams {
            uri: uri.into(),
            meta: None,
        };
        self.peer
            .read_resource(params)
            .await
            .map_err(|e| self.err("resources/read", e))
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<GetPromptResult> {
        let params = GetPromptRequestParams {
            name: name.into(),
            arguments,
            meta: None,
        };
        self.peer
            .get_prompt(params)
            .await
            .map_err(|e| self.err("prompts/get", e))
    }

    async fn close(&self) -> McpResult<()> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };

        info!(server = %self.server_name, "[McpClient] Disconnecting from MCP server");

        // On timeout the service is dropped, and kill_on_drop reaps a stdio child.
        match tokio::time::timeout(self.close_timeout, service.cancel()).await {
            Ok(Ok(reason)) => {
                debug!(server = %self.server_name, ?reason, "[McpClient] MCP client closed");
                Ok(())
            }
            Ok(Err(e)) => Err(McpError::Operation(format!(
                "Failed to close MCP server \"{}\": {}",
                self.server_name, e
            ))),
            Err(_) => {
                warn!(
                    server = %self.server_name,
                    timeout = ?self.close_timeout,
                    "[McpClient] MCP server did not exit in time, forcing shutdown"
                );
                Ok(())
            }
        }
    }
}

/// A pooled MCP client with usage tracking
pub struct ManagedClient {
    pub client: Arc<dyn McpConnection>,
    pub identity: ClientIdentity,
    pub transport_type: TransportType,
    pub skill_name: String,
    pub created_at: Instant,
    pub last_used_at: Instant,
}

impl ManagedClient {
    pub fn new(identity: ClientIdentity, client: Arc<dyn McpConnection>) -> Self {
        let now = Instant::now();
        Self {
            transport_type: client.transport_type(),
            skill_name: identity.skill_name.clone(),
            identity,
            client,
            created_at: now,
            last_used_at: now,
        }
    }

    /// Refresh `last_used_at`.
    pub fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    /// Time since the client was last handed out.
    pub fn idle_duration(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Whether the client has been idle strictly longer than `idle_timeout`.
    pub fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.idle_duration() > idle_timeout
    }
}
