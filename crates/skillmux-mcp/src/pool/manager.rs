//! SkillMcpManager - MCP connection lifecycle for skills
//!
//! The manager is the one entry point skills use to talk to their MCP servers.
//! It owns every piece of pool state and coordinates:
//! - Reuse of pooled clients, keyed by (session, skill, server)
//! - One connection attempt per key, shared by every concurrent caller
//! - Session-scoped and global disconnects
//! - Background idle sweep and signal teardown, started with the first client

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::FutureExt;
use parking_lot::Mutex;
use rmcp::model::{CallToolResult, GetPromptResult, Prompt, ReadResourceResult, Resource, Tool};
use serde_json::{Map, Value};
use skillmux_core::{
    ClientIdentity, ManagerConfig, McpError, McpResult, RawServerConfig, ServerContext,
    TransportType,
};
use tracing::{debug, info, warn};

use super::cleanup::{close_clients, close_quietly, spawn_idle_cleanup};
use super::instance::{ManagedClient, McpConnection};
use super::oauth::{OAuthProvider, OAuthProviderFactory, UnconfiguredOAuthFactory};
use super::signals::SignalGuard;
use super::state::{ConnectFuture, ManagerState, PendingEntry};
use super::transport::{resolve_transport, RmcpTransportFactory, Transport, TransportFactory};

/// Diagnostic view of one pooled client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedServer {
    pub pool_key: String,
    pub identity: ClientIdentity,
    pub transport_type: TransportType,
    pub idle_for: Duration,
}

pub(crate) struct ManagerInner {
    pub(crate) config: ManagerConfig,
    pub(crate) state: Mutex<ManagerState>,
    transport_factory: Arc<dyn TransportFactory>,
    oauth_factory: Arc<dyn OAuthProviderFactory>,
}

/// Connection-lifecycle manager for skill MCP servers.
///
/// Cheap to clone; clones share one pool.
#[derive(Clone)]
pub struct SkillMcpManager {
    pub(crate) inner: Arc<ManagerInner>,
}

/// Builder for [`SkillMcpManager`] with substitutable transports and OAuth.
pub struct SkillMcpManagerBuilder {
    config: ManagerConfig,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    oauth_factory: Option<Arc<dyn OAuthProviderFactory>>,
}

impl SkillMcpManagerBuilder {
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    pub fn with_oauth_provider_factory(mut self, factory: Arc<dyn OAuthProviderFactory>) -> Self {
        self.oauth_factory = Some(factory);
        self
    }

    pub fn build(self) -> SkillMcpManager {
        let transport_factory = self
            .transport_factory
            .unwrap_or_else(|| Arc::new(RmcpTransportFactory::new(&self.config)));
        let oauth_factory = self
            .oauth_factory
            .unwrap_or_else(|| Arc::new(UnconfiguredOAuthFactory));

        SkillMcpManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                state: Mutex::new(ManagerState::default()),
                transport_factory,
                oauth_factory,
            }),
        }
    }
}

impl SkillMcpManager {
    /// Manager with the rmcp transports and no OAuth provider.
    pub fn new(config: ManagerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: ManagerConfig) -> SkillMcpManagerBuilder {
        SkillMcpManagerBuilder {
            config,
            transport_factory: None,
            oauth_factory: None,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Get the pooled client for `identity`, connecting if needed.
    ///
    /// Concurrent calls for one identity share a single connection attempt and
    /// all observe its outcome.
    pub async fn get_or_create_client(
        &self,
        identity: &ClientIdentity,
        context: &ServerContext,
    ) -> McpResult<Arc<dyn McpConnection>> {
        let key = identity.pool_key();

        let future = {
            let mut state = self.inner.state.lock();

            if let Some(managed) = state.clients.get_mut(&key) {
                managed.touch();
                debug!(pool_key = %key, "[SkillMcpManager] Reusing pooled client");
                return Ok(Arc::clone(&managed.client));
            }

            if let Some(pending) = state.pending.get(&key) {
                debug!(pool_key = %key, "[SkillMcpManager] Joining in-flight connection");
                pending.future.clone()
            } else {
                let resolved = resolve_transport(identity, &context.config)?;
                let provider = state.auth_providers.get_or_create(
                    identity,
                    &context.config,
                    self.inner.oauth_factory.as_ref(),
                );
                let transport = self
                    .inner
                    .transport_factory
                    .create(identity, &resolved, provider);
                let attempt_id = state.next_attempt_id();

                info!(
                    pool_key = %key,
                    transport = %transport.description(),
                    "[SkillMcpManager] Connecting to MCP server"
                );

                let future = spawn_connect(
                    Arc::downgrade(&self.inner),
                    identity.clone(),
                    attempt_id,
                    transport,
                );
                state.pending.insert(
                    key.clone(),
                    PendingEntry {
                        attempt_id,
                        identity: identity.clone(),
                        future: future.clone(),
                    },
                );
                future
            }
        };

        future.await
    }

    pub async fn list_tools(
        &self,
        identity: &ClientIdentity,
        context: &ServerContext,
    ) -> McpResult<Vec<Tool>> {
        self.with_retry("tools/list", identity, context, |client| async move {
            client.list_tools().await
        })
        .await
    }

    pub async fn list_resources(
        &self,
        identity: &ClientIdentity,
        context: &ServerContext,
    ) -> McpResult<Vec<Resource>> {
        self.with_retry("resources/list", identity, context, |client| async move {
            client.list_resources().await
        })
        .await
    }

    pub async fn list_prompts(
        &self,
        identity: &ClientIdentity,
        context: &ServerContext,
    ) -> McpResult<Vec<Prompt>> {
        self.with_retry("prompts/list", identity, context, |client| async move {
            client.list_prompts().await
        })
        .await
    }

    pub async fn call_tool(
        &self,
        identity: &ClientIdentity,
        context: &ServerContext,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        self.with_retry("tools/call", identity, context, |client| {
            let name = name.to_string();
            let arguments = arguments.clone();
            async move { client.call_tool(&name, arguments).await }
        })
        .await
    }

    pub async fn read_resource(
        &self,
        identity: &ClientIdentity,
        context: &ServerContext,
        uri: &str,
    ) -> McpResult<ReadResourceResult> {
        self.with_retry("resources/read", identity, context, |client| {
            let uri = uri.to_string();
            async move { client.read_resource(&uri).await }
        })
        .await
    }

    pub async fn get_prompt(
        &self,
        identity: &ClientIdentity,
        context: &ServerContext,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<GetPromptResult> {
        self.with_retry("prompts/get", identity, context, |client| {
            let name = name.to_string();
            let arguments = arguments.clone();
            async move { client.get_prompt(&name, arguments).await }
        })
        .await
    }

    /// Close and forget everything belonging to `session_id`.
    ///
    /// In-flight connection attempts for the session are abandoned; if one
    /// completes later its client is closed rather than pooled.
    pub async fn disconnect_session(&self, session_id: &str) {
        let drained = {
            let mut state = self.inner.state.lock();
            let drained = state.drain_session(session_id);
            if state.clients.is_empty() {
                state.stop_cleanup();
            }
            drained
        };

        if drained.clients.is_empty() && drained.pending == 0 && drained.providers == 0 {
            debug!(session_id = %session_id, "[SkillMcpManager] Nothing to disconnect for session");
            return;
        }

        info!(
            session_id = %session_id,
            clients = drained.clients.len(),
            pending = drained.pending,
            "[SkillMcpManager] Disconnecting session"
        );
        close_clients(drained.clients).await;
    }

    /// Close every client and stop background tasks.
    pub async fn disconnect_all(&self) {
        let (clients, signals) = {
            let mut state = self.inner.state.lock();
            let clients = state.drain_all();
            state.stop_cleanup();
            (clients, state.signals.take())
        };
        drop(signals);

        info!(
            count = clients.len(),
            "[SkillMcpManager] Disconnecting all MCP clients"
        );
        close_clients(clients).await;
    }

    pub fn is_connected(&self, identity: &ClientIdentity) -> bool {
        self.inner
            .state
            .lock()
            .clients
            .contains_key(&identity.pool_key())
    }

    /// Snapshot of pooled clients, sorted by pool key.
    pub fn connected_servers(&self) -> Vec<ConnectedServer> {
        let state = self.inner.state.lock();
        let mut servers: Vec<ConnectedServer> = state
            .clients
            .iter()
            .map(|(key, managed)| ConnectedServer {
                pool_key: key.clone(),
                identity: managed.identity.clone(),
                transport_type: managed.transport_type,
                idle_for: managed.idle_duration(),
            })
            .collect();
        servers.sort_by(|a, b| a.pool_key.cmp(&b.pool_key));
        servers
    }

    /// Number of connection attempts in flight
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.inner.state.lock().is_cleanup_running()
    }

    pub fn has_signal_handlers(&self) -> bool {
        self.inner.state.lock().signals.is_some()
    }

    /// OAuth provider for `identity`, if its server declares `oauth`.
    pub(crate) fn auth_provider(
        &self,
        identity: &ClientIdentity,
        config: &RawServerConfig,
    ) -> Option<Arc<dyn OAuthProvider>> {
        self.inner.state.lock().auth_providers.get_or_create(
            identity,
            config,
            self.inner.oauth_factory.as_ref(),
        )
    }

    /// Force-close `client` and drop it from the pool, unless it was already
    /// replaced by a newer connection.
    pub(crate) async fn evict_client(
        &self,
        identity: &ClientIdentity,
        client: &Arc<dyn McpConnection>,
    ) {
        let key = identity.pool_key();
        let evicted = self.inner.state.lock().evict_if_same(&key, client);
        if evicted.is_some() {
            debug!(pool_key = %key, "[SkillMcpManager] Evicted MCP client");
        }
        close_quietly(&identity.server_name, client).await;
    }
}

impl ManagerInner {
    /// Start the idle sweep and signal listener if they are not running.
    fn ensure_background_tasks(&self, state: &mut ManagerState, weak: &Weak<ManagerInner>) {
        if !state.is_cleanup_running() {
            state.cleanup_generation += 1;
            state.cleanup = Some(spawn_idle_cleanup(
                weak.clone(),
                self.config.cleanup_interval,
                state.cleanup_generation,
            ));
        }

        if self.config.handle_signals && state.signals.is_none() {
            let weak = weak.clone();
            match SignalGuard::install(self.config.exit_on_signal, move |_signal| async move {
                if let Some(inner) = weak.upgrade() {
                    inner.teardown_from_signal().await;
                }
            }) {
                Ok(guard) => state.signals = Some(guard),
                Err(e) => warn!(
                    error = %e,
                    "[SkillMcpManager] Failed to install signal handlers"
                ),
            }
        }
    }

    /// Teardown run by the signal listener task itself.
    async fn teardown_from_signal(&self) {
        let (clients, signals) = {
            let mut state = self.state.lock();
            let clients = state.drain_all();
            state.stop_cleanup();
            (clients, state.signals.take())
        };
        if let Some(guard) = signals {
            guard.detach();
        }

        info!(
            count = clients.len(),
            "[SignalTeardown] Closing MCP clients"
        );
        close_clients(clients).await;
    }
}

/// Run the connection attempt on its own task so it settles even if every
/// awaiter goes away.
fn spawn_connect(
    weak: Weak<ManagerInner>,
    identity: ClientIdentity,
    attempt_id: u64,
    transport: Box<dyn Transport>,
) -> ConnectFuture {
    let task_weak = weak.clone();
    let task_identity = identity.clone();
    let handle = tokio::spawn(async move {
        let result = transport.connect().await;
        settle(&task_weak, &task_identity, attempt_id, result).await
    });

    async move {
        match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .state
                        .lock()
                        .clear_pending(&identity.pool_key(), attempt_id);
                }
                Err(McpError::Connection(format!(
                    "Connection task for MCP server \"{}\" failed: {}",
                    identity.server_name, join_error
                )))
            }
        }
    }
    .boxed()
    .shared()
}

/// Move a finished attempt out of `pending`: into the pool on success, or
/// closed if the attempt was torn down while it was in flight.
async fn settle(
    weak: &Weak<ManagerInner>,
    identity: &ClientIdentity,
    attempt_id: u64,
    result: McpResult<Arc<dyn McpConnection>>,
) -> McpResult<Arc<dyn McpConnection>> {
    let key = identity.pool_key();

    let Some(inner) = weak.upgrade() else {
        if let Ok(client) = &result {
            close_quietly(&identity.server_name, client).await;
        }
        return Err(torn_down(identity));
    };

    let orphan = {
        let mut state = inner.state.lock();
        let ours = state.clear_pending(&key, attempt_id);
        match &result {
            Ok(client) if ours => {
                state
                    .clients
                    .insert(key.clone(), ManagedClient::new(identity.clone(), Arc::clone(client)));
                inner.ensure_background_tasks(&mut state, weak);
                None
            }
            Ok(client) => Some(Arc::clone(client)),
            Err(_) => None,
        }
    };

    match (result, orphan) {
        (Ok(_), Some(client)) => {
            info!(
                pool_key = %key,
                "[SkillMcpManager] Connection finished after teardown, closing it"
            );
            close_quietly(&identity.server_name, &client).await;
            Err(torn_down(identity))
        }
        (Ok(client), None) => {
            info!(pool_key = %key, "[SkillMcpManager] MCP client pooled");
            Ok(client)
        }
        (Err(e), _) => {
            warn!(pool_key = %key, error = %e, "[SkillMcpManager] Connection failed");
            Err(e)
        }
    }
}

fn torn_down(identity: &ClientIdentity) -> McpError {
    McpError::Connection(format!(
        "Connection to MCP server \"{}\" (skill \"{}\") was torn down while it was being established",
        identity.server_name, identity.skill_name
    ))
}

impl std::fmt::Debug for SkillMcpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SkillMcpManager")
            .field("clients", &state.clients.len())
            .field("pending", &state.pending.len())
            .field("auth_providers", &state.auth_providers.len())
            .finish()
    }
}
