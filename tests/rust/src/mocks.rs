//! Mock transports, connections and OAuth providers
//!
//! The mocks share their counters through `Arc`s so a test can keep a handle
//! on the factory after giving a clone to the manager.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::model::{
    CallToolResult, Content, GetPromptResult, Prompt, ReadResourceResult, Resource, Tool,
};
use serde_json::{json, Map, Value};
use skillmux_core::{
    ClientIdentity, McpError, McpResult, OAuthSettings, OAuthToken, TransportType,
};
use skillmux_mcp::{
    McpConnection, OAuthProvider, OAuthProviderFactory, ResolvedTransport, Transport,
    TransportFactory,
};

// ============================================================================
// MockTransportFactory
// ============================================================================

#[derive(Default)]
struct MockShared {
    connect_delay: Mutex<Duration>,
    connect_failures: Mutex<VecDeque<McpError>>,
    call_failures: Mutex<VecDeque<McpError>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    calls: AtomicUsize,
    auth_providers_seen: Mutex<Vec<bool>>,
    identities: Mutex<Vec<ClientIdentity>>,
}

/// Transport factory whose connections are scripted in memory.
///
/// Connects succeed unless a failure was queued with `fail_next_connect`.
/// Operations succeed unless failures were queued with `fail_next_calls`;
/// the queue is shared by every connection, so it survives reconnects.
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    shared: Arc<MockShared>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.shared.connect_delay.lock() = delay;
        self
    }

    pub fn fail_next_connect(&self, error: McpError) {
        self.shared.connect_failures.lock().push_back(error);
    }

    pub fn fail_next_calls<I: IntoIterator<Item = McpError>>(&self, errors: I) {
        self.shared.call_failures.lock().extend(errors);
    }

    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    /// For each transport created, whether it was handed an OAuth provider
    pub fn auth_providers_seen(&self) -> Vec<bool> {
        self.shared.auth_providers_seen.lock().clone()
    }

    /// Identities transports were created for, in order
    pub fn identities(&self) -> Vec<ClientIdentity> {
        self.shared.identities.lock().clone()
    }

    pub fn as_factory(&self) -> Arc<dyn TransportFactory> {
        Arc::new(self.clone())
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        identity: &ClientIdentity,
        transport: &ResolvedTransport,
        auth_provider: Option<Arc<dyn OAuthProvider>>,
    ) -> Box<dyn Transport> {
        self.shared
            .auth_providers_seen
            .lock()
            .push(auth_provider.is_some());
        self.shared.identities.lock().push(identity.clone());
        Box::new(MockTransport {
            shared: Arc::clone(&self.shared),
            transport_type: transport.transport_type(),
            server_name: identity.server_name.clone(),
        })
    }
}

struct MockTransport {
    shared: Arc<MockShared>,
    transport_type: TransportType,
    server_name: String,
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> McpResult<Arc<dyn McpConnection>> {
        let id = self.shared.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.shared.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.shared.connect_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(Arc::new(MockConnection {
            id,
            shared: Arc::clone(&self.shared),
            transport_type: self.transport_type,
            closed: AtomicBool::new(false),
        }))
    }

    fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    fn description(&self) -> String {
        format!("mock:{}", self.server_name)
    }
}

// ============================================================================
// MockConnection
// ============================================================================

/// One scripted connection. `id` is the connect ordinal that produced it.
pub struct MockConnection {
    id: usize,
    shared: Arc<MockShared>,
    transport_type: TransportType,
    closed: AtomicBool,
}

impl MockConnection {
    fn begin_call(&self) -> McpResult<()> {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::StaleConnection("mock connection closed".into()));
        }
        match self.shared.call_failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl McpConnection for MockConnection {
    fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.begin_call()?;
        Ok(Vec::new())
    }

    async fn list_resources(&self) -> McpResult<Vec<Resource>> {
        self.begin_call()?;
        Ok(Vec::new())
    }

    async fn list_prompts(&self) -> McpResult<Vec<Prompt>> {
        self.begin_call()?;
        Ok(Vec::new())
    }

    async fn call_tool(
        &self,
        name: &str,
        _arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        self.begin_call()?;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{}@{}",
            name, self.id
        ))]))
    }

    async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        self.begin_call()?;
        serde_json::from_value(json!({ "contents": [{ "uri": uri, "text": "ok" }] }))
            .map_err(|e| McpError::Operation(e.to_string()))
    }

    async fn get_prompt(
        &self,
        _name: &str,
        _arguments: Option<Map<String, Value>>,
    ) -> McpResult<GetPromptResult> {
        self.begin_call()?;
        serde_json::from_value(json!({ "messages": [] }))
            .map_err(|e| McpError::Operation(e.to_string()))
    }

    async fn close(&self) -> McpResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ============================================================================
// MockOAuth
// ============================================================================

#[derive(Default)]
struct MockOAuthShared {
    token: Mutex<Option<OAuthToken>>,
    login_failure: Mutex<Option<McpError>>,
    logins: AtomicUsize,
    scopes: Mutex<Vec<Option<String>>>,
    providers_created: AtomicUsize,
}

/// OAuth provider factory whose providers share one token store.
#[derive(Clone, Default)]
pub struct MockOAuth {
    shared: Arc<MockOAuthShared>,
}

impl MockOAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, access_token: &str) -> Self {
        *self.shared.token.lock() = Some(OAuthToken::bearer(access_token));
        self
    }

    pub fn fail_login(&self, error: McpError) {
        *self.shared.login_failure.lock() = Some(error);
    }

    pub fn login_count(&self) -> usize {
        self.shared.logins.load(Ordering::SeqCst)
    }

    pub fn requested_scopes(&self) -> Vec<Option<String>> {
        self.shared.scopes.lock().clone()
    }

    pub fn providers_created(&self) -> usize {
        self.shared.providers_created.load(Ordering::SeqCst)
    }

    pub fn as_factory(&self) -> Arc<dyn OAuthProviderFactory> {
        Arc::new(self.clone())
    }
}

impl OAuthProviderFactory for MockOAuth {
    fn create(
        &self,
        _identity: &ClientIdentity,
        _server_url: Option<&str>,
        _settings: &OAuthSettings,
    ) -> Arc<dyn OAuthProvider> {
        self.shared.providers_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockOAuthProvider {
            shared: Arc::clone(&self.shared),
        })
    }
}

struct MockOAuthProvider {
    shared: Arc<MockOAuthShared>,
}

#[async_trait]
impl OAuthProvider for MockOAuthProvider {
    async fn tokens(&self) -> McpResult<Option<OAuthToken>> {
        Ok(self.shared.token.lock().clone())
    }

    async fn login(&self, required_scope: Option<&str>) -> McpResult<OAuthToken> {
        let n = self.shared.logins.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .scopes
            .lock()
            .push(required_scope.map(str::to_string));
        if let Some(err) = self.shared.login_failure.lock().clone() {
            return Err(err);
        }
        let token = OAuthToken::bearer(format!("fresh-{}", n));
        *self.shared.token.lock() = Some(token.clone());
        Ok(token)
    }
}
