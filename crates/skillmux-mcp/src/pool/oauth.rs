//! OAuth providers and scope step-up
//!
//! The pool never runs an authorization flow itself. It asks an
//! `OAuthProvider` for the cached token when opening an HTTP connection, and
//! calls `login()` when a server rejects a call for lack of scope. Providers
//! are built on first need by an `OAuthProviderFactory` and cached per pool
//! key until the session is disconnected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use skillmux_core::{
    ClientIdentity, McpError, McpResult, OAuthSettings, OAuthToken, RawServerConfig,
};
use tracing::{debug, info, warn};

/// Token source for one OAuth-enabled server.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Currently cached token, if any. Must not start an interactive flow.
    async fn tokens(&self) -> McpResult<Option<OAuthToken>>;

    /// Run (or re-run) authorization, asking for `required_scope` when the
    /// server named one.
    async fn login(&self, required_scope: Option<&str>) -> McpResult<OAuthToken>;
}

/// Creates the provider for one server identity.
pub trait OAuthProviderFactory: Send + Sync {
    fn create(
        &self,
        identity: &ClientIdentity,
        server_url: Option<&str>,
        settings: &OAuthSettings,
    ) -> Arc<dyn OAuthProvider>;
}

/// Default factory for embedders that never wired up OAuth.
///
/// Its providers have no tokens, and `login()` fails with a message saying so.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredOAuthFactory;

impl OAuthProviderFactory for UnconfiguredOAuthFactory {
    fn create(
        &self,
        identity: &ClientIdentity,
        _server_url: Option<&str>,
        _settings: &OAuthSettings,
    ) -> Arc<dyn OAuthProvider> {
        Arc::new(UnconfiguredProvider {
            server_name: identity.server_name.clone(),
        })
    }
}

struct UnconfiguredProvider {
    server_name: String,
}

#[async_trait]
impl OAuthProvider for UnconfiguredProvider {
    async fn tokens(&self) -> McpResult<Option<OAuthToken>> {
        Ok(None)
    }

    async fn login(&self, _required_scope: Option<&str>) -> McpResult<OAuthToken> {
        Err(McpError::Authorization(format!(
            "MCP server \"{}\" requires OAuth authorization, but no OAuth provider is configured. \
             Build the manager with `with_oauth_provider_factory` to enable login.",
            self.server_name
        )))
    }
}

struct AuthProviderEntry {
    identity: ClientIdentity,
    provider: Arc<dyn OAuthProvider>,
}

/// Providers by pool key
#[derive(Default)]
pub(crate) struct AuthProviderRegistry {
    providers: HashMap<String, AuthProviderEntry>,
}

impl AuthProviderRegistry {
    /// Provider for `identity`, created on first request.
    ///
    /// Returns `None` for servers without an `oauth` block.
    pub fn get_or_create(
        &mut self,
        identity: &ClientIdentity,
        config: &RawServerConfig,
        factory: &dyn OAuthProviderFactory,
    ) -> Option<Arc<dyn OAuthProvider>> {
        let settings = config.oauth.as_ref()?;
        let entry = self
            .providers
            .entry(identity.pool_key())
            .or_insert_with(|| {
                debug!(pool_key = %identity.pool_key(), "[OAuthProviders] Creating OAuth provider");
                AuthProviderEntry {
                    identity: identity.clone(),
                    provider: factory.create(identity, config.url.as_deref(), settings),
                }
            });
        Some(Arc::clone(&entry.provider))
    }

    /// Forget every provider of `session_id`, returning how many went.
    pub fn remove_session(&mut self, session_id: &str) -> usize {
        let before = self.providers.len();
        self.providers
            .retain(|_, entry| !entry.identity.in_session(session_id));
        before - self.providers.len()
    }

    pub fn clear(&mut self) {
        self.providers.clear();
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

/// Re-authorize after a scope shortfall.
///
/// Returns `Ok(true)` when a login ran and the caller should reconnect,
/// `Ok(false)` when `error` is not eligible (not a step-up, or the server has
/// no `oauth` block) and should propagate unchanged.
pub(crate) async fn handle_step_up(
    identity: &ClientIdentity,
    config: &RawServerConfig,
    provider: Option<Arc<dyn OAuthProvider>>,
    error: &McpError,
    login_timeout: Duration,
) -> McpResult<bool> {
    if !config.has_oauth() || !error.is_step_up() {
        return Ok(false);
    }
    let Some(provider) = provider else {
        return Ok(false);
    };

    let scope = error.required_scope();
    info!(
        pool_key = %identity.pool_key(),
        scope = ?scope,
        "[OAuthStepUp] Server requires additional OAuth scope, re-authorizing"
    );

    match tokio::time::timeout(login_timeout, provider.login(scope.as_deref())).await {
        Ok(Ok(_token)) => {
            info!(pool_key = %identity.pool_key(), "[OAuthStepUp] Login completed");
            Ok(true)
        }
        Ok(Err(e)) => {
            warn!(pool_key = %identity.pool_key(), error = %e, "[OAuthStepUp] Login failed");
            Err(match e {
                McpError::Authorization(_) => e,
                other => McpError::Authorization(format!(
                    "OAuth login for MCP server \"{}\" failed: {}",
                    identity.server_name, other
                )),
            })
        }
        Err(_) => {
            warn!(
                pool_key = %identity.pool_key(),
                timeout = ?login_timeout,
                "[OAuthStepUp] Login timed out"
            );
            Err(McpError::Authorization(format!(
                "OAuth login for MCP server \"{}\" timed out after {:?}",
                identity.server_name, login_timeout
            )))
        }
    }
}
