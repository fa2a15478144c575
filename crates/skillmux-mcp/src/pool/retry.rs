//! Operation retry coordinator
//!
//! Every manager operation runs through `with_retry`, which recovers from two
//! kinds of failure within one attempt budget (`ManagerConfig::max_attempts`):
//! - stale connection: evict the pooled client and try again on a fresh one
//! - OAuth scope shortfall on an `oauth` server: log in again (once per
//!   operation), evict, try again
//!
//! Anything else fails on first occurrence. Failing to acquire a client is not
//! retried here; the connection attempt has its own timeout.

use std::future::Future;
use std::sync::Arc;

use skillmux_core::{ClientIdentity, McpError, McpResult, ServerContext};
use tracing::{debug, warn};

use super::instance::McpConnection;
use super::manager::SkillMcpManager;
use super::oauth::handle_step_up;

impl SkillMcpManager {
    pub(crate) async fn with_retry<T, F, Fut>(
        &self,
        operation: &str,
        identity: &ClientIdentity,
        context: &ServerContext,
        op: F,
    ) -> McpResult<T>
    where
        F: Fn(Arc<dyn McpConnection>) -> Fut,
        Fut: Future<Output = McpResult<T>>,
    {
        let max_attempts = self.inner.config.max_attempts.max(1);
        let mut stepped_up = false;
        let mut last_error: Option<McpError> = None;

        for attempt in 1..=max_attempts {
            let client = self.get_or_create_client(identity, context).await?;

            let error = match op(Arc::clone(&client)).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            pool_key = %identity.pool_key(),
                            operation,
                            attempt,
                            "[SkillMcpManager] Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !stepped_up && context.config.has_oauth() && error.is_step_up() {
                let provider = self.auth_provider(identity, &context.config);
                let login_timeout = self.inner.config.login_timeout;
                if handle_step_up(identity, &context.config, provider, &error, login_timeout).await? {
                    stepped_up = true;
                    self.evict_client(identity, &client).await;
                    last_error = Some(error);
                    continue;
                }
                return Err(error);
            }

            if error.is_stale() {
                warn!(
                    pool_key = %identity.pool_key(),
                    operation,
                    attempt,
                    max_attempts,
                    error = %error,
                    "[SkillMcpManager] Stale MCP connection, reconnecting"
                );
                self.evict_client(identity, &client).await;
                last_error = Some(error);
                continue;
            }

            return Err(error);
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        warn!(
            pool_key = %identity.pool_key(),
            operation,
            attempts = max_attempts,
            "[SkillMcpManager] Giving up on MCP operation"
        );
        Err(McpError::RetriesExhausted {
            operation: operation.to_string(),
            server: identity.server_name.clone(),
            attempts: max_attempts,
            last,
        })
    }
}
