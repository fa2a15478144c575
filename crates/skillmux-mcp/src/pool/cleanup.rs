//! Idle cleanup
//!
//! A periodic sweep closes clients nobody has used for `idle_timeout`. The
//! sweep task only exists while the pool holds clients: it is started when a
//! client is pooled and ends itself once a sweep leaves the pool empty.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::instance::{ManagedClient, McpConnection};
use super::manager::{ManagerInner, SkillMcpManager};

/// Close one client, logging instead of failing.
pub(crate) async fn close_quietly(server_name: &str, client: &Arc<dyn McpConnection>) {
    if let Err(e) = client.close().await {
        debug!(server = %server_name, error = %e, "[IdleCleanup] Ignoring error while closing MCP client");
    }
}

/// Close a batch of evicted clients concurrently.
pub(crate) async fn close_clients(clients: Vec<ManagedClient>) {
    join_all(
        clients
            .iter()
            .map(|managed| close_quietly(&managed.identity.server_name, &managed.client)),
    )
    .await;
}

/// Start the sweep loop. The task holds only a weak reference, so it never
/// keeps a dropped manager alive.
///
/// `generation` identifies this loop; a loop that finds a newer generation in
/// the state has been superseded and exits.
pub(crate) fn spawn_idle_cleanup(
    inner: Weak<ManagerInner>,
    period: Duration,
    generation: u64,
) -> JoinHandle<()> {
    debug!(interval = ?period, generation, "[IdleCleanup] Starting idle sweep");
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let (evicted, drained) = {
                let mut state = inner.state.lock();
                if state.cleanup_generation != generation {
                    break;
                }
                let evicted = state.take_expired(inner.config.idle_timeout);
                let drained = state.clients.is_empty();
                if drained {
                    // Detach our own handle; aborting it here would cancel the closes below.
                    state.cleanup.take();
                }
                (evicted, drained)
            };

            if !evicted.is_empty() {
                info!(
                    count = evicted.len(),
                    "[IdleCleanup] Closing idle MCP clients"
                );
                close_clients(evicted).await;
            }

            if drained {
                debug!("[IdleCleanup] Pool is empty, stopping idle sweep");
                break;
            }
        }
    })
}

impl SkillMcpManager {
    /// Run one idle sweep now. Returns the number of clients closed.
    ///
    /// Stops the periodic sweep if this leaves the pool empty.
    pub async fn cleanup_idle(&self) -> usize {
        let evicted = {
            let mut state = self.inner.state.lock();
            let evicted = state.take_expired(self.inner.config.idle_timeout);
            if state.clients.is_empty() {
                state.stop_cleanup();
            }
            evicted
        };

        let count = evicted.len();
        if count > 0 {
            info!(count, "[IdleCleanup] Closing idle MCP clients");
            close_clients(evicted).await;
        }
        count
    }
}
