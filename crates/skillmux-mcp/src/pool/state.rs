//! Mutable pool state
//!
//! Everything a manager owns lives in one `ManagerState` behind a
//! `parking_lot::Mutex`. The lock is never held across an `.await`, so every
//! check-then-insert below is atomic with respect to other tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use skillmux_core::{ClientIdentity, McpResult};
use tokio::task::JoinHandle;

use super::instance::{ManagedClient, McpConnection};
use super::oauth::AuthProviderRegistry;
use super::signals::SignalGuard;

/// A connection attempt every caller for one pool key awaits.
pub(crate) type ConnectFuture = Shared<BoxFuture<'static, McpResult<Arc<dyn McpConnection>>>>;

pub(crate) struct PendingEntry {
    /// Distinguishes this attempt from a later one for the same key
    pub attempt_id: u64,
    pub identity: ClientIdentity,
    pub future: ConnectFuture,
}

/// What `drain_session` removed
#[derive(Default)]
pub(crate) struct SessionDrain {
    pub clients: Vec<ManagedClient>,
    pub pending: usize,
    pub providers: usize,
}

#[derive(Default)]
pub(crate) struct ManagerState {
    pub clients: HashMap<String, ManagedClient>,
    pub pending: HashMap<String, PendingEntry>,
    pub auth_providers: AuthProviderRegistry,
    pub cleanup: Option<JoinHandle<()>>,
    /// Bumped each time a sweep loop is started
    pub cleanup_generation: u64,
    pub signals: Option<SignalGuard>,
    next_attempt_id: u64,
}

impl ManagerState {
    pub fn next_attempt_id(&mut self) -> u64 {
        self.next_attempt_id += 1;
        self.next_attempt_id
    }

    /// Remove the pending entry for `key` if it still belongs to `attempt_id`.
    pub fn clear_pending(&mut self, key: &str, attempt_id: u64) -> bool {
        match self.pending.get(key) {
            Some(entry) if entry.attempt_id == attempt_id => {
                self.pending.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Remove `key` only if it still holds `client`.
    pub fn evict_if_same(
        &mut self,
        key: &str,
        client: &Arc<dyn McpConnection>,
    ) -> Option<ManagedClient> {
        let same = self
            .clients
            .get(key)
            .map(|managed| same_connection(&managed.client, client))
            .unwrap_or(false);
        if same {
            self.clients.remove(key)
        } else {
            None
        }
    }

    /// Remove every client idle strictly longer than `idle_timeout`.
    pub fn take_expired(&mut self, idle_timeout: Duration) -> Vec<ManagedClient> {
        let expired: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, managed)| managed.is_expired(idle_timeout))
            .map(|(key, _)| key.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|key| self.clients.remove(&key))
            .collect()
    }

    /// Remove clients, pending attempts and OAuth providers of one session.
    pub fn drain_session(&mut self, session_id: &str) -> SessionDrain {
        let keys: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, managed)| managed.identity.in_session(session_id))
            .map(|(key, _)| key.clone())
            .collect();
        let clients = keys
            .into_iter()
            .filter_map(|key| self.clients.remove(&key))
            .collect();

        let pending_before = self.pending.len();
        self.pending
            .retain(|_, entry| !entry.identity.in_session(session_id));

        SessionDrain {
            clients,
            pending: pending_before - self.pending.len(),
            providers: self.auth_providers.remove_session(session_id),
        }
    }

    /// Remove all clients, pending attempts and OAuth providers.
    pub fn drain_all(&mut self) -> Vec<ManagedClient> {
        self.pending.clear();
        self.auth_providers.clear();
        self.clients.drain().map(|(_, managed)| managed).collect()
    }

    /// Abort the idle sweep, if running.
    pub fn stop_cleanup(&mut self) {
        if let Some(handle) = self.cleanup.take() {
            handle.abort();
        }
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ManagerState {
    fn drop(&mut self) {
        self.stop_cleanup();
    }
}

/// Identity comparison on the data pointer only.
pub(crate) fn same_connection(a: &Arc<dyn McpConnection>, b: &Arc<dyn McpConnection>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
