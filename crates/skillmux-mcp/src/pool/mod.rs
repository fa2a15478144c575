//! Client Pool - MCP connection management for skills
//!
//! - **SkillMcpManager**: public surface; owns all pool state
//! - **ManagerState**: clients, pending connections, OAuth providers, task handles
//! - **Transport / TransportFactory**: open one connection (stdio, HTTP)
//! - **Idle cleanup**: periodic sweep that stops when the pool drains
//! - **Signal teardown**: SIGINT/SIGTERM bulk close
//! - **Retry coordinator**: stale-connection and OAuth step-up recovery

mod cleanup;
mod instance;
mod manager;
mod oauth;
mod retry;
mod signals;
mod state;
pub mod transport;

// Instance types
pub use instance::{ManagedClient, McpClient, McpClientHandler, McpConnection, RmcpConnection};

// Manager
pub use manager::{ConnectedServer, SkillMcpManager, SkillMcpManagerBuilder};

// OAuth
pub use oauth::{OAuthProvider, OAuthProviderFactory, UnconfiguredOAuthFactory};

// Signals
pub use signals::active_signal_listeners;

// Transports
pub use transport::{ResolvedTransport, RmcpTransportFactory, Transport, TransportFactory};
