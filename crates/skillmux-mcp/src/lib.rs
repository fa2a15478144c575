//! # SkillMux MCP Library
//!
//! Connection-lifecycle manager for the MCP servers that skills reference.
//!
//! This crate provides:
//! - A pool of MCP clients keyed by (session, skill, server)
//! - Deduplication of concurrent connection attempts for one key
//! - Stdio and Streamable HTTP transports (via `rmcp`)
//! - Idle eviction and crash-safe teardown on SIGINT/SIGTERM
//! - Transparent recovery from stale connections and OAuth step-up
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SkillMcpManager                          │
//! │  ┌──────────────────────┐  ┌──────────────────────┐            │
//! │  │ clients: key → Arc   │  │ pending: key → Shared │            │
//! │  │  "s1:docs:search" →  │  │  (one connect task    │            │
//! │  │   ManagedClient      │  │   per key in flight)  │            │
//! │  └──────────────────────┘  └──────────────────────┘            │
//! │   idle sweep (60s)   signal teardown   retry coordinator (×3)   │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │ classify
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ┌──────────────────┐  ┌──────────────────┐                    │
//! │  │  StdioTransport  │  │   HttpTransport  │                    │
//! │  │  (child process) │  │   (HTTP client)  │                    │
//! │  └──────────────────┘  └──────────────────┘                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skillmux_core::{ClientIdentity, ManagerConfig, RawServerConfig, ServerContext};
//! use skillmux_mcp::SkillMcpManager;
//!
//! let manager = SkillMcpManager::new(ManagerConfig::from_env());
//!
//! let identity = ClientIdentity::new("session-1", "git-helper", "github");
//! let context = ServerContext::new(
//!     "git-helper",
//!     RawServerConfig::stdio("npx", vec!["-y".into(), "@modelcontextprotocol/server-github".into()]),
//! );
//!
//! let tools = manager.list_tools(&identity, &context).await?;
//! let result = manager
//!     .call_tool(&identity, &context, "search_code", Some(args))
//!     .await?;
//!
//! manager.disconnect_session("session-1").await;
//! ```

pub mod pool;

pub use pool::{
    active_signal_listeners, ConnectedServer, ManagedClient, McpClientHandler, McpConnection,
    OAuthProvider, OAuthProviderFactory, ResolvedTransport, RmcpConnection, RmcpTransportFactory,
    SkillMcpManager, SkillMcpManagerBuilder, Transport, TransportFactory,
    UnconfiguredOAuthFactory,
};
