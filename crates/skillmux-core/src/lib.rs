//! # SkillMux Core Library
//!
//! Domain types shared by the SkillMux connection manager.
//!
//! ## Modules
//!
//! - `domain` - Identities, raw server configs, OAuth settings, transport kinds
//! - `error` - The `McpError` taxonomy used across the pool
//! - `redact` - Credential redaction for URLs that reach logs and errors
//! - `expand` - `${VAR}` placeholder expansion from the process environment
//! - `settings` - `ManagerConfig` tunables (timeouts, attempt budget, signals)
//! - `logging` - tracing subscriber setup for binaries embedding the manager

pub mod domain;
pub mod error;
pub mod expand;
pub mod logging;
pub mod redact;
pub mod settings;

// Re-export commonly used types
pub use domain::*;
pub use error::{McpError, McpResult};
pub use redact::redact_url;
pub use settings::ManagerConfig;
