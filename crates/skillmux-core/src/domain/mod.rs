//! Domain entities
//!
//! - `ClientIdentity`: (session, skill, server) triple naming one pool slot
//! - `RawServerConfig`: per-server config handed over by the skill loader
//! - `OAuthSettings` / `OAuthToken`: OAuth declaration and cached credentials
//! - `TransportType`: stdio or http

mod config;
mod identity;
mod oauth;
mod transport;

pub use config::{RawServerConfig, ServerContext};
pub use identity::ClientIdentity;
pub use oauth::{OAuthSettings, OAuthToken};
pub use transport::TransportType;
