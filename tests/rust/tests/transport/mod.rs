//! Transport integration tests
//!
//! Classification of raw server entries, the child-process environment, and
//! the error surface of the stdio and HTTP adapters.

mod http;
