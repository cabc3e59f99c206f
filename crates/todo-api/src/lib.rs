//! Todo API Service Library
//!
//! A small task-list HTTP API whose core is its authentication layer:
//!
//! - Validation of OAuth2/OIDC bearer tokens (RS256) against the identity
//!   provider's published signing keys
//! - Audience and scope authorization
//! - On-behalf-of token exchange for the downstream storage credential
//! - A bounded, expiring cache of already-authorized subjects
//!
//! # Request path
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth::SecurityContext -> handlers/todolist.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key resolver, token validator, policy, subject cache, exchange
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authorization and HTTP metrics middleware
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `storage` - Task-list document capability and providers

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod storage;
