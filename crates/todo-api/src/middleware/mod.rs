//! HTTP middleware for the Todo API.
//!
//! # Components
//!
//! - `auth` - Authorization of protected routes via `SecurityContext`
//! - `http_metrics` - Request count and latency for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthorizedStorage};
pub use http_metrics::http_metrics_middleware;
