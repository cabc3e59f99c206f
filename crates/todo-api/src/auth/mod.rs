//! Authentication and authorization core.
//!
//! # Components
//!
//! - `jwks` - Key resolver: OIDC discovery plus signing key set cache
//! - `jwt` - Token validator: RS256 signature and registered claims
//! - `claims` - Decoded token claims
//! - `policy` - Audience and scope checks on decoded claims
//! - `subject_cache` - Bounded, expiring cache of authorized subjects
//! - `exchange` - On-behalf-of exchange and downstream credential fetch
//! - `context` - `SecurityContext` tying the above together per request

pub mod claims;
pub mod context;
pub mod exchange;
pub mod jwks;
pub mod jwt;
pub mod policy;
pub mod subject_cache;

pub use claims::{Audience, DecodedToken};
pub use context::{AuthorizationOutcome, Grant, SecurityContext};
pub use exchange::{DownstreamCredential, OnBehalfOfExchange, TokenExchange};
pub use jwks::{KeyResolver, SigningKeySet};
pub use jwt::TokenValidator;
pub use policy::AuthorizationPolicy;
pub use subject_cache::SubjectCache;

use std::time::Duration;

/// Upper bound on TCP connect time for outbound calls.
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Build the HTTP client shared by discovery, key fetches and the exchange.
///
/// # Errors
///
/// Returns the underlying `reqwest` error if the TLS backend fails to initialize.
pub fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .connect_timeout(request_timeout.min(MAX_CONNECT_TIMEOUT))
        .build()
}
