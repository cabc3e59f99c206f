//! Decoded token claims.
//!
//! Contains the claims extracted from validated JWTs. The `sub` and `oid`
//! fields identify a person and are redacted in Debug output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `aud` claim: a single audience or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `audience` is one of the token's audiences.
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|a| a == audience),
        }
    }

    /// Whether any of `accepted` is one of the token's audiences.
    pub fn intersects(&self, accepted: &[String]) -> bool {
        accepted.iter().any(|a| self.contains(a))
    }
}

/// Claims of a token whose signature and registered claims were verified.
///
/// Missing `iss`, `aud`, `sub`, `exp` or `iat` fails deserialization.
#[derive(Clone, Serialize, Deserialize)]
pub struct DecodedToken {
    /// Issuer.
    pub iss: String,

    /// Audience(s).
    pub aud: Audience,

    /// Subject - redacted in Debug output.
    pub sub: String,

    /// Object ID of the user at the identity provider - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,

    /// Space-separated delegated scopes.
    #[serde(default)]
    pub scp: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

/// Custom Debug implementation that redacts `sub` and `oid`.
impl fmt::Debug for DecodedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedToken")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("sub", &"[REDACTED]")
            .field("oid", &self.oid.as_ref().map(|_| "[REDACTED]"))
            .field("scp", &self.scp)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .finish()
    }
}

impl DecodedToken {
    /// Stable identifier of the authenticated user.
    ///
    /// The object ID when present and non-empty, otherwise `sub`.
    pub fn subject_id(&self) -> &str {
        match self.oid.as_deref() {
            Some(oid) if !oid.is_empty() => oid,
            _ => &self.sub,
        }
    }
}
