//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating signed (and deliberately mis-signed)
//! bearer tokens.

use crate::crypto_fixtures::TestRsaKey;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Tenant used by every test configuration.
pub const TEST_TENANT_ID: &str = "e3ac0f1c-5257-43b8-9658-d9d85f295942";

/// Issuer test tokens carry by default.
pub const TEST_ISSUER: &str =
    "https://login.example.com/e3ac0f1c-5257-43b8-9658-d9d85f295942/v2.0/";

/// Audience test tokens carry by default.
pub const TEST_AUDIENCE: &str = "62cda2d5-6552-438f-afeb-71f735b4c151";

/// Scope test tokens carry by default.
pub const TEST_SCOPE: &str = "user_impersonation";

/// Builder for creating test JWTs
///
/// Defaults produce a token the test configuration accepts: RS256, known
/// issuer and audience, `scp = user_impersonation`, expiring in 300 seconds.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_subject("alice-oid")
///     .with_scope("other_scope")
///     .sign(&TestRsaKey::primary());
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(TEST_ISSUER));
        claims.insert("aud".to_string(), json!(TEST_AUDIENCE));
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("oid".to_string(), json!("test-object-id"));
        claims.insert("scp".to_string(), json!(TEST_SCOPE));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(300)).timestamp()),
        );
        Self { claims }
    }

    /// Set the object ID (the subject cache key)
    pub fn for_subject(self, oid: &str) -> Self {
        self.claim("oid", json!(oid))
    }

    /// Set the `sub` claim
    pub fn with_sub(self, sub: &str) -> Self {
        self.claim("sub", json!(sub))
    }

    /// Set the `scp` claim
    pub fn with_scope(self, scope: &str) -> Self {
        self.claim("scp", json!(scope))
    }

    /// Set a single audience
    pub fn with_audience(self, audience: &str) -> Self {
        self.claim("aud", json!(audience))
    }

    /// Set a list of audiences
    pub fn with_audiences(self, audiences: &[&str]) -> Self {
        self.claim("aud", json!(audiences))
    }

    /// Set the issuer
    pub fn with_issuer(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.claim("exp", json!(exp))
    }

    /// Set `nbf` in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.claim("nbf", json!(nbf))
    }

    /// Set any claim
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with RS256 under the key's `kid`
    pub fn sign(&self, key: &TestRsaKey) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid().to_string());
        encode(&header, &self.build(), &key.encoding_key()).expect("RS256 signing")
    }

    /// Sign with RS256 but omit `kid` from the header
    pub fn sign_without_kid(&self, key: &TestRsaKey) -> String {
        let header = Header::new(Algorithm::RS256);
        encode(&header, &self.build(), &key.encoding_key()).expect("RS256 signing")
    }

    /// Sign with HS256 using a shared secret (algorithm confusion attempt)
    pub fn sign_hs256(&self, kid: &str, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        encode(&header, &self.build(), &EncodingKey::from_secret(secret)).expect("HS256 signing")
    }

    /// Produce an unsecured token with `alg: none` and an empty signature
    pub fn unsigned(&self, kid: &str) -> String {
        let header = json!({ "alg": "none", "typ": "JWT", "kid": kid });
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.build().to_string())
        )
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the signature segment of a token with one from another token.
pub fn swap_signature(token: &str, signature_from: &str) -> String {
    let mut parts: Vec<&str> = token.splitn(3, '.').collect();
    let signature = signature_from.rsplit('.').next().unwrap_or_default();
    if let Some(last) = parts.last_mut() {
        *last = signature;
    }
    parts.join(".")
}
