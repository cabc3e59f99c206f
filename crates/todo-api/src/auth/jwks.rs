//! Key resolver: OIDC discovery and signing key set cache.
//!
//! The resolver reads the identity provider's discovery document, follows its
//! `jwks_uri`, and turns the RSA keys it finds into verification keys indexed
//! by key ID.
//!
//! # Caching
//!
//! - The key set is fetched on first use and then reused for the process lifetime
//! - Only one fetch runs at a time; callers waiting on it reuse its result
//! - An unknown `kid` may trigger one re-fetch per cooldown window, so a
//!   rotated key is picked up without letting bogus `kid` values hammer the
//!   identity provider
//!
//! # Security
//!
//! - Only `kty = "RSA"` keys usable for signatures are loaded
//! - HTTPS should be used in production (enforced by deployment config)

use crate::errors::AuthFailure;
use crate::observability::metrics::record_jwks_refresh;
use jsonwebtoken::DecodingKey;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Minimum time between refreshes triggered by an unknown `kid`.
pub const DEFAULT_UNKNOWN_KID_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

/// The subset of the OIDC discovery document the resolver needs.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcDiscoveryDocument {
    /// Issuer advertised by the provider (informational).
    #[serde(default)]
    pub issuer: Option<String>,

    /// Location of the signing key set.
    #[serde(default)]
    pub jwks_uri: String,
}

/// JSON Web Key from the provider's key set.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for usable keys).
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm hint.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Verification keys indexed by key ID.
#[derive(Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, DecodingKey>,
}

impl SigningKeySet {
    /// Build a key set from a JWKS document.
    ///
    /// Keys without a `kid`, non-RSA keys, encryption keys, keys advertising
    /// an algorithm other than RS256 and keys with undecodable components
    /// are skipped.
    pub fn from_jwks(document: JwksDocument) -> Self {
        let mut keys = HashMap::with_capacity(document.keys.len());

        for jwk in document.keys {
            let Some(kid) = jwk.kid.filter(|k| !k.is_empty()) else {
                tracing::debug!(target: "todo.auth.jwks", "Skipping JWK without kid");
                continue;
            };
            if jwk.kty != "RSA" {
                tracing::debug!(target: "todo.auth.jwks", kid = %kid, kty = %jwk.kty, "Skipping non-RSA JWK");
                continue;
            }
            if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                tracing::debug!(target: "todo.auth.jwks", kid = %kid, "Skipping non-signing JWK");
                continue;
            }
            if jwk.alg.as_deref().is_some_and(|a| a != "RS256") {
                tracing::debug!(target: "todo.auth.jwks", kid = %kid, "Skipping JWK for other algorithm");
                continue;
            }
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                tracing::warn!(target: "todo.auth.jwks", kid = %kid, "RSA JWK missing n or e");
                continue;
            };

            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(err) => {
                    tracing::warn!(target: "todo.auth.jwks", kid = %kid, error = %err, "Invalid RSA JWK components");
                }
            }
        }

        Self { keys }
    }

    /// Look up the verification key for `kid`.
    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    /// Whether the set holds a key for `kid`.
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for SigningKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<&String> = self.keys.keys().collect();
        kids.sort();
        f.debug_struct("SigningKeySet").field("kids", &kids).finish()
    }
}

/// Resolves key IDs to verification keys, fetching the key set on demand.
pub struct KeyResolver {
    /// URL of the OIDC discovery document.
    discovery_url: String,

    /// HTTP client with request/connect timeouts.
    http_client: reqwest::Client,

    /// Current key set, `None` until the first successful fetch.
    cache: RwLock<Option<Arc<SigningKeySet>>>,

    /// Serializes fetches; holds the instant of the last fetch attempt.
    refresh_lock: Mutex<Option<Instant>>,

    /// Whether an unknown `kid` may trigger a re-fetch.
    refresh_on_unknown_kid: bool,

    /// Minimum spacing between unknown-`kid` re-fetches.
    refresh_cooldown: Duration,
}

impl KeyResolver {
    /// Create a resolver for the given discovery document URL.
    pub fn new(discovery_url: String, http_client: reqwest::Client) -> Self {
        Self {
            discovery_url,
            http_client,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(None),
            refresh_on_unknown_kid: true,
            refresh_cooldown: DEFAULT_UNKNOWN_KID_REFRESH_COOLDOWN,
        }
    }

    /// Enable or disable re-fetching on an unknown `kid`.
    pub fn with_refresh_on_unknown_kid(mut self, enabled: bool) -> Self {
        self.refresh_on_unknown_kid = enabled;
        self
    }

    /// Override the unknown-`kid` refresh cooldown.
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Return the signing key set, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns `AuthFailure::DiscoveryError` if the discovery document or the
    /// key set cannot be fetched or parsed.
    #[instrument(skip_all)]
    pub async fn resolve(&self) -> Result<Arc<SigningKeySet>, AuthFailure> {
        if let Some(keys) = self.cached().await {
            return Ok(keys);
        }

        let mut last_attempt = self.refresh_lock.lock().await;

        // Another caller may have completed the fetch while we waited
        if let Some(keys) = self.cached().await {
            return Ok(keys);
        }

        *last_attempt = Some(Instant::now());
        self.refresh("initial").await
    }

    /// Resolve the verification key for `kid`.
    ///
    /// # Errors
    ///
    /// - `AuthFailure::DiscoveryError` if no key set has ever been fetched
    /// - `AuthFailure::UnknownKey` if `kid` is absent, after at most one
    ///   cooldown-bounded re-fetch
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn key(&self, kid: &str) -> Result<DecodingKey, AuthFailure> {
        let keys = self.resolve().await?;
        if let Some(key) = keys.get(kid) {
            return Ok(key.clone());
        }

        if !self.refresh_on_unknown_kid {
            tracing::warn!(target: "todo.auth.jwks", kid = %kid, "Key not found in JWKS");
            return Err(AuthFailure::UnknownKey);
        }

        let mut last_attempt = self.refresh_lock.lock().await;

        // A concurrent refresh may already have brought the key in
        if let Some(key) = self.cached().await.and_then(|k| k.get(kid).cloned()) {
            return Ok(key);
        }

        if let Some(at) = *last_attempt {
            if at.elapsed() < self.refresh_cooldown {
                tracing::debug!(target: "todo.auth.jwks", kid = %kid, "Unknown kid within refresh cooldown");
                return Err(AuthFailure::UnknownKey);
            }
        }

        *last_attempt = Some(Instant::now());
        let keys = match self.refresh("unknown_kid").await {
            Ok(keys) => keys,
            Err(_) => return Err(AuthFailure::UnknownKey),
        };

        keys.get(kid).cloned().ok_or_else(|| {
            tracing::warn!(target: "todo.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
            AuthFailure::UnknownKey
        })
    }

    async fn cached(&self) -> Option<Arc<SigningKeySet>> {
        self.cache.read().await.as_ref().map(Arc::clone)
    }

    /// Fetch discovery + key set and replace the cache. Caller holds `refresh_lock`.
    async fn refresh(&self, trigger: &'static str) -> Result<Arc<SigningKeySet>, AuthFailure> {
        let result = self.fetch_key_set().await;
        record_jwks_refresh(trigger, if result.is_ok() { "success" } else { "error" });

        let keys = Arc::new(result?);
        tracing::info!(
            target: "todo.auth.jwks",
            key_count = keys.len(),
            trigger,
            "JWKS cache refreshed"
        );

        *self.cache.write().await = Some(Arc::clone(&keys));
        Ok(keys)
    }

    async fn fetch_key_set(&self) -> Result<SigningKeySet, AuthFailure> {
        tracing::debug!(target: "todo.auth.jwks", url = %self.discovery_url, "Fetching OIDC discovery document");
        let discovery: OidcDiscoveryDocument = self.fetch_json(&self.discovery_url).await?;

        let jwks_uri = discovery.jwks_uri.trim();
        if jwks_uri.is_empty() {
            tracing::error!(target: "todo.auth.jwks", "Discovery document has empty jwks_uri");
            return Err(AuthFailure::DiscoveryError);
        }

        tracing::debug!(target: "todo.auth.jwks", url = %jwks_uri, "Fetching JWKS");
        let document: JwksDocument = self.fetch_json(jwks_uri).await?;

        Ok(SigningKeySet::from_jwks(document))
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AuthFailure> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::error!(target: "todo.auth.jwks", error = %e, url = %url, "Request to identity provider failed");
            AuthFailure::DiscoveryError
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "todo.auth.jwks",
                status = %response.status(),
                url = %url,
                "Identity provider returned error"
            );
            return Err(AuthFailure::DiscoveryError);
        }

        response.json::<T>().await.map_err(|e| {
            tracing::error!(target: "todo.auth.jwks", error = %e, url = %url, "Failed to parse identity provider response");
            AuthFailure::DiscoveryError
        })
    }
}
