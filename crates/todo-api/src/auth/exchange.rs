//! On-behalf-of token exchange and downstream credential fetch.
//!
//! On a subject cache miss the inbound bearer token is traded at the
//! identity provider's token endpoint for an access token to the key vault,
//! which is then used to read the storage credential secret.
//!
//! # Security
//!
//! - The client secret and the fetched credential are `SecretString`s
//! - Neither the inbound token nor the vault token is logged
//! - Upstream error bodies are not echoed to callers

use crate::config::Config;
use crate::errors::AuthFailure;
use crate::observability::metrics::record_token_exchange;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::time::Instant;
use tracing::instrument;

/// OAuth grant type for the on-behalf-of flow.
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Key vault REST API version used for secret reads.
pub const KEY_VAULT_API_VERSION: &str = "7.0";

/// Credential obtained through the exchange, e.g. a storage account key.
#[derive(Clone)]
pub struct DownstreamCredential(SecretString);

impl DownstreamCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for DownstreamCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DownstreamCredential")
            .field(&"[REDACTED]")
            .finish()
    }
}

/// Trades an inbound bearer token for a downstream credential.
#[async_trait::async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange `bearer_token` for the downstream credential.
    ///
    /// # Errors
    ///
    /// - `AuthFailure::ExchangeRejected` if the token endpoint refuses
    /// - `AuthFailure::SecretFetchFailed` if the credential cannot be read
    async fn exchange(&self, bearer_token: &str) -> Result<DownstreamCredential, AuthFailure>;
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct SecretBundle {
    #[serde(default)]
    value: Option<String>,
}

/// Exchange against an OAuth token endpoint followed by a key vault read.
#[derive(Clone)]
pub struct OnBehalfOfExchange {
    http_client: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: SecretString,
    resource: String,
    vault_url: String,
    secret_name: String,
    secret_version: Option<String>,
}

impl OnBehalfOfExchange {
    /// Build an exchange from service configuration.
    pub fn from_config(config: &Config, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            token_endpoint: config.token_endpoint.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            resource: config.downstream_resource.clone(),
            vault_url: config.key_vault_url.trim_end_matches('/').to_string(),
            secret_name: config.storage_secret_name.clone(),
            secret_version: config.storage_secret_version.clone(),
        }
    }

    /// URL of the secret this exchange reads, without query string.
    pub fn secret_url(&self) -> String {
        match &self.secret_version {
            Some(version) => format!(
                "{}/secrets/{}/{}",
                self.vault_url, self.secret_name, version
            ),
            None => format!("{}/secrets/{}", self.vault_url, self.secret_name),
        }
    }

    async fn request_access_token(&self, bearer_token: &str) -> Result<String, AuthFailure> {
        let form = [
            ("grant_type", JWT_BEARER_GRANT_TYPE),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("resource", self.resource.as_str()),
            ("requested_token_use", "on_behalf_of"),
            ("scope", "openid"),
            ("assertion", bearer_token),
        ];

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "todo.auth.exchange", error = %e, "Token endpoint request failed");
                AuthFailure::ExchangeRejected
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                target: "todo.auth.exchange",
                status = %response.status(),
                "Token endpoint rejected on-behalf-of exchange"
            );
            return Err(AuthFailure::ExchangeRejected);
        }

        let body: TokenEndpointResponse = response.json().await.map_err(|e| {
            tracing::warn!(target: "todo.auth.exchange", error = %e, "Token endpoint returned invalid JSON");
            AuthFailure::ExchangeRejected
        })?;

        body.access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                tracing::warn!(target: "todo.auth.exchange", "Token endpoint response has no access_token");
                AuthFailure::ExchangeRejected
            })
    }

    async fn fetch_secret(&self, access_token: &str) -> Result<DownstreamCredential, AuthFailure> {
        let response = self
            .http_client
            .get(self.secret_url())
            .query(&[("api-version", KEY_VAULT_API_VERSION)])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "todo.auth.exchange", error = %e, "Key vault request failed");
                AuthFailure::SecretFetchFailed
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                target: "todo.auth.exchange",
                status = %response.status(),
                secret = %self.secret_name,
                "Key vault refused secret read"
            );
            return Err(AuthFailure::SecretFetchFailed);
        }

        let bundle: SecretBundle = response.json().await.map_err(|e| {
            tracing::warn!(target: "todo.auth.exchange", error = %e, "Key vault returned invalid JSON");
            AuthFailure::SecretFetchFailed
        })?;

        bundle
            .value
            .map(DownstreamCredential::new)
            .ok_or_else(|| {
                tracing::warn!(target: "todo.auth.exchange", secret = %self.secret_name, "Secret bundle has no value");
                AuthFailure::SecretFetchFailed
            })
    }
}

#[async_trait::async_trait]
impl TokenExchange for OnBehalfOfExchange {
    #[instrument(skip_all)]
    async fn exchange(&self, bearer_token: &str) -> Result<DownstreamCredential, AuthFailure> {
        let start = Instant::now();
        let access_token = self.request_access_token(bearer_token).await;
        record_token_exchange(
            "token",
            if access_token.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );
        let access_token = access_token?;

        let start = Instant::now();
        let credential = self.fetch_secret(&access_token).await;
        record_token_exchange(
            "secret",
            if credential.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );

        if credential.is_ok() {
            tracing::debug!(target: "todo.auth.exchange", "Downstream credential obtained");
        }
        credential
    }
}

/// Mock exchange module for testing.
///
/// This module provides a counting `TokenExchange` for use in tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock exchange that counts calls.
    pub struct MockTokenExchange {
        credential: String,
        failure: Option<AuthFailure>,
        delay: Duration,
        call_count: AtomicUsize,
    }

    impl MockTokenExchange {
        /// Create a mock that always returns `credential`.
        pub fn succeeding(credential: &str) -> Self {
            Self {
                credential: credential.to_string(),
                failure: None,
                delay: Duration::ZERO,
                call_count: AtomicUsize::new(0),
            }
        }

        /// Create a mock that always fails with `failure`.
        pub fn failing(failure: AuthFailure) -> Self {
            Self {
                credential: String::new(),
                failure: Some(failure),
                delay: Duration::ZERO,
                call_count: AtomicUsize::new(0),
            }
        }

        /// Sleep for `delay` before answering.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl TokenExchange for MockTokenExchange {
        async fn exchange(&self, _bearer_token: &str) -> Result<DownstreamCredential, AuthFailure> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match self.failure {
                Some(failure) => Err(failure),
                None => Ok(DownstreamCredential::new(self.credential.clone())),
            }
        }
    }
}
