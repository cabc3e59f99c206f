//! Per-process security context.
//!
//! `SecurityContext` owns the token validator, authorization policy, subject
//! cache, token exchange and storage provider. It is built once at startup,
//! shared through router state, and answers one question per request:
//! may this caller use the API, and with which storage capability?

use crate::auth::claims::DecodedToken;
use crate::auth::exchange::{DownstreamCredential, OnBehalfOfExchange, TokenExchange};
use crate::auth::jwks::KeyResolver;
use crate::auth::jwt::TokenValidator;
use crate::auth::policy::AuthorizationPolicy;
use crate::auth::subject_cache::SubjectCache;
use crate::config::Config;
use crate::errors::AuthFailure;
use crate::observability::metrics::record_auth_outcome;
use crate::storage::{StorageCapability, StorageProvider};
use axum::http::{header, HeaderMap, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Literal prefix of an `Authorization` header carrying a bearer token.
const BEARER_PREFIX: &str = "Bearer ";

/// What a subject is granted after its first successful authorization.
#[derive(Clone)]
pub struct Grant {
    pub credential: DownstreamCredential,
    pub capability: Arc<dyn StorageCapability>,
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grant")
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

/// Result of authorizing one request.
#[derive(Clone)]
pub enum AuthorizationOutcome {
    /// Caller may use the API through this capability.
    Authorized(Arc<dyn StorageCapability>),

    /// Caller is refused; `status` is the suggested HTTP status.
    Unauthorized {
        reason: AuthFailure,
        status: StatusCode,
    },
}

impl AuthorizationOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationOutcome::Authorized(_))
    }

    /// Failure reason, `None` when authorized.
    pub fn reason(&self) -> Option<AuthFailure> {
        match self {
            AuthorizationOutcome::Authorized(_) => None,
            AuthorizationOutcome::Unauthorized { reason, .. } => Some(*reason),
        }
    }
}

impl fmt::Debug for AuthorizationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationOutcome::Authorized(_) => f.write_str("Authorized"),
            AuthorizationOutcome::Unauthorized { reason, status } => f
                .debug_struct("Unauthorized")
                .field("reason", reason)
                .field("status", status)
                .finish(),
        }
    }
}

/// Security state shared by every request.
pub struct SecurityContext {
    validator: TokenValidator,
    policy: AuthorizationPolicy,
    cache: SubjectCache<Grant>,
    exchange: Arc<dyn TokenExchange>,
    storage: Arc<dyn StorageProvider>,
}

impl SecurityContext {
    pub fn new(
        validator: TokenValidator,
        policy: AuthorizationPolicy,
        cache: SubjectCache<Grant>,
        exchange: Arc<dyn TokenExchange>,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        Self {
            validator,
            policy,
            cache,
            exchange,
            storage,
        }
    }

    /// Wire the context from configuration.
    ///
    /// `http_client` is shared by discovery, key fetches and the exchange.
    pub fn from_config(
        config: &Config,
        http_client: reqwest::Client,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        let exchange = Arc::new(OnBehalfOfExchange::from_config(config, http_client.clone()));
        Self::with_exchange(config, http_client, exchange, storage)
    }

    /// Wire the context from configuration with a custom token exchange.
    pub fn with_exchange(
        config: &Config,
        http_client: reqwest::Client,
        exchange: Arc<dyn TokenExchange>,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        let resolver = Arc::new(
            KeyResolver::new(config.discovery_url.clone(), http_client)
                .with_refresh_on_unknown_kid(config.jwks_refresh_on_unknown_kid),
        );
        let validator = TokenValidator::new(
            resolver,
            &config.issuer,
            &config.audiences,
            config.jwt_clock_skew_seconds,
        );
        let policy =
            AuthorizationPolicy::new(config.audiences.clone(), config.required_scope.clone());
        let cache = SubjectCache::new(
            Duration::from_secs(config.subject_cache_ttl_seconds),
            config.subject_cache_max_entries,
        );

        Self::new(validator, policy, cache, exchange, storage)
    }

    pub fn subject_cache(&self) -> &SubjectCache<Grant> {
        &self.cache
    }

    /// Authorize a request from its headers.
    ///
    /// Every failure becomes `Unauthorized` with status 401. Nothing is
    /// cached for a subject whose exchange or storage open fails.
    #[instrument(skip_all)]
    pub async fn authorize(&self, headers: &HeaderMap) -> AuthorizationOutcome {
        match self.authorize_request(headers).await {
            Ok(capability) => {
                record_auth_outcome("authorized");
                AuthorizationOutcome::Authorized(capability)
            }
            Err(reason) => {
                record_auth_outcome(reason.reason());
                tracing::info!(
                    target: "todo.auth",
                    reason = reason.reason(),
                    "Request not authorized"
                );
                AuthorizationOutcome::Unauthorized {
                    reason,
                    status: reason.status(),
                }
            }
        }
    }

    async fn authorize_request(
        &self,
        headers: &HeaderMap,
    ) -> Result<Arc<dyn StorageCapability>, AuthFailure> {
        let token = bearer_token(headers)?;
        let claims = self.validator.validate(token).await?;
        self.policy.authorize(&claims)?;

        let grant = self
            .cache
            .get_or_create(claims.subject_id(), || self.produce_grant(token, &claims))
            .await?;

        Ok(grant.capability)
    }

    async fn produce_grant(&self, token: &str, claims: &DecodedToken) -> Result<Grant, AuthFailure> {
        tracing::debug!(
            target: "todo.auth",
            issuer = %claims.iss,
            "Subject not cached, exchanging token"
        );

        let credential = self.exchange.exchange(token).await?;
        let capability = self.storage.open(&credential).await?;

        Ok(Grant {
            credential,
            capability,
        })
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthFailure> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthFailure::MissingHeader)?;

    let value = value.to_str().map_err(|_| AuthFailure::MalformedToken)?;

    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthFailure::MalformedToken),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::exchange::mock::MockTokenExchange;
    use crate::storage::InMemoryStorageProvider;
    use axum::http::HeaderValue;
    use bytes::Bytes;
    use std::collections::HashMap;
    use todo_test_utils::crypto_fixtures::TestRsaKey;
    use todo_test_utils::mock_idp::MockIdentityProvider;
    use todo_test_utils::token_builders::{
        TestTokenBuilder, TEST_AUDIENCE, TEST_ISSUER, TEST_TENANT_ID,
    };

    fn config_for(idp: &MockIdentityProvider) -> Config {
        let vars = HashMap::from([
            ("OIDC_AUTHORITY".to_string(), idp.authority()),
            ("OIDC_TENANT_ID".to_string(), TEST_TENANT_ID.to_string()),
            ("JWT_ISSUER".to_string(), TEST_ISSUER.to_string()),
            ("JWT_AUDIENCES".to_string(), TEST_AUDIENCE.to_string()),
            ("CLIENT_ID".to_string(), "todo-api-client".to_string()),
            ("CLIENT_SECRET".to_string(), "client-secret".to_string()),
            ("KEY_VAULT_URL".to_string(), idp.vault_url()),
            ("STORAGE_SECRET_NAME".to_string(), "storage-account-key".to_string()),
        ]);
        Config::from_vars(&vars).unwrap()
    }

    async fn context_with(exchange: Arc<MockTokenExchange>) -> (MockIdentityProvider, SecurityContext) {
        let idp = MockIdentityProvider::start().await;
        idp.mount_signing_keys(&[&TestRsaKey::primary()]).await;

        let client = crate::auth::build_http_client(Duration::from_secs(2)).unwrap();
        let context = SecurityContext::with_exchange(
            &config_for(&idp),
            client,
            exchange,
            Arc::new(InMemoryStorageProvider::new()),
        );
        (idp, context)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&bearer("abc")).unwrap(), "abc");
        assert_eq!(
            bearer_token(&HeaderMap::new()).unwrap_err(),
            AuthFailure::MissingHeader
        );

        for value in ["Basic dXNlcjpwYXNz", "bearer abc", "Bearer ", "Bearerabc"] {
            let mut headers = HeaderMap::new();
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
            assert_eq!(
                bearer_token(&headers).unwrap_err(),
                AuthFailure::MalformedToken,
                "header {value:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_valid_token_is_authorized() {
        let exchange = Arc::new(MockTokenExchange::succeeding("account-key"));
        let (_idp, context) = context_with(Arc::clone(&exchange)).await;

        let token = TestTokenBuilder::new().sign(&TestRsaKey::primary());
        let outcome = context.authorize(&bearer(&token)).await;

        assert!(outcome.is_authorized(), "{outcome:?}");
        assert_eq!(exchange.call_count(), 1);
        assert_eq!(context.subject_cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_other_scope_is_scope_mismatch() {
        let exchange = Arc::new(MockTokenExchange::succeeding("account-key"));
        let (_idp, context) = context_with(Arc::clone(&exchange)).await;

        let token = TestTokenBuilder::new()
            .with_scope("other_scope")
            .sign(&TestRsaKey::primary());
        let outcome = context.authorize(&bearer(&token)).await;

        match outcome {
            AuthorizationOutcome::Unauthorized { reason, status } => {
                assert_eq!(reason, AuthFailure::ScopeMismatch);
                assert_eq!(status, StatusCode::UNAUTHORIZED);
            }
            AuthorizationOutcome::Authorized(_) => panic!("expected Unauthorized"),
        }
        assert_eq!(exchange.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_header() {
        let exchange = Arc::new(MockTokenExchange::succeeding("account-key"));
        let (_idp, context) = context_with(exchange).await;

        let outcome = context.authorize(&HeaderMap::new()).await;

        assert_eq!(outcome.reason(), Some(AuthFailure::MissingHeader));
    }

    #[tokio::test]
    async fn test_cached_subject_skips_exchange_and_shares_capability() {
        let exchange = Arc::new(MockTokenExchange::succeeding("account-key"));
        let (_idp, context) = context_with(Arc::clone(&exchange)).await;
        let token = TestTokenBuilder::new()
            .for_subject("alice")
            .sign(&TestRsaKey::primary());

        let AuthorizationOutcome::Authorized(first) = context.authorize(&bearer(&token)).await
        else {
            panic!("first request should be authorized");
        };
        first
            .update_content(Bytes::from_static(b"tasks"))
            .await
            .unwrap();

        let AuthorizationOutcome::Authorized(second) = context.authorize(&bearer(&token)).await
        else {
            panic!("second request should be authorized");
        };

        assert_eq!(second.get_content().await.unwrap(), "tasks");
        assert_eq!(exchange.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cached_subject_still_needs_valid_token() {
        let exchange = Arc::new(MockTokenExchange::succeeding("account-key"));
        let (_idp, context) = context_with(Arc::clone(&exchange)).await;

        let good = TestTokenBuilder::new()
            .for_subject("alice")
            .sign(&TestRsaKey::primary());
        assert!(context.authorize(&bearer(&good)).await.is_authorized());

        let expired = TestTokenBuilder::new()
            .for_subject("alice")
            .expires_in(-60)
            .sign(&TestRsaKey::primary());
        assert_eq!(
            context.authorize(&bearer(&expired)).await.reason(),
            Some(AuthFailure::Expired)
        );
    }

    #[tokio::test]
    async fn test_exchange_failure_is_not_cached() {
        let exchange = Arc::new(MockTokenExchange::failing(AuthFailure::ExchangeRejected));
        let (_idp, context) = context_with(Arc::clone(&exchange)).await;
        let token = TestTokenBuilder::new().sign(&TestRsaKey::primary());

        for _ in 0..2 {
            let outcome = context.authorize(&bearer(&token)).await;
            assert_eq!(outcome.reason(), Some(AuthFailure::ExchangeRejected));
        }

        assert!(context.subject_cache().is_empty().await);
        assert_eq!(exchange.call_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_exchange_once() {
        let exchange = Arc::new(
            MockTokenExchange::succeeding("account-key").with_delay(Duration::from_millis(50)),
        );
        let (_idp, context) = context_with(Arc::clone(&exchange)).await;
        let context = Arc::new(context);
        let token = TestTokenBuilder::new()
            .for_subject("alice")
            .sign(&TestRsaKey::primary());

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let context = Arc::clone(&context);
                let headers = bearer(&token);
                tokio::spawn(async move { context.authorize(&headers).await })
            })
            .collect();

        for outcome in futures::future::join_all(tasks).await {
            assert!(outcome.unwrap().is_authorized());
        }
        assert_eq!(exchange.call_count(), 1);
    }
}
