//! Mock identity provider and key vault backed by `wiremock`.
//!
//! One `MockServer` plays every outbound collaborator of the API:
//! - `GET /{tenant}/v2.0/.well-known/openid-configuration` (discovery)
//! - `GET /{tenant}/discovery/v2.0/keys` (JWKS)
//! - `POST /{tenant}/oauth2/token` (on-behalf-of exchange)
//! - `GET /vault/secrets/{name}` (downstream credential)

use crate::crypto_fixtures::{jwks_json, TestRsaKey};
use crate::token_builders::TEST_TENANT_ID;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Access token the mock token endpoint issues by default.
pub const TEST_DOWNSTREAM_ACCESS_TOKEN: &str = "downstream-access-token";

/// Secret name the test configuration asks the vault for.
pub const TEST_SECRET_NAME: &str = "storage-account-key";

/// Secret value the mock vault returns by default.
pub const TEST_SECRET_VALUE: &str = "c3RvcmFnZS1hY2NvdW50LWtleQ==";

/// Wiremock-backed identity provider plus key vault.
pub struct MockIdentityProvider {
    server: MockServer,
}

impl MockIdentityProvider {
    /// Start an empty mock server. Nothing is mounted yet.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start a server serving discovery, the given signing keys, a
    /// successful exchange and the default vault secret.
    pub async fn start_with_keys(keys: &[&TestRsaKey]) -> Self {
        let idp = Self::start().await;
        idp.mount_signing_keys(keys).await;
        idp.mount_token_exchange_ok(TEST_DOWNSTREAM_ACCESS_TOKEN)
            .await;
        idp.mount_secret(TEST_SECRET_NAME, TEST_SECRET_VALUE).await;
        idp
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Authority to configure as `OIDC_AUTHORITY`.
    pub fn authority(&self) -> String {
        self.server.uri()
    }

    pub fn discovery_url(&self) -> String {
        format!(
            "{}/{TEST_TENANT_ID}/v2.0/.well-known/openid-configuration",
            self.server.uri()
        )
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}/{TEST_TENANT_ID}/discovery/v2.0/keys", self.server.uri())
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/{TEST_TENANT_ID}/oauth2/token", self.server.uri())
    }

    /// Base URL to configure as `KEY_VAULT_URL`.
    pub fn vault_url(&self) -> String {
        format!("{}/vault", self.server.uri())
    }

    /// Mount the discovery document pointing at `jwks_uri()`.
    pub async fn mount_discovery(&self) {
        Mock::given(method("GET"))
            .and(path(format!(
                "/{TEST_TENANT_ID}/v2.0/.well-known/openid-configuration"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": format!("{}/{TEST_TENANT_ID}/v2.0", self.server.uri()),
                "jwks_uri": self.jwks_uri(),
                "token_endpoint": self.token_endpoint(),
                "id_token_signing_alg_values_supported": ["RS256"],
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a JWKS document holding `keys`.
    pub async fn mount_jwks(&self, keys: &[&TestRsaKey]) {
        Mock::given(method("GET"))
            .and(path(format!("/{TEST_TENANT_ID}/discovery/v2.0/keys")))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .mount(&self.server)
            .await;
    }

    /// Mount discovery and a JWKS document holding `keys`.
    pub async fn mount_signing_keys(&self, keys: &[&TestRsaKey]) {
        self.mount_discovery().await;
        self.mount_jwks(keys).await;
    }

    /// Mount an on-behalf-of token endpoint that succeeds.
    pub async fn mount_token_exchange_ok(&self, access_token: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/{TEST_TENANT_ID}/oauth2/token")))
            .and(body_string_contains("requested_token_use=on_behalf_of"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": access_token,
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount an on-behalf-of token endpoint that answers with `status`.
    pub async fn mount_token_exchange_status(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(format!("/{TEST_TENANT_ID}/oauth2/token")))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": "temporarily_unavailable",
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a vault secret readable with the default downstream token.
    pub async fn mount_secret(&self, name: &str, value: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/vault/secrets/{name}")))
            .and(header(
                "authorization",
                format!("Bearer {TEST_DOWNSTREAM_ACCESS_TOKEN}").as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": format!("{}/secrets/{name}/0123456789abcdef", self.vault_url()),
                "value": value,
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a vault secret endpoint that answers with `status`.
    pub async fn mount_secret_status(&self, name: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/vault/secrets/{name}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the token endpoint has received.
    pub async fn token_exchange_calls(&self) -> usize {
        self.count_requests("POST", &format!("/{TEST_TENANT_ID}/oauth2/token"))
            .await
    }

    /// Number of requests the JWKS endpoint has received.
    pub async fn jwks_calls(&self) -> usize {
        self.count_requests("GET", &format!("/{TEST_TENANT_ID}/discovery/v2.0/keys"))
            .await
    }

    /// Number of requests the discovery endpoint has received.
    pub async fn discovery_calls(&self) -> usize {
        self.count_requests(
            "GET",
            &format!("/{TEST_TENANT_ID}/v2.0/.well-known/openid-configuration"),
        )
        .await
    }

    /// Number of secret reads for `name`.
    pub async fn secret_calls(&self, name: &str) -> usize {
        self.count_requests("GET", &format!("/vault/secrets/{name}"))
            .await
    }

    /// Form bodies posted to the token endpoint, in order.
    pub async fn token_exchange_bodies(&self) -> Vec<String> {
        let token_path = format!("/{TEST_TENANT_ID}/oauth2/token");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == token_path)
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }

    async fn count_requests(&self, verb: &str, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == verb && r.url.path() == request_path)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discovery_points_at_jwks() {
        let idp = MockIdentityProvider::start_with_keys(&[&TestRsaKey::primary()]).await;

        let discovery: serde_json::Value = reqwest::get(idp.discovery_url())
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(discovery["jwks_uri"], idp.jwks_uri());

        let jwks: serde_json::Value = reqwest::get(idp.jwks_uri())
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(jwks["keys"][0]["kid"], "test-key-01");

        assert_eq!(idp.discovery_calls().await, 1);
        assert_eq!(idp.jwks_calls().await, 1);
        assert_eq!(idp.token_exchange_calls().await, 0);
    }
}
