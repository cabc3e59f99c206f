//! Test server harness for E2E testing
//!
//! Provides `TestTodoServer` for spawning real Todo API instances wired to a
//! `MockIdentityProvider`.

use crate::mock_idp::{MockIdentityProvider, TEST_SECRET_NAME};
use crate::token_builders::{TEST_AUDIENCE, TEST_ISSUER, TEST_TENANT_ID};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use todo_api::auth::{build_http_client, SecurityContext};
use todo_api::config::Config;
use todo_api::observability::metrics::init_metrics_recorder;
use todo_api::routes::{self, AppState};
use todo_api::storage::InMemoryStorageProvider;
use tokio::task::JoinHandle;

/// Client ID the test configuration uses for the exchange.
pub const TEST_CLIENT_ID: &str = "todo-api-test-client";

/// Client secret the test configuration uses for the exchange.
pub const TEST_CLIENT_SECRET: &str = "todo-api-test-secret";

/// The global recorder can only be installed once per process.
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Environment a test server is configured from, pointing at `idp`.
pub fn test_vars(idp: &MockIdentityProvider) -> HashMap<String, String> {
    HashMap::from([
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("OIDC_AUTHORITY".to_string(), idp.authority()),
        ("OIDC_TENANT_ID".to_string(), TEST_TENANT_ID.to_string()),
        ("JWT_ISSUER".to_string(), TEST_ISSUER.to_string()),
        ("JWT_AUDIENCES".to_string(), TEST_AUDIENCE.to_string()),
        ("CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
        ("CLIENT_SECRET".to_string(), TEST_CLIENT_SECRET.to_string()),
        ("KEY_VAULT_URL".to_string(), idp.vault_url()),
        ("STORAGE_SECRET_NAME".to_string(), TEST_SECRET_NAME.to_string()),
        ("OUTBOUND_HTTP_TIMEOUT_SECONDS".to_string(), "2".to_string()),
    ])
}

/// Test harness for spawning the Todo API in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_authorized_read() -> Result<()> {
///     let idp = MockIdentityProvider::start_with_keys(&[&TestRsaKey::primary()]).await;
///     let server = TestTodoServer::spawn(&idp).await?;
///     let token = TestTokenBuilder::new().sign(&TestRsaKey::primary());
///
///     let response = reqwest::Client::new()
///         .get(format!("{}/api/todolist", server.url()))
///         .bearer_auth(token)
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestTodoServer {
    addr: SocketAddr,
    config: Config,
    security: Arc<SecurityContext>,
    _handle: JoinHandle<()>,
}

impl TestTodoServer {
    /// Spawn a server configured against `idp`.
    pub async fn spawn(idp: &MockIdentityProvider) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(idp, &[]).await
    }

    /// Spawn a server configured against `idp` with extra or overriding
    /// environment variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with_vars(
        idp: &MockIdentityProvider,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = test_vars(idp);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let http_client = build_http_client(Duration::from_secs(
            config.outbound_http_timeout_seconds,
        ))
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        let security = Arc::new(SecurityContext::from_config(
            &config,
            http_client,
            Arc::new(InMemoryStorageProvider::new()),
        ));

        let state = Arc::new(AppState {
            security: Arc::clone(&security),
        });

        // Build routes using todo-api's real route builder
        let app = routes::build_routes(state, metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            security,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Security context shared with the running server.
    pub fn security(&self) -> &SecurityContext {
        &self.security
    }
}

impl Drop for TestTodoServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let idp = MockIdentityProvider::start().await;
        let server = TestTodoServer::spawn(&idp).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["status"], "healthy");

        // Health never calls out to the identity provider
        assert_eq!(idp.discovery_calls().await, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_server_config_points_at_idp() -> Result<(), anyhow::Error> {
        let idp = MockIdentityProvider::start().await;
        let server = TestTodoServer::spawn_with_vars(&idp, &[("JWT_CLOCK_SKEW_SECONDS", "30")])
            .await?;

        let config = server.config();
        assert_eq!(config.discovery_url, idp.discovery_url());
        assert_eq!(config.token_endpoint, idp.token_endpoint());
        assert_eq!(config.jwt_clock_skew_seconds, 30);
        assert_eq!(config.bind_address, "127.0.0.1:0");

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_servers_different_ports() -> Result<(), anyhow::Error> {
        let idp = MockIdentityProvider::start().await;
        let server1 = TestTodoServer::spawn(&idp).await?;
        let server2 = TestTodoServer::spawn(&idp).await?;

        assert_ne!(server1.addr(), server2.addr());
        assert!(server1.security().subject_cache().is_empty().await);

        Ok(())
    }
}
