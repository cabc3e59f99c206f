//! Health and metrics endpoint integration tests.
//!
//! Tests the public endpoints using the `TestTodoServer` harness.

use todo_test_utils::{MockIdentityProvider, TestRsaKey, TestTodoServer, TestTokenBuilder};

/// Test that health endpoint returns 200 and healthy status.
#[tokio::test]
async fn test_health_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start().await;
    let server = TestTodoServer::spawn(&idp).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert!(
        content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json")),
        "Expected application/json content type, got {:?}",
        content_type
    );

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cached_subjects"], 0);

    Ok(())
}

/// Test that health does not depend on the identity provider being up.
#[tokio::test]
async fn test_health_ignores_identity_provider() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start().await;
    let server = TestTodoServer::spawn_with_vars(
        &idp,
        &[(
            "OIDC_DISCOVERY_URL",
            "http://127.0.0.1:1/.well-known/openid-configuration",
        )],
    )
    .await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

/// Test that non-existent routes return 404.
#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start().await;
    let server = TestTodoServer::spawn(&idp).await?;

    let response = reqwest::get(format!("{}/api/v1/nonexistent", server.url())).await?;

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    Ok(())
}

/// Test that an authorized caller using an unsupported method gets 405.
#[tokio::test]
async fn test_todolist_post_is_method_not_allowed() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start_with_keys(&[&TestRsaKey::primary()]).await;
    let server = TestTodoServer::spawn(&idp).await?;
    let token = TestTokenBuilder::new().sign(&TestRsaKey::primary());

    let response = reqwest::Client::new()
        .post(format!("{}/api/todolist", server.url()))
        .bearer_auth(&token)
        .body("[]")
        .send()
        .await?;

    assert_eq!(response.status(), 405);
    Ok(())
}

/// Test that authentication runs before the method check on protected routes.
#[tokio::test]
async fn test_todolist_unauthenticated_post_is_unauthorized() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start().await;
    let server = TestTodoServer::spawn(&idp).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/todolist", server.url()))
        .body("[]")
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    assert_eq!(idp.discovery_calls().await, 0);
    Ok(())
}

/// Test that the metrics endpoint is public and reports auth outcomes.
#[tokio::test]
async fn test_metrics_endpoint_reports_auth_outcomes() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start_with_keys(&[&TestRsaKey::primary()]).await;
    let server = TestTodoServer::spawn(&idp).await?;
    let client = reqwest::Client::new();

    let token = TestTokenBuilder::new().sign(&TestRsaKey::primary());
    let authorized = client
        .get(format!("{}/api/todolist", server.url()))
        .bearer_auth(token)
        .send()
        .await?;
    assert_eq!(authorized.status(), 200);

    let response = client
        .get(format!("{}/metrics", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    // The recorder is process-global; another test binary may own it, in
    // which case this handle renders nothing.
    let body = response.text().await?;
    if !body.is_empty() {
        assert!(body.contains("todo_auth_outcomes_total"));
        assert!(body.contains("outcome=\"authorized\""));
    }

    Ok(())
}
