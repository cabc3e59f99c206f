//! HTTP routes for the Todo API.
//!
//! Defines the Axum router and application state.

use crate::auth::SecurityContext;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Upper bound on handling one request, outbound calls included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Token validation, subject cache and token exchange.
    pub security: Arc<SecurityContext>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (public)
/// - `/metrics` - Prometheus scrape endpoint (public)
/// - `/api/todolist` - GET/PUT of the task-list document (authenticated)
/// - JSON 404 for any other path
///
/// `require_auth` is a route layer, so it also runs before the method check:
/// an unauthenticated request with an unsupported method gets 401, not 405.
/// - TraceLayer for request logging
/// - 30 second request timeout
/// - HTTP metrics for every response
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(Arc::clone(&state));

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes: require_auth injects the caller's storage capability
    let protected_routes = Router::new()
        .route(
            "/api/todolist",
            get(handlers::get_todolist).put(handlers::put_todolist),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.security),
            require_auth,
        ));

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record every response (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .fallback(handlers::route_not_found)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        // Required for Axum's State extractor.
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_security_context_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SecurityContext>();
    }
}
