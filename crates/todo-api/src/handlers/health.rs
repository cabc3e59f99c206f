//! Health check handler.
//!
//! Liveness probe. It does not touch the identity provider or storage, so
//! an outage there never takes the pod out of rotation.

use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests.
    pub status: String,

    /// Crate version.
    pub version: String,

    /// Subjects currently held in the subject cache.
    pub cached_subjects: usize,
}

/// Handler for GET /health
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "cached_subjects": 12
/// }
/// ```
#[instrument(skip_all, name = "todo.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cached_subjects: state.security.subject_cache().len().await,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // The handler is exercised end to end in health_tests.rs.

    #[test]
    fn test_health_response_serializes() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            cached_subjects: 3,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["cached_subjects"], 3);
    }
}
