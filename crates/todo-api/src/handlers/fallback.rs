//! Fallback for paths no route matches.

use crate::errors::ApiError;
use axum::http::Uri;

/// Answers unmatched paths with the JSON 404 body.
pub async fn route_not_found(uri: Uri) -> ApiError {
    tracing::debug!(target: "todo.handlers", path = %uri.path(), "No route for path");
    ApiError::NotFound(format!("No route for {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn test_route_not_found_is_404() {
        let err = route_not_found(Uri::from_static("/api/v1/nonexistent")).await;

        assert!(matches!(&err, ApiError::NotFound(msg) if msg == "No route for /api/v1/nonexistent"));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
