//! Todo API error types.
//!
//! `AuthFailure` is the authentication taxonomy produced by the security
//! core. `ApiError` is what handlers and middleware return; it maps to HTTP
//! status codes via the `IntoResponse` impl. Storage and internal errors are
//! logged server-side and returned to clients with generic messages.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const AUTH_REALM: &str = "todo-api";

/// Why a request was not authorized.
///
/// Every variant maps to 401. `reason()` is the stable short code used in
/// the `WWW-Authenticate` challenge and in metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("Missing Authorization header")]
    MissingHeader,

    #[error("Signing keys unavailable")]
    DiscoveryError,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Unknown signing key")]
    UnknownKey,

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Token expired")]
    Expired,

    #[error("Invalid Issuer")]
    IssuerMismatch,

    #[error("Invalid Audience")]
    AudienceMismatch,

    #[error("Invalid Scope")]
    ScopeMismatch,

    #[error("Token exchange rejected")]
    ExchangeRejected,

    #[error("Downstream credential unavailable")]
    SecretFetchFailed,

    #[error("Storage unavailable")]
    StorageUnavailable,
}

impl AuthFailure {
    /// Stable short reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::MissingHeader => "missing_header",
            AuthFailure::DiscoveryError => "discovery_error",
            AuthFailure::MalformedToken => "malformed_token",
            AuthFailure::UnknownKey => "unknown_key",
            AuthFailure::SignatureInvalid => "invalid_signature",
            AuthFailure::Expired => "expired",
            AuthFailure::IssuerMismatch => "issuer_mismatch",
            AuthFailure::AudienceMismatch => "audience_mismatch",
            AuthFailure::ScopeMismatch => "scope_mismatch",
            AuthFailure::ExchangeRejected => "exchange_rejected",
            AuthFailure::SecretFetchFailed => "secret_fetch_failed",
            AuthFailure::StorageUnavailable => "storage_unavailable",
        }
    }

    /// HTTP status for this failure. Always 401.
    pub fn status(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    /// `WWW-Authenticate` challenge value for this failure.
    pub fn challenge(&self) -> String {
        format!(
            "Bearer realm=\"{AUTH_REALM}\", error=\"invalid_token\", error_description=\"{}\"",
            self.reason()
        )
    }
}

/// Todo API error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401 Unauthorized (with `WWW-Authenticate`)
/// - NotFound: 404 Not Found
/// - BadRequest: 400 Bad Request
/// - StorageFailure: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthFailure),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    StorageFailure(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Unauthorized(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::StorageFailure(_) => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized(failure) => (
                failure.status(),
                "UNAUTHORIZED",
                failure.to_string(),
            ),
            ApiError::NotFound(resource) => (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone()),
            ApiError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            ApiError::StorageFailure(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "todo.storage", error = %err, "Storage operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "An internal storage error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if let ApiError::Unauthorized(failure) = &self {
            if let Ok(header_value) = HeaderValue::from_str(&failure.challenge()) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, header_value);
            }
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    // Helper function to read the response body as JSON
    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const ALL_FAILURES: [AuthFailure; 12] = [
        AuthFailure::MissingHeader,
        AuthFailure::DiscoveryError,
        AuthFailure::MalformedToken,
        AuthFailure::UnknownKey,
        AuthFailure::SignatureInvalid,
        AuthFailure::Expired,
        AuthFailure::IssuerMismatch,
        AuthFailure::AudienceMismatch,
        AuthFailure::ScopeMismatch,
        AuthFailure::ExchangeRejected,
        AuthFailure::SecretFetchFailed,
        AuthFailure::StorageUnavailable,
    ];

    #[test]
    fn test_every_auth_failure_is_401() {
        for failure in ALL_FAILURES {
            assert_eq!(failure.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(ApiError::Unauthorized(failure).status_code(), 401);
        }
    }

    #[test]
    fn test_reason_codes_are_unique() {
        let mut reasons: Vec<&str> = ALL_FAILURES.iter().map(AuthFailure::reason).collect();
        reasons.sort_unstable();
        reasons.dedup();
        assert_eq!(reasons.len(), ALL_FAILURES.len());
    }

    #[test]
    fn test_challenge_format() {
        assert_eq!(
            AuthFailure::ScopeMismatch.challenge(),
            "Bearer realm=\"todo-api\", error=\"invalid_token\", error_description=\"scope_mismatch\""
        );
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(AuthFailure::ScopeMismatch.to_string(), "Invalid Scope");
        assert_eq!(AuthFailure::AudienceMismatch.to_string(), "Invalid Audience");
        assert_eq!(
            ApiError::NotFound("task list".to_string()).to_string(),
            "Not found: task list"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound("x".to_string()).status_code(), 404);
        assert_eq!(ApiError::BadRequest("x".to_string()).status_code(), 400);
        assert_eq!(ApiError::StorageFailure("x".to_string()).status_code(), 500);
    }

    #[test]
    fn test_from_auth_failure() {
        let error: ApiError = AuthFailure::Expired.into();
        assert!(matches!(error, ApiError::Unauthorized(AuthFailure::Expired)));
    }

    #[tokio::test]
    async fn test_into_response_unauthorized() {
        let response = ApiError::Unauthorized(AuthFailure::ScopeMismatch).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .expect("challenge header");
        let www_auth_str = www_auth.to_str().unwrap();
        assert!(www_auth_str.contains("Bearer realm=\"todo-api\""));
        assert!(www_auth_str.contains("error_description=\"scope_mismatch\""));

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "UNAUTHORIZED");
        assert_eq!(body_json["error"]["message"], "Invalid Scope");
    }

    #[tokio::test]
    async fn test_into_response_bad_request_has_no_challenge() {
        let response = ApiError::BadRequest("empty body".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "BAD_REQUEST");
        assert_eq!(body_json["error"]["message"], "empty body");
    }

    #[tokio::test]
    async fn test_into_response_storage_failure_is_generic() {
        let response =
            ApiError::StorageFailure("container todo missing: 403".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "STORAGE_ERROR");
        assert_eq!(
            body_json["error"]["message"],
            "An internal storage error occurred"
        );
    }

    #[tokio::test]
    async fn test_into_response_not_found() {
        let response = ApiError::NotFound("Route not found".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["error"]["code"], "NOT_FOUND");
    }
}
