//! Authentication middleware for protected routes.
//!
//! Runs the security context against the request headers and, on success,
//! injects the caller's storage capability into request extensions.

use crate::auth::{AuthorizationOutcome, SecurityContext};
use crate::errors::ApiError;
use crate::storage::StorageCapability;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// Storage capability of the authorized caller.
///
/// Inserted into request extensions by `require_auth`.
#[derive(Clone)]
pub struct AuthorizedStorage(pub Arc<dyn StorageCapability>);

/// Authentication middleware.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - 401 Unauthorized with a `WWW-Authenticate` challenge on any auth failure
/// - Otherwise continues with `AuthorizedStorage` in extensions
#[instrument(skip(security, req, next), name = "todo.middleware.auth")]
pub async fn require_auth(
    State(security): State<Arc<SecurityContext>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = security.authorize(req.headers()).await;

    match outcome {
        AuthorizationOutcome::Authorized(capability) => {
            req.extensions_mut().insert(AuthorizedStorage(capability));
            Ok(next.run(req).await)
        }
        AuthorizationOutcome::Unauthorized { reason, .. } => Err(ApiError::Unauthorized(reason)),
    }
}
