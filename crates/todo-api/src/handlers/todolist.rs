//! Task-list document handlers.
//!
//! The document is opaque bytes read from and written to the caller's
//! storage capability. Both routes sit behind `require_auth`.

use crate::errors::ApiError;
use crate::middleware::AuthorizedStorage;
use axum::body::Bytes;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use tracing::instrument;

const DOCUMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// Handler for GET /api/todolist
///
/// Returns the stored document, or an empty body when none exists yet.
#[instrument(skip_all, name = "todo.todolist.get")]
pub async fn get_todolist(
    Extension(AuthorizedStorage(storage)): Extension<AuthorizedStorage>,
) -> Result<Response, ApiError> {
    let content = storage.get_content().await?;

    tracing::debug!(target: "todo.handlers", bytes = content.len(), "Task list read");
    Ok(([(header::CONTENT_TYPE, DOCUMENT_CONTENT_TYPE)], content).into_response())
}

/// Handler for PUT /api/todolist
///
/// Replaces the document with the request body and returns what was stored.
///
/// # Errors
///
/// - `ApiError::BadRequest` for an empty body
/// - `ApiError::StorageFailure` if the write fails
#[instrument(skip_all, name = "todo.todolist.put")]
pub async fn put_todolist(
    Extension(AuthorizedStorage(storage)): Extension<AuthorizedStorage>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest(
            "Request body must not be empty".to_string(),
        ));
    }

    let stored = storage.update_content(body).await?;

    tracing::debug!(target: "todo.handlers", bytes = stored.len(), "Task list replaced");
    Ok(([(header::CONTENT_TYPE, DOCUMENT_CONTENT_TYPE)], stored).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryDocument, StorageCapability};
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use std::sync::Arc;

    fn storage() -> Extension<AuthorizedStorage> {
        let document: Arc<dyn StorageCapability> = Arc::new(InMemoryDocument::new());
        Extension(AuthorizedStorage(document))
    }

    async fn body_of(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_get_empty_document() {
        let response = get_todolist(storage()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let storage = storage();

        let put = put_todolist(storage.clone(), Bytes::from_static(b"[{\"title\":\"milk\"}]"))
            .await
            .unwrap();
        assert_eq!(body_of(put).await, "[{\"title\":\"milk\"}]");

        let get = get_todolist(storage).await.unwrap();
        assert_eq!(body_of(get).await, "[{\"title\":\"milk\"}]");
    }

    #[tokio::test]
    async fn test_put_empty_body_is_bad_request() {
        let err = put_todolist(storage(), Bytes::new()).await.unwrap_err();

        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(err.status_code(), 400);
    }
}
