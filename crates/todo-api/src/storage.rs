//! Task-list document storage.
//!
//! The API persists one opaque document: the task list. A `StorageProvider`
//! turns the downstream credential obtained by the token exchange into a
//! `StorageCapability`, a handle that reads and replaces that document.
//! The capability is cached with the subject's grant and shared by every
//! later request from that subject.
//!
//! `InMemoryStorageProvider` keeps one document per storage account
//! credential in process memory. It backs local development and tests.

use crate::auth::DownstreamCredential;
use crate::errors::{ApiError, AuthFailure};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Failure reading or writing the task-list document.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::StorageFailure(err.to_string())
    }
}

/// Handle permitting reads and writes of the task-list document.
#[async_trait::async_trait]
pub trait StorageCapability: Send + Sync {
    /// Current document content. Empty when nothing has been stored yet.
    async fn get_content(&self) -> Result<Bytes, StorageError>;

    /// Replace the document and return what is now stored.
    async fn update_content(&self, content: Bytes) -> Result<Bytes, StorageError>;
}

/// Opens a storage capability with a downstream credential.
#[async_trait::async_trait]
pub trait StorageProvider: Send + Sync {
    /// # Errors
    ///
    /// `AuthFailure::StorageUnavailable` if the credential does not open
    /// the storage account.
    async fn open(
        &self,
        credential: &DownstreamCredential,
    ) -> Result<Arc<dyn StorageCapability>, AuthFailure>;
}

/// In-memory task-list document.
#[derive(Default)]
pub struct InMemoryDocument {
    content: RwLock<Bytes>,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StorageCapability for InMemoryDocument {
    async fn get_content(&self) -> Result<Bytes, StorageError> {
        Ok(self.content.read().await.clone())
    }

    async fn update_content(&self, content: Bytes) -> Result<Bytes, StorageError> {
        let mut stored = self.content.write().await;
        *stored = content;
        Ok(stored.clone())
    }
}

/// Provider handing out one in-memory document per storage account key.
#[derive(Default)]
pub struct InMemoryStorageProvider {
    accounts: Mutex<HashMap<String, Arc<InMemoryDocument>>>,
}

impl InMemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of storage accounts opened so far.
    pub async fn account_count(&self) -> usize {
        self.accounts.lock().await.len()
    }
}

#[async_trait::async_trait]
impl StorageProvider for InMemoryStorageProvider {
    async fn open(
        &self,
        credential: &DownstreamCredential,
    ) -> Result<Arc<dyn StorageCapability>, AuthFailure> {
        if credential.expose().is_empty() {
            tracing::warn!(target: "todo.storage", "Empty storage credential");
            return Err(AuthFailure::StorageUnavailable);
        }

        let mut accounts = self.accounts.lock().await;
        let document = accounts
            .entry(credential.expose().to_string())
            .or_insert_with(|| {
                tracing::info!(target: "todo.storage", "Created task-list document");
                Arc::new(InMemoryDocument::new())
            });

        Ok(Arc::clone(document) as Arc<dyn StorageCapability>)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_document_is_empty() {
        let provider = InMemoryStorageProvider::new();
        let capability = provider
            .open(&DownstreamCredential::new("account-key"))
            .await
            .unwrap();

        assert!(capability.get_content().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_returns_stored_content() {
        let provider = InMemoryStorageProvider::new();
        let capability = provider
            .open(&DownstreamCredential::new("account-key"))
            .await
            .unwrap();

        let stored = capability
            .update_content(Bytes::from_static(b"[\"milk\"]"))
            .await
            .unwrap();

        assert_eq!(stored, Bytes::from_static(b"[\"milk\"]"));
        assert_eq!(capability.get_content().await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_same_credential_shares_document() {
        let provider = InMemoryStorageProvider::new();
        let first = provider
            .open(&DownstreamCredential::new("account-key"))
            .await
            .unwrap();
        let second = provider
            .open(&DownstreamCredential::new("account-key"))
            .await
            .unwrap();
        let other = provider
            .open(&DownstreamCredential::new("other-key"))
            .await
            .unwrap();

        first
            .update_content(Bytes::from_static(b"shared"))
            .await
            .unwrap();

        assert_eq!(second.get_content().await.unwrap(), "shared");
        assert!(other.get_content().await.unwrap().is_empty());
        assert_eq!(provider.account_count().await, 2);
    }

    #[tokio::test]
    async fn test_empty_credential_is_unavailable() {
        let provider = InMemoryStorageProvider::new();
        let result = provider.open(&DownstreamCredential::new("")).await;

        assert_eq!(result.err(), Some(AuthFailure::StorageUnavailable));
    }

    #[test]
    fn test_storage_error_maps_to_api_error() {
        let err: ApiError = StorageError::Unavailable("timeout".to_string()).into();
        assert!(matches!(err, ApiError::StorageFailure(_)));
        assert_eq!(err.status_code(), 500);
    }
}
