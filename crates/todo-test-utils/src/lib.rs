//! # Todo API Test Utilities
//!
//! Shared test utilities for the Todo API.
//!
//! This crate provides:
//! - RSA signing keys and JWKS fixtures (`crypto_fixtures`)
//! - A fluent JWT builder (`token_builders`)
//! - A wiremock identity provider and key vault (`mock_idp`)
//! - Server test harness (`TestTodoServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use todo_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let idp = MockIdentityProvider::start_with_keys(&[&TestRsaKey::primary()]).await;
//!     let server = TestTodoServer::spawn(&idp).await?;
//!
//!     let response = reqwest::get(&format!("{}/health", server.url())).await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_idp;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_idp::*;
pub use server_harness::*;
pub use token_builders::*;
