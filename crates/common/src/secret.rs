//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] so every crate in the workspace names secrets the
//! same way. `SecretString` implements `Debug` with redaction, so any struct
//! that derives `Debug` while holding one is safe to pass to `tracing`.
//!
//! # What counts as a secret here
//!
//! - The OAuth client secret used for the on-behalf-of exchange
//! - Inbound bearer tokens forwarded as the exchange assertion
//! - Downstream access tokens returned by the token endpoint
//! - The storage account key returned by the key vault
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ExchangeForm {
//!     client_id: String,
//!     client_secret: SecretString,
//! }
//!
//! let form = ExchangeForm {
//!     client_id: "todo-api".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{form:?}").contains("s3cr3t"));
//! assert_eq!(form.client_secret.expose_secret(), "s3cr3t");
//! ```
//!
//! With the `serde` feature enabled, secrets deserialize directly out of
//! token-endpoint and vault responses.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("storage-account-key");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("storage-account-key"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("client-secret");
        assert_eq!(secret.expose_secret(), "client-secret");
    }

    #[test]
    fn test_deserialize_vault_style_response() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct SecretBundle {
            id: String,
            value: SecretString,
        }

        let json = r#"{"id": "https://vault/secrets/storage-key/1", "value": "account-key=="}"#;
        let bundle: SecretBundle = serde_json::from_str(json).expect("deserialize");

        assert_eq!(bundle.value.expose_secret(), "account-key==");

        let debug = format!("{bundle:?}");
        assert!(!debug.contains("account-key=="));
        assert!(debug.contains("storage-key"));
    }
}
