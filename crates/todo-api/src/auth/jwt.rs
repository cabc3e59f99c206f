//! Token validation.
//!
//! Validates inbound bearer JWTs against the identity provider's signing keys.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 is accepted; the header `alg` is checked before any key
//!   lookup so `none` and HMAC tokens are rejected outright
//! - Signature is verified before any claim is trusted
//! - `exp` is always enforced and must lie strictly after the current
//!   second (less leeway); `nbf` when present

use crate::auth::claims::DecodedToken;
use crate::auth::jwks::KeyResolver;
use crate::errors::AuthFailure;
use crate::observability::metrics::record_token_validation;
use common::jwt::{parse_unverified_header, RS256};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, get_current_timestamp, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// JWT validator bound to one issuer and a set of accepted audiences.
pub struct TokenValidator {
    /// Source of verification keys.
    resolver: Arc<KeyResolver>,

    /// Prebuilt `jsonwebtoken` rules: RS256, issuer, audiences, leeway.
    validation: Validation,
}

impl TokenValidator {
    /// Create a new token validator.
    ///
    /// # Arguments
    ///
    /// * `resolver` - Key resolver for the identity provider
    /// * `issuer` - Expected `iss`
    /// * `audiences` - Accepted `aud` values
    /// * `clock_skew_seconds` - Leeway applied to `exp` and `nbf`
    pub fn new(
        resolver: Arc<KeyResolver>,
        issuer: &str,
        audiences: &[String],
        clock_skew_seconds: u64,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = clock_skew_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_audience(audiences);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self {
            resolver,
            validation,
        }
    }

    /// Validate a JWT and return its decoded claims.
    ///
    /// # Checks, in order
    ///
    /// 1. Size limit and header parse
    /// 2. Header `alg` must be RS256
    /// 3. Header must carry a `kid`, resolvable to a key
    /// 4. RS256 signature
    /// 5. `exp`/`nbf`, then `iss`, then `aud`
    ///
    /// # Errors
    ///
    /// Returns the `AuthFailure` of the first check that fails.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<DecodedToken, AuthFailure> {
        let start = Instant::now();
        let result = self.validate_inner(token).await;

        let status = match &result {
            Ok(_) => "success",
            Err(failure) => failure.reason(),
        };
        record_token_validation(status, start.elapsed());

        result
    }

    async fn validate_inner(&self, token: &str) -> Result<DecodedToken, AuthFailure> {
        let header = parse_unverified_header(token).map_err(|e| {
            tracing::debug!(target: "todo.auth.jwt", error = ?e, "Token header rejected");
            AuthFailure::MalformedToken
        })?;

        if header.alg != RS256 {
            tracing::warn!(target: "todo.auth.jwt", alg = %header.alg, "Token rejected: unsupported algorithm");
            return Err(AuthFailure::SignatureInvalid);
        }

        let kid = header.kid.ok_or_else(|| {
            tracing::debug!(target: "todo.auth.jwt", "Token header missing kid");
            AuthFailure::MalformedToken
        })?;

        let key = self.resolver.key(&kid).await?;

        let claims = verify_token(token, &key, &self.validation)?;
        check_not_expired(&claims, get_current_timestamp(), self.validation.leeway)?;

        tracing::debug!(target: "todo.auth.jwt", "Token validated successfully");
        Ok(claims)
    }
}

/// Verify the signature and registered claims, then decode the payload.
fn verify_token(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<DecodedToken, AuthFailure> {
    let token_data = decode::<DecodedToken>(token, key, validation).map_err(|e| {
        let failure = map_jwt_error(e.kind());
        tracing::debug!(target: "todo.auth.jwt", error = %e, reason = failure.reason(), "Token verification failed");
        failure
    })?;

    Ok(token_data.claims)
}

/// Reject a token whose `exp` is not after `now`, less `leeway`.
///
/// `jsonwebtoken` only rejects `exp < now - leeway`, so a token expiring in
/// the current second would otherwise pass.
fn check_not_expired(claims: &DecodedToken, now: u64, leeway: u64) -> Result<(), AuthFailure> {
    let cutoff = i64::try_from(now.saturating_sub(leeway)).unwrap_or(i64::MAX);
    if claims.exp <= cutoff {
        tracing::debug!(target: "todo.auth.jwt", "Token expires at the current second");
        return Err(AuthFailure::Expired);
    }
    Ok(())
}

/// Map a `jsonwebtoken` failure onto the authentication taxonomy.
fn map_jwt_error(kind: &ErrorKind) -> AuthFailure {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthFailure::SignatureInvalid,
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => AuthFailure::Expired,
        ErrorKind::InvalidIssuer => AuthFailure::IssuerMismatch,
        ErrorKind::InvalidAudience => AuthFailure::AudienceMismatch,
        _ => AuthFailure::MalformedToken,
    }
}
