//! Authorization policy applied to decoded claims.

use crate::auth::claims::DecodedToken;
use crate::errors::AuthFailure;

/// Audience and scope expectations for API callers.
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    audiences: Vec<String>,
    required_scope: String,
}

impl AuthorizationPolicy {
    pub fn new(audiences: Vec<String>, required_scope: String) -> Self {
        Self {
            audiences,
            required_scope,
        }
    }

    /// Decide whether a validated token may use the API.
    ///
    /// The audience is re-checked here so the policy stands on its own even
    /// when claims come from somewhere other than `TokenValidator`. The scope
    /// check is literal equality of the whole `scp` claim.
    ///
    /// # Errors
    ///
    /// `AudienceMismatch` first, then `ScopeMismatch`.
    pub fn authorize(&self, claims: &DecodedToken) -> Result<(), AuthFailure> {
        if !claims.aud.intersects(&self.audiences) {
            tracing::debug!(target: "todo.auth.policy", "Audience not accepted");
            return Err(AuthFailure::AudienceMismatch);
        }

        if claims.scp != self.required_scope {
            tracing::debug!(
                target: "todo.auth.policy",
                scope = %claims.scp,
                "Scope does not match required scope"
            );
            return Err(AuthFailure::ScopeMismatch);
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::claims::Audience;

    fn policy() -> AuthorizationPolicy {
        AuthorizationPolicy::new(
            vec!["62cda2d5-6552-438f-afeb-71f735b4c151".to_string()],
            "user_impersonation".to_string(),
        )
    }

    fn claims(aud: Audience, scp: &str) -> DecodedToken {
        DecodedToken {
            iss: "https://issuer.example.com/v2.0/".to_string(),
            aud,
            sub: "sub".to_string(),
            oid: Some("oid".to_string()),
            scp: scp.to_string(),
            exp: 2_000_000_000,
            iat: 1_999_999_700,
            nbf: None,
        }
    }

    #[test]
    fn test_accepts_expected_audience_and_scope() {
        let token = claims(
            Audience::Single("62cda2d5-6552-438f-afeb-71f735b4c151".to_string()),
            "user_impersonation",
        );
        assert!(policy().authorize(&token).is_ok());
    }

    #[test]
    fn test_rejects_other_scope() {
        let token = claims(
            Audience::Single("62cda2d5-6552-438f-afeb-71f735b4c151".to_string()),
            "other_scope",
        );
        assert_eq!(
            policy().authorize(&token).unwrap_err(),
            AuthFailure::ScopeMismatch
        );
    }

    #[test]
    fn test_scope_is_literal_equality() {
        let aud = Audience::Single("62cda2d5-6552-438f-afeb-71f735b4c151".to_string());

        for scp in ["", "user_impersonation tasks.read", "USER_IMPERSONATION"] {
            assert_eq!(
                policy().authorize(&claims(aud.clone(), scp)).unwrap_err(),
                AuthFailure::ScopeMismatch,
                "scp {scp:?}"
            );
        }
    }

    #[test]
    fn test_rejects_other_audience_before_scope() {
        let token = claims(Audience::Single("other-api".to_string()), "other_scope");
        assert_eq!(
            policy().authorize(&token).unwrap_err(),
            AuthFailure::AudienceMismatch
        );
    }

    #[test]
    fn test_accepts_audience_list_containing_expected() {
        let token = claims(
            Audience::Multiple(vec![
                "other-api".to_string(),
                "62cda2d5-6552-438f-afeb-71f735b4c151".to_string(),
            ]),
            "user_impersonation",
        );
        assert!(policy().authorize(&token).is_ok());
    }
}
