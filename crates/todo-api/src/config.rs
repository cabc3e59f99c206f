//! Todo API configuration.
//!
//! Configuration is loaded from environment variables. The OAuth client
//! secret is held as a `SecretString` and redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5555";

/// Default identity provider authority (issuer base URL).
pub const DEFAULT_OIDC_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Scope literal an inbound token must carry to use the API.
pub const DEFAULT_REQUIRED_SCOPE: &str = "user_impersonation";

/// Resource the on-behalf-of exchange requests a token for.
pub const DEFAULT_DOWNSTREAM_RESOURCE: &str = "https://vault.azure.net";

/// Default subject cache entry lifetime in seconds.
pub const DEFAULT_SUBJECT_CACHE_TTL_SECONDS: u64 = 300;

/// Default subject cache capacity.
pub const DEFAULT_SUBJECT_CACHE_MAX_ENTRIES: usize = 1000;

/// Default outbound HTTP request timeout in seconds.
pub const DEFAULT_OUTBOUND_HTTP_TIMEOUT_SECONDS: u64 = 5;

/// Upper bound for the outbound HTTP request timeout.
pub const MAX_OUTBOUND_HTTP_TIMEOUT_SECONDS: u64 = 60;

/// Todo API configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:5555").
    pub bind_address: String,

    /// Identity provider authority, without trailing slash.
    pub oidc_authority: String,

    /// Directory (tenant) identifier at the identity provider.
    pub tenant_id: String,

    /// OIDC discovery document URL.
    ///
    /// Derived from authority and tenant unless `OIDC_DISCOVERY_URL` is set.
    pub discovery_url: String,

    /// Expected `iss` claim.
    pub issuer: String,

    /// Accepted `aud` values. Never empty.
    pub audiences: Vec<String>,

    /// Exact `scp` value required by the authorization policy.
    pub required_scope: String,

    /// Leeway in seconds applied to `exp` and `nbf`.
    pub jwt_clock_skew_seconds: u64,

    /// OAuth client ID of this API at the identity provider.
    pub client_id: String,

    /// OAuth client secret used for the on-behalf-of exchange.
    pub client_secret: SecretString,

    /// Resource requested by the on-behalf-of exchange.
    pub downstream_resource: String,

    /// OAuth token endpoint used for the on-behalf-of exchange.
    pub token_endpoint: String,

    /// Key vault base URL holding the storage credential.
    pub key_vault_url: String,

    /// Name of the secret holding the storage credential.
    pub storage_secret_name: String,

    /// Secret version; `None` selects the latest.
    pub storage_secret_version: Option<String>,

    /// Subject cache entry lifetime in seconds.
    pub subject_cache_ttl_seconds: u64,

    /// Subject cache capacity.
    pub subject_cache_max_entries: usize,

    /// Timeout for every outbound HTTP request (discovery, JWKS, exchange, vault).
    pub outbound_http_timeout_seconds: u64,

    /// Whether an unknown `kid` triggers a bounded key-set refresh.
    pub jwks_refresh_on_unknown_kid: bool,
}

/// Custom Debug implementation that redacts the client secret.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("oidc_authority", &self.oidc_authority)
            .field("tenant_id", &self.tenant_id)
            .field("discovery_url", &self.discovery_url)
            .field("issuer", &self.issuer)
            .field("audiences", &self.audiences)
            .field("required_scope", &self.required_scope)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("downstream_resource", &self.downstream_resource)
            .field("token_endpoint", &self.token_endpoint)
            .field("key_vault_url", &self.key_vault_url)
            .field("storage_secret_name", &self.storage_secret_name)
            .field("storage_secret_version", &self.storage_secret_version)
            .field("subject_cache_ttl_seconds", &self.subject_cache_ttl_seconds)
            .field("subject_cache_max_entries", &self.subject_cache_max_entries)
            .field(
                "outbound_http_timeout_seconds",
                &self.outbound_http_timeout_seconds,
            )
            .field(
                "jwks_refresh_on_unknown_kid",
                &self.jwks_refresh_on_unknown_kid,
            )
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid audience configuration: {0}")]
    InvalidAudiences(String),

    #[error("Invalid subject cache configuration: {0}")]
    InvalidSubjectCache(String),

    #[error("Invalid outbound HTTP timeout configuration: {0}")]
    InvalidHttpTimeout(String),

    #[error("Invalid boolean for {0}: expected true or false")]
    InvalidBool(String),
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address =
            optional(vars, "BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let oidc_authority = optional(vars, "OIDC_AUTHORITY")
            .unwrap_or_else(|| DEFAULT_OIDC_AUTHORITY.to_string())
            .trim_end_matches('/')
            .to_string();

        let tenant_id = required(vars, "OIDC_TENANT_ID")?;

        let discovery_url = optional(vars, "OIDC_DISCOVERY_URL").unwrap_or_else(|| {
            format!("{oidc_authority}/{tenant_id}/v2.0/.well-known/openid-configuration")
        });

        let issuer = required(vars, "JWT_ISSUER")?;

        let audiences: Vec<String> = required(vars, "JWT_AUDIENCES")?
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        if audiences.is_empty() {
            return Err(ConfigError::InvalidAudiences(
                "JWT_AUDIENCES must contain at least one audience".to_string(),
            ));
        }

        let required_scope = optional(vars, "JWT_REQUIRED_SCOPE")
            .unwrap_or_else(|| DEFAULT_REQUIRED_SCOPE.to_string());

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs()
        };

        let client_id = required(vars, "CLIENT_ID")?;
        let client_secret = SecretString::from(required(vars, "CLIENT_SECRET")?);

        let downstream_resource = optional(vars, "DOWNSTREAM_RESOURCE")
            .unwrap_or_else(|| DEFAULT_DOWNSTREAM_RESOURCE.to_string());

        let token_endpoint = optional(vars, "TOKEN_ENDPOINT")
            .unwrap_or_else(|| format!("{oidc_authority}/{tenant_id}/oauth2/token"));

        let key_vault_url = required(vars, "KEY_VAULT_URL")?
            .trim_end_matches('/')
            .to_string();
        let storage_secret_name = required(vars, "STORAGE_SECRET_NAME")?;
        let storage_secret_version = optional(vars, "STORAGE_SECRET_VERSION");

        let subject_cache_ttl_seconds =
            if let Some(value_str) = vars.get("SUBJECT_CACHE_TTL_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidSubjectCache(format!(
                        "SUBJECT_CACHE_TTL_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidSubjectCache(
                        "SUBJECT_CACHE_TTL_SECONDS must be greater than 0".to_string(),
                    ));
                }

                value
            } else {
                DEFAULT_SUBJECT_CACHE_TTL_SECONDS
            };

        let subject_cache_max_entries =
            if let Some(value_str) = vars.get("SUBJECT_CACHE_MAX_ENTRIES") {
                let value: usize = value_str.parse().map_err(|e| {
                    ConfigError::InvalidSubjectCache(format!(
                        "SUBJECT_CACHE_MAX_ENTRIES must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidSubjectCache(
                        "SUBJECT_CACHE_MAX_ENTRIES must be greater than 0".to_string(),
                    ));
                }

                value
            } else {
                DEFAULT_SUBJECT_CACHE_MAX_ENTRIES
            };

        let outbound_http_timeout_seconds =
            if let Some(value_str) = vars.get("OUTBOUND_HTTP_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidHttpTimeout(format!(
                        "OUTBOUND_HTTP_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 || value > MAX_OUTBOUND_HTTP_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidHttpTimeout(format!(
                        "OUTBOUND_HTTP_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                        MAX_OUTBOUND_HTTP_TIMEOUT_SECONDS, value
                    )));
                }

                value
            } else {
                DEFAULT_OUTBOUND_HTTP_TIMEOUT_SECONDS
            };

        let jwks_refresh_on_unknown_kid = match optional(vars, "JWKS_REFRESH_ON_UNKNOWN_KID")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(_) => {
                return Err(ConfigError::InvalidBool(
                    "JWKS_REFRESH_ON_UNKNOWN_KID".to_string(),
                ))
            }
        };

        Ok(Config {
            bind_address,
            oidc_authority,
            tenant_id,
            discovery_url,
            issuer,
            audiences,
            required_scope,
            jwt_clock_skew_seconds,
            client_id,
            client_secret,
            downstream_resource,
            token_endpoint,
            key_vault_url,
            storage_secret_name,
            storage_secret_version,
            subject_cache_ttl_seconds,
            subject_cache_max_entries,
            outbound_http_timeout_seconds,
            jwks_refresh_on_unknown_kid,
        })
    }
}
