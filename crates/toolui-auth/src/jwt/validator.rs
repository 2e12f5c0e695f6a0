//! Access token validation.
//!
//! Validation is ordered and stops at the first failure:
//!
//! 1. token shape (three base64url segments)
//! 2. header `kid`
//! 3. signing key lookup via JWKS
//! 4. signature
//! 5. issuer and audience
//! 6. expiry and not-before, with clock skew

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, trace};

use super::algorithm::{JwsAlgorithm, SignatureError, decode_base64url, verify_signature};
use super::claims::{TokenClaims, has_scopes};
use super::jwks::{JwksClient, JwksClientConfig};
use crate::challenge::AuthErrorCode;
use crate::config::ResourceServerConfig;
use crate::error::{AuthError, AuthResult};

/// Default tolerance applied to `exp` and `nbf`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Where the JWKS lives relative to the issuer unless overridden.
pub const DEFAULT_JWKS_PATH: &str = "/.well-known/jwks.json";

/// Why a token was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// Not three base64url segments, or the header is not a JSON object.
    #[error("Invalid token format")]
    InvalidFormat,

    /// The header carries no `kid`.
    #[error("Token missing key ID (kid)")]
    MissingKeyId,

    /// No key with this id in the key set.
    #[error("Unknown signing key: {0}")]
    UnknownSigningKey(String),

    /// The header `alg` is not an accepted algorithm.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature does not verify with the resolved key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The payload is not a valid claim set.
    #[error("Invalid token claims: {0}")]
    InvalidClaims(String),

    /// `iss` differs from the configured issuer.
    #[error("Invalid issuer: expected {expected}, got {actual}")]
    InvalidIssuer {
        /// Configured issuer
        expected: String,
        /// Issuer in the token
        actual: String,
    },

    /// The configured audience is not in `aud`.
    #[error("Invalid audience: expected {expected}")]
    InvalidAudience {
        /// Configured audience
        expected: String,
    },

    /// `exp` is in the past beyond the allowed skew.
    #[error("Token expired")]
    Expired,

    /// `nbf` is in the future beyond the allowed skew.
    #[error("Token not yet valid")]
    NotYetValid,
}

impl ValidationError {
    /// The RFC 6750 error code for this failure.
    pub fn code(&self) -> AuthErrorCode {
        AuthErrorCode::InvalidToken
    }
}

/// Token validator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValidatorConfig {
    /// Where signing keys come from
    pub jwks: JwksClientConfig,
    /// Required `iss`
    pub issuer: String,
    /// Audience that must appear in `aud`
    pub audience: String,
    /// Tolerance for `exp` and `nbf`
    #[serde(default = "default_clock_skew")]
    pub clock_skew: Duration,
}

fn default_clock_skew() -> Duration {
    DEFAULT_CLOCK_SKEW
}

impl TokenValidatorConfig {
    /// Settings with the default clock skew.
    pub fn new(
        jwks: JwksClientConfig,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
            audience: audience.into(),
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    /// Override the clock skew.
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
}

/// Validates bearer access tokens for one resource.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    jwks: Arc<JwksClient>,
    issuer: String,
    audience: String,
    clock_skew: i64,
}

impl TokenValidator {
    /// Build a validator and its JWKS client.
    ///
    /// # Errors
    ///
    /// Propagates JWKS client construction errors.
    pub fn new(config: TokenValidatorConfig) -> AuthResult<Self> {
        let jwks = Arc::new(JwksClient::new(config.jwks)?);
        Ok(Self::with_jwks_client(
            jwks,
            config.issuer,
            config.audience,
            config.clock_skew,
        ))
    }

    /// Build a validator around an existing JWKS client.
    pub fn with_jwks_client(
        jwks: Arc<JwksClient>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        clock_skew: Duration,
    ) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
            audience: audience.into(),
            clock_skew: i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Validator for a resource server: the first authorization server is the
    /// issuer, the resource URL is the audience and the JWKS is served at
    /// `<issuer><jwks_path>` (default [`DEFAULT_JWKS_PATH`]).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoAuthorizationServer`] when none is configured.
    pub fn from_resource_config(
        config: &ResourceServerConfig,
        jwks_path: Option<&str>,
    ) -> AuthResult<Self> {
        let issuer = config
            .authorization_servers
            .first()
            .ok_or(AuthError::NoAuthorizationServer)?;
        let jwks_uri = format!(
            "{}{}",
            issuer.trim_end_matches('/'),
            jwks_path.unwrap_or(DEFAULT_JWKS_PATH)
        );
        Self::new(TokenValidatorConfig::new(
            JwksClientConfig::new(jwks_uri),
            issuer.clone(),
            config.resource.clone(),
        ))
    }

    /// Expected issuer.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Expected audience.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// The JWKS client used for key lookup.
    pub fn jwks_client(&self) -> &Arc<JwksClient> {
        &self.jwks
    }

    /// Validate `token` against the current time.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub async fn validate(&self, token: &str) -> Result<TokenClaims, ValidationError> {
        self.validate_at(token, unix_now()).await
    }

    /// Validate `token` as of `now` (seconds since the epoch).
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub async fn validate_at(&self, token: &str, now: i64) -> Result<TokenClaims, ValidationError> {
        let result = self.run_pipeline(token, now).await;
        match &result {
            Ok(claims) => trace!(sub = %claims.sub, "Access token accepted"),
            Err(e) => debug!(error = %e, "Access token rejected"),
        }
        result
    }

    async fn run_pipeline(&self, token: &str, now: i64) -> Result<TokenClaims, ValidationError> {
        let segments: Vec<&str> = token.split('.').collect();
        let &[header_b64, payload_b64, signature_b64] = segments.as_slice() else {
            return Err(ValidationError::InvalidFormat);
        };
        let header_bytes = decode_base64url(header_b64).map_err(|_| ValidationError::InvalidFormat)?;
        let payload_bytes =
            decode_base64url(payload_b64).map_err(|_| ValidationError::InvalidFormat)?;
        let signature = decode_base64url(signature_b64).map_err(|_| ValidationError::InvalidFormat)?;
        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| ValidationError::InvalidFormat)?;

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(ValidationError::MissingKeyId)?;

        let key = self
            .jwks
            .get_signing_key(&kid)
            .await
            .ok_or_else(|| ValidationError::UnknownSigningKey(kid.clone()))?;

        let alg_name = header.alg.unwrap_or_else(|| "none".to_string());
        let algorithm: JwsAlgorithm = alg_name
            .parse()
            .map_err(|_| ValidationError::UnsupportedAlgorithm(alg_name.clone()))?;

        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        verify_signature(algorithm, &key, signing_input.as_bytes(), &signature).map_err(|e| {
            if let SignatureError::MalformedKey(reason) = &e {
                debug!(kid = %kid, reason = %reason, "Signing key material is unusable");
            }
            ValidationError::InvalidSignature
        })?;

        let claims: TokenClaims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| ValidationError::InvalidClaims(e.to_string()))?;

        if claims.iss != self.issuer {
            return Err(ValidationError::InvalidIssuer {
                expected: self.issuer.clone(),
                actual: claims.iss,
            });
        }

        if !claims.aud.contains(&self.audience) {
            return Err(ValidationError::InvalidAudience {
                expected: self.audience.clone(),
            });
        }

        if claims.exp.saturating_add(self.clock_skew) < now {
            return Err(ValidationError::Expired);
        }

        if let Some(nbf) = claims.nbf
            && nbf.saturating_sub(self.clock_skew) > now
        {
            return Err(ValidationError::NotYetValid);
        }

        Ok(claims)
    }

    /// Whether `claims` grant every scope in `required`.
    pub fn has_scopes<S: AsRef<str>>(&self, claims: &TokenClaims, required: &[S]) -> bool {
        has_scopes(claims, required)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TokenValidator {
        TokenValidator::new(TokenValidatorConfig::new(
            JwksClientConfig::new("https://auth.example.com/.well-known/jwks.json"),
            "https://auth.example.com",
            "https://api.example.com",
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn malformed_tokens_fail_before_key_lookup() {
        let v = validator();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.e30.sig"] {
            assert_eq!(v.validate(token).await, Err(ValidationError::InvalidFormat));
        }
    }

    #[tokio::test]
    async fn missing_kid_is_reported() {
        // {"alg":"ES256"} . {} . ""
        let token = "eyJhbGciOiJFUzI1NiJ9.e30.";
        assert_eq!(validator().validate(token).await, Err(ValidationError::MissingKeyId));
    }

    #[test]
    fn messages_and_codes() {
        assert_eq!(
            ValidationError::UnknownSigningKey("k1".into()).to_string(),
            "Unknown signing key: k1"
        );
        assert_eq!(
            ValidationError::InvalidIssuer {
                expected: "a".into(),
                actual: "b".into()
            }
            .to_string(),
            "Invalid issuer: expected a, got b"
        );
        assert_eq!(ValidationError::Expired.code(), AuthErrorCode::InvalidToken);
    }

    #[test]
    fn resource_config_derives_issuer_audience_and_jwks_uri() {
        let config = ResourceServerConfig::new("https://api.example.com", "https://auth.example.com");
        let v = TokenValidator::from_resource_config(&config, None).unwrap();
        assert_eq!(v.issuer(), "https://auth.example.com");
        assert_eq!(v.audience(), "https://api.example.com");
        assert_eq!(
            v.jwks_client().jwks_uri(),
            "https://auth.example.com/.well-known/jwks.json"
        );

        let v = TokenValidator::from_resource_config(&config, Some("/oauth/keys")).unwrap();
        assert_eq!(v.jwks_client().jwks_uri(), "https://auth.example.com/oauth/keys");

        let mut empty = config;
        empty.authorization_servers.clear();
        assert!(matches!(
            TokenValidator::from_resource_config(&empty, None),
            Err(AuthError::NoAuthorizationServer)
        ));
    }
}
