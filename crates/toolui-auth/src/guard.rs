//! Request authentication for protected tools.
//!
//! [`ResourceGuard`] ties bearer extraction, token validation and challenge
//! construction together:
//!
//! | condition                 | error code           | HTTP status |
//! |---------------------------|----------------------|-------------|
//! | no usable bearer token    | `invalid_request`    | 401         |
//! | token fails validation    | `invalid_token`      | 401         |
//! | token lacks a scope       | `insufficient_scope` | 403         |

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::{debug, info};

use crate::bearer::AuthenticatedRequest;
use crate::challenge::{AuthErrorCode, ChallengeHelper};
use crate::config::{ResourceServerConfig, SecurityScheme};
use crate::error::AuthResult;
use crate::jwt::{TokenValidator, ValidationError};
use crate::tool_error::{ToolErrorResult, tool_auth_error};

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailureKind {
    /// No bearer token in the request
    MissingToken,
    /// The token was rejected
    InvalidToken(ValidationError),
    /// Valid token without the required scopes
    InsufficientScope {
        /// Scopes the request needs
        required: Vec<String>,
    },
}

/// A refused request together with the challenge to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// What went wrong
    pub kind: AuthFailureKind,
    /// `WWW-Authenticate` header value
    pub challenge: String,
}

impl AuthFailure {
    /// The RFC 6750 error code.
    pub fn code(&self) -> AuthErrorCode {
        match &self.kind {
            AuthFailureKind::MissingToken => AuthErrorCode::InvalidRequest,
            AuthFailureKind::InvalidToken(e) => e.code(),
            AuthFailureKind::InsufficientScope { .. } => AuthErrorCode::InsufficientScope,
        }
    }

    /// HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        self.code().status()
    }

    /// Human-readable message.
    pub fn message(&self) -> String {
        match &self.kind {
            AuthFailureKind::MissingToken => "Authentication required".to_string(),
            AuthFailureKind::InvalidToken(e) => e.to_string(),
            AuthFailureKind::InsufficientScope { required } => {
                format!("Missing required scopes: {}", required.join(" "))
            }
        }
    }

    /// Tool-call error result carrying the challenge.
    pub fn into_tool_result(self) -> ToolErrorResult {
        tool_auth_error(self.message(), self.challenge)
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for AuthFailure {}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code().as_str(),
            "error_description": self.message(),
        });
        (
            self.status(),
            [(WWW_AUTHENTICATE, self.challenge)],
            Json(body),
        )
            .into_response()
    }
}

/// Authenticates requests against one protected resource.
#[derive(Debug, Clone)]
pub struct ResourceGuard {
    validator: TokenValidator,
    challenges: ChallengeHelper,
}

impl ResourceGuard {
    /// Guard from explicit parts.
    pub fn new(validator: TokenValidator, challenges: ChallengeHelper) -> Self {
        Self {
            validator,
            challenges,
        }
    }

    /// Guard for `config`, validating tokens from its first authorization server.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` is invalid or names no authorization server.
    pub fn from_config(config: &ResourceServerConfig) -> AuthResult<Self> {
        config.validate()?;
        Ok(Self::new(
            TokenValidator::from_resource_config(config, None)?,
            ChallengeHelper::new(config),
        ))
    }

    /// The token validator.
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// The challenge builder.
    pub fn challenges(&self) -> &ChallengeHelper {
        &self.challenges
    }

    /// Require a valid token carrying every scope in `required_scopes`.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthFailure`] describing the first unmet requirement.
    pub async fn authenticate<S: AsRef<str>>(
        &self,
        request: AuthenticatedRequest,
        required_scopes: &[S],
    ) -> Result<AuthenticatedRequest, AuthFailure> {
        let request = self.validate_token(request).await?;
        let granted = request.claims.as_ref().is_some_and(|claims| {
            self.validator.has_scopes(claims, required_scopes)
        });
        if granted {
            return Ok(request);
        }

        let required: Vec<String> = required_scopes.iter().map(|s| s.as_ref().to_string()).collect();
        info!(sub = request.subject().unwrap_or_default(), required = ?required, "Insufficient scope");
        Err(AuthFailure {
            challenge: self.challenges.insufficient_scope(required.as_slice(), None),
            kind: AuthFailureKind::InsufficientScope { required },
        })
    }

    /// [`Self::authenticate`] on raw request headers.
    ///
    /// # Errors
    ///
    /// See [`Self::authenticate`].
    pub async fn authenticate_headers<S: AsRef<str>>(
        &self,
        headers: &HeaderMap,
        required_scopes: &[S],
    ) -> Result<AuthenticatedRequest, AuthFailure> {
        self.authenticate(AuthenticatedRequest::from_headers(headers), required_scopes)
            .await
    }

    /// Authorize a call to a tool declaring `schemes`.
    ///
    /// Schemes are alternatives. A tool with no schemes or with `noauth` is
    /// public: the call proceeds unauthenticated, with claims attached when a
    /// valid token happens to be present. Otherwise the token must satisfy
    /// the scopes of at least one `oauth2` scheme.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthFailure`] for a protected tool called without a
    /// valid, sufficiently scoped token.
    pub async fn authorize_tool(
        &self,
        request: AuthenticatedRequest,
        schemes: Option<&[SecurityScheme]>,
    ) -> Result<AuthenticatedRequest, AuthFailure> {
        let schemes = schemes.unwrap_or_default();
        let oauth_scopes: Vec<&Vec<String>> = schemes
            .iter()
            .filter_map(|scheme| match scheme {
                SecurityScheme::OAuth2 { scopes } => Some(scopes),
                SecurityScheme::NoAuth => None,
            })
            .collect();
        let public = oauth_scopes.is_empty() || schemes.contains(&SecurityScheme::NoAuth);

        if public {
            if request.bearer_token.is_none() {
                return Ok(request);
            }
            return match self.validate_token(request.clone()).await {
                Ok(authenticated) => Ok(authenticated),
                Err(failure) => {
                    debug!(error = %failure, "Ignoring invalid token on public tool");
                    Ok(request)
                }
            };
        }

        let request = self.validate_token(request).await?;
        let satisfied = request.claims.as_ref().is_some_and(|claims| {
            oauth_scopes
                .iter()
                .any(|scopes| self.validator.has_scopes(claims, scopes.as_slice()))
        });
        if satisfied {
            return Ok(request);
        }

        let mut required: Vec<String> = oauth_scopes.into_iter().flatten().cloned().collect();
        required.sort();
        required.dedup();
        info!(sub = request.subject().unwrap_or_default(), required = ?required, "Insufficient scope for tool");
        Err(AuthFailure {
            challenge: self.challenges.insufficient_scope(required.as_slice(), None),
            kind: AuthFailureKind::InsufficientScope { required },
        })
    }

    async fn validate_token(
        &self,
        request: AuthenticatedRequest,
    ) -> Result<AuthenticatedRequest, AuthFailure> {
        let Some(token) = request.bearer_token.as_deref() else {
            debug!("Request carries no bearer token");
            return Err(AuthFailure {
                kind: AuthFailureKind::MissingToken,
                challenge: self.challenges.unauthorized(None),
            });
        };

        match self.validator.validate(token).await {
            Ok(claims) => Ok(request.authenticated(claims)),
            Err(e) => Err(AuthFailure {
                challenge: self.challenges.invalid_token(Some(&e.to_string())),
                kind: AuthFailureKind::InvalidToken(e),
            }),
        }
    }
}
