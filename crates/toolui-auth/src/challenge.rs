//! `WWW-Authenticate: Bearer` challenges (RFC 6750 Section 3).
//!
//! Attributes are always rendered in the order
//! `realm, error, error_description, scope, resource_metadata`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ResourceServerConfig;

/// Well-known path of the protected resource metadata document (RFC 9728).
pub const PROTECTED_RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// Bearer token error codes (RFC 6750 Section 3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorCode {
    /// The request is missing a token or is malformed
    InvalidRequest,
    /// The token is expired, revoked, malformed or otherwise invalid
    InvalidToken,
    /// The token lacks the scopes the request needs
    InsufficientScope,
}

impl AuthErrorCode {
    /// Wire form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidToken => "invalid_token",
            Self::InsufficientScope => "insufficient_scope",
        }
    }

    /// HTTP status that accompanies the challenge.
    ///
    /// `invalid_request` is only issued for a missing token, which is
    /// answered with `401` like an invalid one.
    pub fn status(&self) -> http::StatusCode {
        match self {
            Self::InvalidRequest | Self::InvalidToken => http::StatusCode::UNAUTHORIZED,
            Self::InsufficientScope => http::StatusCode::FORBIDDEN,
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Bearer challenge.
///
/// ```rust
/// use toolui_auth::{AuthErrorCode, BearerChallenge};
///
/// let challenge = BearerChallenge::new(AuthErrorCode::InsufficientScope)
///     .with_scopes(["files:read", "files:write"])
///     .to_string();
/// assert_eq!(
///     challenge,
///     r#"Bearer error="insufficient_scope", scope="files:read files:write""#
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerChallenge {
    realm: Option<String>,
    error: Option<AuthErrorCode>,
    error_description: Option<String>,
    scopes: Vec<String>,
    resource_metadata: Option<String>,
}

impl BearerChallenge {
    /// Challenge carrying `error`.
    pub fn new(error: AuthErrorCode) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Set the protection realm.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Set the human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    /// Set the scopes needed to access the resource.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Point clients at the protected resource metadata document.
    pub fn with_resource_metadata(mut self, url: impl Into<String>) -> Self {
        self.resource_metadata = Some(url.into());
        self
    }

    /// The error code, if any.
    pub fn error(&self) -> Option<AuthErrorCode> {
        self.error
    }

    /// Required scopes.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Header value as a `String`.
    pub fn to_header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BearerChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = Vec::with_capacity(5);
        if let Some(realm) = &self.realm {
            params.push(format!("realm=\"{}\"", escape_param_value(realm)));
        }
        if let Some(error) = self.error {
            params.push(format!("error=\"{}\"", error.as_str()));
        }
        if let Some(description) = &self.error_description {
            params.push(format!(
                "error_description=\"{}\"",
                escape_param_value(description)
            ));
        }
        if !self.scopes.is_empty() {
            params.push(format!(
                "scope=\"{}\"",
                escape_param_value(&self.scopes.join(" "))
            ));
        }
        if let Some(url) = &self.resource_metadata {
            params.push(format!("resource_metadata=\"{}\"", escape_param_value(url)));
        }

        if params.is_empty() {
            f.write_str("Bearer")
        } else {
            write!(f, "Bearer {}", params.join(", "))
        }
    }
}

/// Escape `\` and `"` for a quoted-string parameter.
fn escape_param_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Default description for a request without a token.
pub const DEFAULT_UNAUTHORIZED_DESCRIPTION: &str = "Authorization required";
/// Default description for a rejected token.
pub const DEFAULT_INVALID_TOKEN_DESCRIPTION: &str = "The access token is invalid or expired";
/// Default description for a token lacking scopes.
pub const DEFAULT_INSUFFICIENT_SCOPE_DESCRIPTION: &str =
    "The access token does not have the required scopes";

/// Builds challenges that point back at one resource's metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeHelper {
    resource_metadata_url: String,
}

impl ChallengeHelper {
    /// Helper for `config.resource`.
    pub fn new(config: &ResourceServerConfig) -> Self {
        Self::for_resource(&config.resource)
    }

    /// Helper for the resource at `resource`.
    pub fn for_resource(resource: &str) -> Self {
        Self {
            resource_metadata_url: format!(
                "{}{}",
                resource.trim_end_matches('/'),
                PROTECTED_RESOURCE_METADATA_PATH
            ),
        }
    }

    /// URL of the metadata document advertised in every challenge.
    pub fn resource_metadata_url(&self) -> &str {
        &self.resource_metadata_url
    }

    /// `invalid_request` challenge for a request without a usable token.
    pub fn unauthorized(&self, description: Option<&str>) -> String {
        self.challenge(
            AuthErrorCode::InvalidRequest,
            description.unwrap_or(DEFAULT_UNAUTHORIZED_DESCRIPTION),
        )
        .to_string()
    }

    /// `invalid_token` challenge for a rejected token.
    pub fn invalid_token(&self, description: Option<&str>) -> String {
        self.challenge(
            AuthErrorCode::InvalidToken,
            description.unwrap_or(DEFAULT_INVALID_TOKEN_DESCRIPTION),
        )
        .to_string()
    }

    /// `insufficient_scope` challenge listing `required_scopes`.
    pub fn insufficient_scope<S: AsRef<str>>(
        &self,
        required_scopes: &[S],
        description: Option<&str>,
    ) -> String {
        self.challenge(
            AuthErrorCode::InsufficientScope,
            description.unwrap_or(DEFAULT_INSUFFICIENT_SCOPE_DESCRIPTION),
        )
        .with_scopes(required_scopes.iter().map(|s| s.as_ref().to_string()))
        .to_string()
    }

    fn challenge(&self, code: AuthErrorCode, description: &str) -> BearerChallenge {
        BearerChallenge::new(code)
            .with_description(description)
            .with_resource_metadata(self.resource_metadata_url.clone())
    }
}
