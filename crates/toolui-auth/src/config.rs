//! Resource-server configuration.
//!
//! Keys are camelCase on the wire, matching the configuration files and
//! tool manifests published alongside tool UI servers.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, AuthResult};

/// How a client may present its bearer token (RFC 6750 Section 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BearerMethod {
    /// `Authorization` request header
    Header,
    /// Form-encoded body parameter
    Body,
    /// URI query parameter
    Query,
}

/// Configuration of a protected resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceServerConfig {
    /// Canonical https URL of this resource; also the expected token audience
    pub resource: String,
    /// Issuers trusted to mint tokens for this resource
    pub authorization_servers: Vec<String>,
    /// Scopes this resource understands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    /// Human-readable documentation URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
    /// Accepted bearer token methods; `["header"]` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<BearerMethod>>,
}

impl ResourceServerConfig {
    /// Minimal configuration for `resource` trusting `authorization_server`.
    pub fn new(resource: impl Into<String>, authorization_server: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: vec![authorization_server.into()],
            scopes_supported: None,
            resource_documentation: None,
            bearer_methods_supported: None,
        }
    }

    /// Advertise `scopes`.
    pub fn with_scopes_supported(mut self, scopes: Vec<String>) -> Self {
        self.scopes_supported = Some(scopes);
        self
    }

    /// Link human-readable documentation.
    pub fn with_resource_documentation(mut self, url: impl Into<String>) -> Self {
        self.resource_documentation = Some(url.into());
        self
    }

    /// Override the accepted bearer methods.
    pub fn with_bearer_methods(mut self, methods: Vec<BearerMethod>) -> Self {
        self.bearer_methods_supported = Some(methods);
        self
    }

    /// Check that the resource and every authorization server are https URLs
    /// and that at least one authorization server is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidUrl`] for the first non-https URL, or
    /// [`AuthError::NoAuthorizationServer`] for an empty server list.
    pub fn validate(&self) -> AuthResult<()> {
        require_https(&self.resource)?;
        if self.authorization_servers.is_empty() {
            return Err(AuthError::NoAuthorizationServer);
        }
        for server in &self.authorization_servers {
            require_https(server)?;
        }
        Ok(())
    }
}

/// Per-tool security requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SecurityScheme {
    /// Callable without a token
    NoAuth,
    /// Requires a bearer token carrying `scopes`
    OAuth2 {
        /// Scopes the caller must hold
        scopes: Vec<String>,
    },
}

impl SecurityScheme {
    /// Reject an `oauth2` scheme that lists no scopes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] for an empty scope list.
    pub fn validate(&self) -> AuthResult<()> {
        match self {
            Self::OAuth2 { scopes } if scopes.is_empty() => Err(AuthError::InvalidConfig(
                "oauth2 security scheme requires at least one scope".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Parse `url` and require the `https` scheme.
///
/// # Errors
///
/// Returns [`AuthError::InvalidUrl`] when `url` does not parse or is not https.
pub fn require_https(url: &str) -> AuthResult<Url> {
    let parsed = Url::parse(url).map_err(|e| AuthError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "https" {
        return Err(AuthError::InvalidUrl {
            url: url.to_string(),
            reason: format!("scheme must be https, got {}", parsed.scheme()),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_keys() {
        let config: ResourceServerConfig = serde_json::from_value(json!({
            "resource": "https://api.example.com",
            "authorizationServers": ["https://auth.example.com"],
            "scopesSupported": ["read"],
            "bearerMethodsSupported": ["header", "query"]
        }))
        .unwrap();

        assert_eq!(config.authorization_servers, vec!["https://auth.example.com"]);
        assert_eq!(
            config.bearer_methods_supported,
            Some(vec![BearerMethod::Header, BearerMethod::Query])
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_plain_http_and_missing_servers() {
        let config = ResourceServerConfig::new("http://api.example.com", "https://auth.example.com");
        assert!(matches!(config.validate(), Err(AuthError::InvalidUrl { .. })));

        let mut config = ResourceServerConfig::new("https://api.example.com", "https://auth.example.com");
        config.authorization_servers.clear();
        assert_eq!(config.validate(), Err(AuthError::NoAuthorizationServer));

        let config = ResourceServerConfig::new("https://api.example.com", "http://auth.example.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn security_scheme_wire_shape() {
        let scheme: SecurityScheme =
            serde_json::from_value(json!({"type": "oauth2", "scopes": ["files:read"]})).unwrap();
        assert_eq!(
            scheme,
            SecurityScheme::OAuth2 {
                scopes: vec!["files:read".into()]
            }
        );
        let scheme: SecurityScheme = serde_json::from_value(json!({"type": "noauth"})).unwrap();
        assert_eq!(scheme, SecurityScheme::NoAuth);
    }

    #[test]
    fn oauth2_scheme_needs_scopes() {
        assert!(SecurityScheme::OAuth2 { scopes: vec![] }.validate().is_err());
        assert!(SecurityScheme::NoAuth.validate().is_ok());
    }
}
