//! OAuth 2.0 Protected Resource Metadata (RFC 9728).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;

use crate::config::{BearerMethod, ResourceServerConfig, SecurityScheme};

/// The document served at `/.well-known/oauth-protected-resource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Resource identifier
    pub resource: String,
    /// Authorization servers that issue tokens for this resource
    pub authorization_servers: Vec<String>,
    /// Scopes understood by this resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    /// Accepted ways of presenting a bearer token
    pub bearer_methods_supported: Vec<BearerMethod>,
    /// Human-readable documentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
}

impl ProtectedResourceMetadata {
    /// Metadata for `config`; bearer methods default to `["header"]`.
    pub fn generate(config: &ResourceServerConfig) -> Self {
        Self {
            resource: config.resource.clone(),
            authorization_servers: config.authorization_servers.clone(),
            scopes_supported: config.scopes_supported.clone(),
            bearer_methods_supported: config
                .bearer_methods_supported
                .clone()
                .unwrap_or_else(|| vec![BearerMethod::Header]),
            resource_documentation: config.resource_documentation.clone(),
        }
    }
}

impl From<&ResourceServerConfig> for ProtectedResourceMetadata {
    fn from(config: &ResourceServerConfig) -> Self {
        Self::generate(config)
    }
}

/// The security declaration of a tool, as found in tool manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSecurity {
    /// Accepted schemes; absent means the tool declares none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_schemes: Option<Vec<SecurityScheme>>,
}

impl ToolSecurity {
    /// Declaration with `schemes`.
    pub fn new(schemes: Vec<SecurityScheme>) -> Self {
        Self {
            security_schemes: Some(schemes),
        }
    }
}

/// Sorted, de-duplicated union of every `oauth2` scope declared by `tools`.
pub fn collect_scopes<'a, I>(tools: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ToolSecurity>,
{
    tools
        .into_iter()
        .filter_map(|tool| tool.security_schemes.as_deref())
        .flatten()
        .filter_map(|scheme| match scheme {
            SecurityScheme::OAuth2 { scopes } => Some(scopes),
            SecurityScheme::NoAuth => None,
        })
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Whether `url` parses and uses `https`.
pub fn validate_resource_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| parsed.scheme() == "https")
}
