//! Access token claims.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The `aud` claim: one audience or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience
    Single(String),
    /// Multiple audiences
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `audience` is one of the token's audiences.
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(aud) => aud == audience,
            Self::Multiple(auds) => auds.iter().any(|a| a == audience),
        }
    }
}

/// The `scope` claim: a space-delimited string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeClaim {
    /// `"read write"`
    Delimited(String),
    /// `["read", "write"]`
    List(Vec<String>),
}

/// Claims of a validated access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject
    pub sub: String,
    /// Audience
    pub aud: Audience,
    /// Expiry, seconds since the epoch
    #[serde(deserialize_with = "numeric_date")]
    pub exp: i64,
    /// Issued at, seconds since the epoch
    #[serde(deserialize_with = "numeric_date")]
    pub iat: i64,
    /// Not before, seconds since the epoch
    #[serde(
        default,
        deserialize_with = "optional_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,
    /// Granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeClaim>,
    /// Every other claim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// Granted scopes as a list.
    pub fn scopes(&self) -> Vec<String> {
        match &self.scope {
            None => Vec::new(),
            Some(ScopeClaim::Delimited(scope)) => parse_scopes(scope),
            Some(ScopeClaim::List(scopes)) => scopes.clone(),
        }
    }

    /// Whether every scope in `required` was granted.
    pub fn has_scopes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        has_scopes(self, required)
    }
}

/// RFC 7519 NumericDate: integral or fractional seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumericDate {
    Seconds(i64),
    Fractional(f64),
}

impl NumericDate {
    /// Whole seconds, truncating any fraction.
    fn seconds(self) -> i64 {
        match self {
            Self::Seconds(secs) => secs,
            Self::Fractional(secs) => secs.trunc() as i64,
        }
    }
}

fn numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    NumericDate::deserialize(deserializer).map(NumericDate::seconds)
}

fn optional_numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<NumericDate>::deserialize(deserializer)?.map(NumericDate::seconds))
}

/// Split a space-delimited scope string, dropping empty entries.
pub fn parse_scopes(scope: &str) -> Vec<String> {
    scope
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `claims` grant every scope in `required`. An empty requirement is
/// always satisfied.
pub fn has_scopes<S: AsRef<str>>(claims: &TokenClaims, required: &[S]) -> bool {
    if required.is_empty() {
        return true;
    }
    let granted = claims.scopes();
    required
        .iter()
        .all(|scope| granted.iter().any(|g| g == scope.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(scope: Value) -> TokenClaims {
        serde_json::from_value(json!({
            "iss": "https://auth.example.com",
            "sub": "user-1",
            "aud": ["https://api.example.com", "other"],
            "exp": 2_000_000_000,
            "iat": 1_000_000_000,
            "scope": scope,
            "tenant": "acme"
        }))
        .unwrap()
    }

    #[test]
    fn scope_string_and_list_are_equivalent() {
        let delimited = claims(json!("read  write"));
        let listed = claims(json!(["read", "write"]));
        assert_eq!(delimited.scopes(), vec!["read", "write"]);
        assert_eq!(listed.scopes(), delimited.scopes());
    }

    #[test]
    fn has_scopes_requires_all() {
        let c = claims(json!("read write"));
        assert!(c.has_scopes(&["read"]));
        assert!(c.has_scopes(&["write", "read"]));
        assert!(!c.has_scopes(&["read", "admin"]));
        assert!(c.has_scopes::<&str>(&[]));
    }

    #[test]
    fn missing_scope_grants_nothing() {
        let mut c = claims(json!("read"));
        c.scope = None;
        assert!(!c.has_scopes(&["read"]));
        assert!(c.has_scopes::<String>(&[]));
    }

    #[test]
    fn audience_membership_and_extra_claims() {
        let c = claims(json!("read"));
        assert!(c.aud.contains("https://api.example.com"));
        assert!(!c.aud.contains("https://evil.example.com"));
        assert_eq!(c.extra["tenant"], "acme");
    }

    #[test]
    fn fractional_numeric_dates_are_truncated() {
        let c: TokenClaims = serde_json::from_value(json!({
            "iss": "https://auth.example.com",
            "sub": "user-1",
            "aud": "https://api.example.com",
            "exp": 1_700_000_000.5,
            "iat": 1_699_999_000.25,
            "nbf": 1_699_999_000.9
        }))
        .unwrap();
        assert_eq!(c.exp, 1_700_000_000);
        assert_eq!(c.iat, 1_699_999_000);
        assert_eq!(c.nbf, Some(1_699_999_000));
    }

    #[test]
    fn non_numeric_dates_are_rejected() {
        let result = serde_json::from_value::<TokenClaims>(json!({
            "iss": "https://auth.example.com",
            "sub": "user-1",
            "aud": "https://api.example.com",
            "exp": "tomorrow",
            "iat": 1_699_999_000
        }));
        assert!(result.is_err());
    }
}
