//! Bearer token extraction (RFC 6750 Section 2.1).

use http::HeaderMap;
use http::header::AUTHORIZATION;

use crate::jwt::TokenClaims;

/// Token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively. The value must be exactly two
/// space-separated parts with a non-empty token; anything else yields `None`.
///
/// ```rust
/// use toolui_auth::extract_bearer_token;
///
/// assert_eq!(extract_bearer_token(Some("bearer abc123")), Some("abc123"));
/// assert_eq!(extract_bearer_token(Some("Basic abc123")), None);
/// assert_eq!(extract_bearer_token(Some("Bearer abc 123")), None);
/// ```
pub fn extract_bearer_token(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split(' ');
    let (scheme, token) = (parts.next()?, parts.next()?);
    if parts.next().is_some() || token.is_empty() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}

/// Authentication state of an incoming request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthenticatedRequest {
    /// Raw `Authorization` header
    pub authorization_header: Option<String>,
    /// Bearer token, when the header is well formed
    pub bearer_token: Option<String>,
    /// Claims, once the token has been validated
    pub claims: Option<TokenClaims>,
    /// Whether `claims` were validated
    pub is_authenticated: bool,
}

impl AuthenticatedRequest {
    /// Unauthenticated context from request headers. The first
    /// `Authorization` value wins; non-UTF-8 values are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let authorization_header = headers
            .get_all(AUTHORIZATION)
            .iter()
            .next()
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bearer_token = extract_bearer_token(authorization_header.as_deref()).map(str::to_string);

        Self {
            authorization_header,
            bearer_token,
            claims: None,
            is_authenticated: false,
        }
    }

    /// Attach validated claims.
    pub fn authenticated(mut self, claims: TokenClaims) -> Self {
        self.claims = Some(claims);
        self.is_authenticated = true;
        self
    }

    /// Subject of the validated token.
    pub fn subject(&self) -> Option<&str> {
        self.claims.as_ref().map(|claims| claims.sub.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_well_formed_tokens() {
        assert_eq!(extract_bearer_token(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_bearer_token(Some("BEARER abc123")), Some("abc123"));
    }

    #[test]
    fn rejects_malformed_headers() {
        for header in ["Bearer", "Bearer ", "Basic abc123", "Bearer abc123 def456", " Bearer abc", ""] {
            assert_eq!(extract_bearer_token(Some(header)), None, "{header:?}");
        }
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn first_authorization_header_wins() {
        let mut headers = HeaderMap::new();
        headers.append(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        headers.append(AUTHORIZATION, HeaderValue::from_static("Bearer def456"));
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = AuthenticatedRequest::from_headers(&headers);
        assert_eq!(
            request,
            AuthenticatedRequest {
                authorization_header: Some("Bearer abc123".into()),
                bearer_token: Some("abc123".into()),
                claims: None,
                is_authenticated: false,
            }
        );
    }

    #[test]
    fn missing_authorization() {
        let request = AuthenticatedRequest::from_headers(&HeaderMap::new());
        assert_eq!(request, AuthenticatedRequest::default());
        assert_eq!(request.subject(), None);
    }
}
