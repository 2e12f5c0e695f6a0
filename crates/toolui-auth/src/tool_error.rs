//! Authentication failures reported as tool-call error results.
//!
//! MCP clients read the challenge from `_meta["mcp/www_authenticate"]`
//! instead of an HTTP header when a tool call is rejected.

use serde::{Deserialize, Serialize};

/// `_meta` key carrying `WWW-Authenticate` challenges.
pub const WWW_AUTHENTICATE_META_KEY: &str = "mcp/www_authenticate";

/// A `text` content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "text")]
pub struct TextContent {
    /// Message shown to the user
    pub text: String,
}

/// `_meta` of an authentication error result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthErrorMeta {
    /// Challenges, most specific first
    #[serde(rename = "mcp/www_authenticate")]
    pub www_authenticate: Vec<String>,
}

/// Tool-call result signalling an authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolErrorResult {
    /// Human-readable explanation
    pub content: Vec<TextContent>,
    /// Challenge for the client
    #[serde(rename = "_meta")]
    pub meta: AuthErrorMeta,
    /// Always `true`
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolErrorResult {
    /// The first challenge.
    pub fn challenge(&self) -> Option<&str> {
        self.meta.www_authenticate.first().map(String::as_str)
    }

    /// The wire form.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Package `message` and `challenge` as a tool-call error result.
pub fn tool_auth_error(message: impl Into<String>, challenge: impl Into<String>) -> ToolErrorResult {
    ToolErrorResult {
        content: vec![TextContent {
            text: message.into(),
        }],
        meta: AuthErrorMeta {
            www_authenticate: vec![challenge.into()],
        },
        is_error: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn wire_shape() {
        let result = tool_auth_error("Authentication required", r#"Bearer error="invalid_request""#);
        assert_eq!(
            result.to_value(),
            json!({
                "content": [{"type": "text", "text": "Authentication required"}],
                "_meta": {"mcp/www_authenticate": ["Bearer error=\"invalid_request\""]},
                "isError": true
            })
        );
        assert_eq!(result.challenge(), Some(r#"Bearer error="invalid_request""#));
        assert!(result.to_value()["_meta"][WWW_AUTHENTICATE_META_KEY].is_array());
    }

    #[test]
    fn parses_back() {
        let value = tool_auth_error("denied", "Bearer").to_value();
        let parsed: ToolErrorResult = serde_json::from_value(value).unwrap();
        assert!(parsed.is_error);
        assert_eq!(parsed.content[0].text, "denied");
    }
}
