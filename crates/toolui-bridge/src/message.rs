//! Wire messages exchanged between host and guest.
//!
//! Every message is a JSON object discriminated by its `type` field. The
//! current protocol uses the `AUI_*` tags; guests built against the older
//! `OPENAI_*` spelling, and the bare legacy tags (`ready`, `resize`, ...), are
//! accepted and normalized by [`BridgeMessage::from_value`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{BridgeError, BridgeResult};
use crate::globals::GlobalsPatch;

/// Tag of a method call envelope.
pub const METHOD_CALL: &str = "AUI_METHOD_CALL";
/// Tag of a method response envelope.
pub const METHOD_RESPONSE: &str = "AUI_METHOD_RESPONSE";
/// Tag of a globals push.
pub const SET_GLOBALS: &str = "AUI_SET_GLOBALS";

const ALIASES: &[(&str, &str)] = &[
    ("OPENAI_SET_GLOBALS", SET_GLOBALS),
    ("OPENAI_METHOD_RESPONSE", METHOD_RESPONSE),
];

const KNOWN_TAGS: &[&str] = &[
    METHOD_CALL,
    METHOD_RESPONSE,
    SET_GLOBALS,
    "render",
    "ready",
    "resize",
    "action",
    "addResult",
    "error",
];

/// Correlation id pairing a method call with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Generate a fresh id of the form `<unix-millis>-<9 base36 chars>`.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix: String = (0..9)
            .map(|_| std::char::from_digit(fastrand::u32(0..36), 36).unwrap_or('0'))
            .collect();
        Self(format!("{millis}-{suffix}"))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A correlated request to run `method` on the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Correlation id chosen by the caller
    pub id: CallId,
    /// Method name, e.g. `callTool`
    pub method: String,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<Value>,
}

/// The answer to a [`MethodCall`]. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResponse {
    /// Id of the call being answered
    pub id: CallId,
    /// Successful result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message from the handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MethodResponse {
    /// Successful response.
    pub fn success(id: CallId, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response.
    pub fn failure(id: CallId, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into the caller-facing outcome. A present `error` wins.
    pub fn into_outcome(self) -> Result<Value, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Props of the legacy `render` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderProps {
    /// The tool's output
    #[serde(default)]
    pub result: Value,
    /// The tool's input
    #[serde(default)]
    pub args: Value,
}

/// Every message the bridge understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    /// Correlated method call.
    #[serde(rename = "AUI_METHOD_CALL")]
    MethodCall(MethodCall),

    /// Response to a method call.
    #[serde(rename = "AUI_METHOD_RESPONSE")]
    MethodResponse(MethodResponse),

    /// Host pushes changed (or, initially, all) global fields.
    #[serde(rename = "AUI_SET_GLOBALS")]
    SetGlobals {
        /// Changed top-level fields
        globals: GlobalsPatch,
    },

    /// Legacy initial render with the tool's input and output.
    #[serde(rename = "render")]
    Render {
        /// Name of the tool whose result is rendered
        #[serde(rename = "toolName", default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        /// Tool output and input
        props: RenderProps,
    },

    /// Legacy: the guest finished loading.
    #[serde(rename = "ready")]
    Ready,

    /// Legacy: the guest reports its content height.
    #[serde(rename = "resize")]
    Resize {
        /// Height in pixels when numeric
        #[serde(default)]
        payload: Value,
    },

    /// Legacy: a user action inside the guest.
    #[serde(rename = "action")]
    Action {
        /// Action payload
        #[serde(default)]
        payload: Value,
    },

    /// Legacy: the guest adds a result to the conversation.
    #[serde(rename = "addResult")]
    AddResult {
        /// Result payload
        #[serde(default)]
        payload: Value,
    },

    /// Legacy: the guest reports an error.
    #[serde(rename = "error")]
    Error {
        /// Error payload
        #[serde(default)]
        payload: Value,
    },
}

impl BridgeMessage {
    /// Decode a raw channel message.
    ///
    /// Aliased tags are rewritten to their `AUI_*` form first. Messages whose
    /// `type` is missing or not one the bridge knows return `Ok(None)`;
    /// the channel may carry traffic meant for someone else.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`] when the tag is known but the
    /// body does not have the expected shape.
    pub fn from_value(mut value: Value) -> BridgeResult<Option<Self>> {
        let Some(object) = value.as_object_mut() else {
            return Ok(None);
        };
        let Some(tag) = object
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            return Ok(None);
        };

        if let Some((_, canonical)) = ALIASES.iter().find(|(alias, _)| *alias == tag.as_str()) {
            object.insert("type".to_string(), Value::String((*canonical).to_string()));
        } else if !KNOWN_TAGS.contains(&tag.as_str()) {
            return Ok(None);
        }

        serde_json::from_value(value).map(Some).map_err(BridgeError::from)
    }

    /// Decode a message from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`] for invalid JSON or a malformed body.
    pub fn from_json(text: &str) -> BridgeResult<Option<Self>> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Encode as a JSON value ready to post.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`] if a payload cannot be encoded.
    pub fn to_value(&self) -> BridgeResult<Value> {
        serde_json::to_value(self).map_err(BridgeError::from)
    }

    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MethodCall(_) => METHOD_CALL,
            Self::MethodResponse(_) => METHOD_RESPONSE,
            Self::SetGlobals { .. } => SET_GLOBALS,
            Self::Render { .. } => "render",
            Self::Ready => "ready",
            Self::Resize { .. } => "resize",
            Self::Action { .. } => "action",
            Self::AddResult { .. } => "addResult",
            Self::Error { .. } => "error",
        }
    }
}
