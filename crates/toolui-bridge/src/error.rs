//! Bridge error types.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced by the bridge to the code that issued a call.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BridgeError {
    /// The remote side has no handler registered for the method.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// The positional arguments did not match the method's signature.
    #[error("Invalid arguments for {method}: {reason}")]
    InvalidArguments {
        /// Method whose arguments were rejected
        method: String,
        /// What was wrong with them
        reason: String,
    },

    /// No response arrived within the call window.
    #[error("Method call timed out: {method}")]
    Timeout {
        /// Method that timed out
        method: String,
        /// The window that was exceeded
        timeout: Duration,
    },

    /// The remote handler rejected the call with an error message.
    #[error("{0}")]
    Remote(String),

    /// The channel to the other side is gone.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// A value could not be serialized or deserialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A call with the same correlation id is already in flight.
    #[error("Duplicate call id: {0}")]
    DuplicateCall(String),
}

impl BridgeError {
    /// Whether this error came from the remote handler rather than the bridge itself.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::UnknownMethod(_))
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error returned by a capability handler.
///
/// Only the message crosses the channel; the remote caller sees it verbatim
/// as [`BridgeError::Remote`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CapabilityError {
    message: String,
}

impl CapabilityError {
    /// Create an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error for a capability the host chose not to provide.
    pub fn unsupported(method: &str) -> Self {
        Self::new(format!("Capability not supported: {method}"))
    }

    /// The message sent to the caller.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for CapabilityError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for CapabilityError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<BridgeError> for CapabilityError {
    fn from(err: BridgeError) -> Self {
        Self::new(err.to_string())
    }
}
