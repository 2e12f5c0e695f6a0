//! Configuration-level errors.
//!
//! Token validation failures are not errors in this sense; they are
//! reported as [`crate::jwt::ValidationError`] values.

use thiserror::Error;

/// A specialized `Result` type for authentication setup.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Errors raised while building or validating authentication configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// The configuration is structurally invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A URL that must be an https URL is not.
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// No authorization server was configured.
    #[error("No authorization server configured")]
    NoAuthorizationServer,

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}
