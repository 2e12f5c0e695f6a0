//! # toolui-auth
//!
//! OAuth 2.1 resource-server authentication for tool UI servers.
//!
//! ## Features
//!
//! - **JWKS** - cached signing key retrieval with single-flight refresh
//! - **JWT validation** - RS256/384/512 and ES256/384/512 access tokens,
//!   issuer, audience and time checks with clock skew
//! - **Challenges** - RFC 6750 `WWW-Authenticate: Bearer` headers and their
//!   tool-call error form
//! - **Metadata** - RFC 9728 protected resource metadata and an axum router
//!   serving it
//! - **Guard** - bearer extraction, validation and scope checks in one step
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum::http::HeaderMap;
//! use toolui_auth::{ResourceGuard, ResourceServerConfig};
//!
//! # async fn handle(headers: HeaderMap) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ResourceServerConfig::new("https://mcp.example.com", "https://auth.example.com");
//! let guard = ResourceGuard::from_config(&config)?;
//!
//! match guard.authenticate_headers(&headers, &["files:read"]).await {
//!     Ok(request) => println!("caller: {:?}", request.subject()),
//!     Err(failure) => {
//!         let result = failure.into_tool_result();
//!         println!("{}", result.to_value());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bearer;
pub mod challenge;
pub mod config;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod metadata;
pub mod router;
pub mod tool_error;

pub use bearer::{AuthenticatedRequest, extract_bearer_token};
pub use challenge::{
    AuthErrorCode, BearerChallenge, ChallengeHelper, PROTECTED_RESOURCE_METADATA_PATH,
};
pub use config::{BearerMethod, ResourceServerConfig, SecurityScheme, require_https};
pub use error::{AuthError, AuthResult};
pub use guard::{AuthFailure, AuthFailureKind, ResourceGuard};
pub use jwt::{
    Jwk, JwksClient, JwksClientConfig, TokenClaims, TokenValidator, TokenValidatorConfig,
    ValidationError, has_scopes,
};
pub use metadata::{ProtectedResourceMetadata, ToolSecurity, collect_scopes, validate_resource_url};
pub use router::protected_resource_metadata_router;
pub use tool_error::{ToolErrorResult, tool_auth_error};
