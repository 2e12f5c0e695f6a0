//! JWT access token validation against a remote JWKS.

pub mod algorithm;
pub mod claims;
pub mod jwks;
pub mod validator;

pub use algorithm::{JwsAlgorithm, SignatureError, verify_signature};
pub use claims::{Audience, ScopeClaim, TokenClaims, has_scopes, parse_scopes};
pub use jwks::{
    DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, Jwk, JwksClient, JwksClientConfig, JwksError,
};
pub use validator::{
    DEFAULT_CLOCK_SKEW, DEFAULT_JWKS_PATH, TokenValidator, TokenValidatorConfig, ValidationError,
};
