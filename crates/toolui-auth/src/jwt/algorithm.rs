//! JWS signature algorithms and verification against a JWK.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Sha256, Sha384, Sha512};
use signature::Verifier;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::jwks::Jwk;

/// Asymmetric signature algorithms accepted for access tokens.
///
/// Symmetric (`HS*`) and `none` are deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JwsAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512,
    /// ECDSA P-256 with SHA-256
    ES256,
    /// ECDSA P-384 with SHA-384
    ES384,
    /// ECDSA P-521 with SHA-512
    ES512,
}

impl JwsAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [Self; 6] = [
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::ES256,
        Self::ES384,
        Self::ES512,
    ];

    /// The `alg` header value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
        }
    }

    /// The JWK `crv` an EC key must carry, `None` for RSA.
    pub const fn curve(self) -> Option<&'static str> {
        match self {
            Self::RS256 | Self::RS384 | Self::RS512 => None,
            Self::ES256 => Some("P-256"),
            Self::ES384 => Some("P-384"),
            Self::ES512 => Some("P-521"),
        }
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JwsAlgorithm {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| SignatureError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Why a signature did not verify.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SignatureError {
    /// The `alg` header names an algorithm outside [`JwsAlgorithm`].
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key's type, curve or pinned `alg` does not match.
    #[error("Key cannot verify {0}")]
    IncompatibleKey(JwsAlgorithm),

    /// The key material does not decode to a public key.
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// The signature does not match.
    #[error("Invalid signature")]
    Mismatch,
}

/// Verify `signature` over `message` with `key` under `algorithm`.
///
/// # Errors
///
/// Returns [`SignatureError::IncompatibleKey`] if the key cannot be used with
/// `algorithm`, [`SignatureError::MalformedKey`] if its material is invalid,
/// and [`SignatureError::Mismatch`] otherwise.
pub fn verify_signature(
    algorithm: JwsAlgorithm,
    key: &Jwk,
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    if !key.is_compatible_with(algorithm) {
        return Err(SignatureError::IncompatibleKey(algorithm));
    }

    match algorithm {
        JwsAlgorithm::RS256 | JwsAlgorithm::RS384 | JwsAlgorithm::RS512 => {
            verify_rsa(algorithm, key, message, signature)
        }
        JwsAlgorithm::ES256 => {
            let point = ec_point(key)?;
            let verifying = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| SignatureError::MalformedKey(e.to_string()))?;
            let sig = p256::ecdsa::Signature::from_slice(signature)
                .map_err(|_| SignatureError::Mismatch)?;
            verifying
                .verify(message, &sig)
                .map_err(|_| SignatureError::Mismatch)
        }
        JwsAlgorithm::ES384 => {
            let point = ec_point(key)?;
            let verifying = p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| SignatureError::MalformedKey(e.to_string()))?;
            let sig = p384::ecdsa::Signature::from_slice(signature)
                .map_err(|_| SignatureError::Mismatch)?;
            verifying
                .verify(message, &sig)
                .map_err(|_| SignatureError::Mismatch)
        }
        JwsAlgorithm::ES512 => {
            let point = ec_point(key)?;
            let verifying = p521::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| SignatureError::MalformedKey(e.to_string()))?;
            let sig = p521::ecdsa::Signature::from_slice(signature)
                .map_err(|_| SignatureError::Mismatch)?;
            verifying
                .verify(message, &sig)
                .map_err(|_| SignatureError::Mismatch)
        }
    }
}

fn verify_rsa(
    algorithm: JwsAlgorithm,
    key: &Jwk,
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let n = decode_member(key.n.as_deref(), "n")?;
    let e = decode_member(key.e.as_deref(), "e")?;
    let public = rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n),
        rsa::BigUint::from_bytes_be(&e),
    )
    .map_err(|e| SignatureError::MalformedKey(e.to_string()))?;

    let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(|_| SignatureError::Mismatch)?;
    let outcome = match algorithm {
        JwsAlgorithm::RS384 => rsa::pkcs1v15::VerifyingKey::<Sha384>::new(public).verify(message, &sig),
        JwsAlgorithm::RS512 => rsa::pkcs1v15::VerifyingKey::<Sha512>::new(public).verify(message, &sig),
        _ => rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public).verify(message, &sig),
    };
    outcome.map_err(|_| SignatureError::Mismatch)
}

/// Uncompressed SEC1 point `0x04 || x || y`.
fn ec_point(key: &Jwk) -> Result<Vec<u8>, SignatureError> {
    let x = decode_member(key.x.as_deref(), "x")?;
    let y = decode_member(key.y.as_deref(), "y")?;
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(&x);
    point.extend_from_slice(&y);
    Ok(point)
}

fn decode_member(value: Option<&str>, member: &str) -> Result<Vec<u8>, SignatureError> {
    let value = value.ok_or_else(|| SignatureError::MalformedKey(format!("missing {member}")))?;
    decode_base64url(value)
        .map_err(|e| SignatureError::MalformedKey(format!("{member}: {e}")))
}

/// Decode base64url, tolerating trailing padding.
pub(crate) fn decode_base64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))
}
