//! Common test utilities for integration tests
//!
//! A mock authorization server publishing a JWKS, deterministic signing
//! keys and a small JWT builder.

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::ecdsa::SigningKey as EcSigningKey;
use rsa::RsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde_json::{Map, Value, json};
use sha2::Sha256;
use signature::{SignatureEncoding, Signer};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use toolui_auth::{JwksClient, JwksClientConfig, TokenValidator};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

pub const ISSUER: &str = "https://auth.example.com";
pub const AUDIENCE: &str = "https://mcp.example.com";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";
pub const EC_KID: &str = "ec-2025";
pub const RSA_KID: &str = "rsa-2025";

/// Route crate logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("toolui_auth=debug")
        .with_test_writer()
        .try_init();
}

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

pub fn b64(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Deterministic P-256 key.
pub fn ec_key() -> EcSigningKey {
    EcSigningKey::from_slice(&[0x11; 32]).unwrap()
}

/// A second P-256 key that is never published.
pub fn rogue_ec_key() -> EcSigningKey {
    EcSigningKey::from_slice(&[0x22; 32]).unwrap()
}

/// RSA key shared by every test in the binary; generation is slow.
pub fn rsa_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
}

pub fn ec_jwk(kid: &str, key: &EcSigningKey) -> Value {
    let point = key.verifying_key().to_encoded_point(false);
    json!({
        "kty": "EC",
        "kid": kid,
        "use": "sig",
        "alg": "ES256",
        "crv": "P-256",
        "x": b64(point.x().unwrap()),
        "y": b64(point.y().unwrap()),
    })
}

pub fn rsa_jwk(kid: &str, key: &RsaPrivateKey) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": b64(key.n().to_bytes_be()),
        "e": b64(key.e().to_bytes_be()),
    })
}

/// Both published keys.
pub fn published_keys() -> Vec<Value> {
    vec![ec_jwk(EC_KID, &ec_key()), rsa_jwk(RSA_KID, rsa_key())]
}

/// Mock authorization server publishing a JWKS.
pub struct MockAuthServer {
    pub server: MockServer,
}

impl MockAuthServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Serve `keys`, expecting `expected_fetches` requests when verified.
    pub async fn mock_jwks(&self, keys: Vec<Value>, expected_fetches: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .expect(expected_fetches)
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` after `delay`.
    pub async fn mock_slow_jwks(&self, keys: Vec<Value>, delay: Duration, expected_fetches: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "keys": keys }))
                    .set_delay(delay),
            )
            .expect(expected_fetches)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_jwks_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    pub fn jwks_client(&self) -> Arc<JwksClient> {
        self.jwks_client_with(JwksClientConfig::new(self.jwks_uri()))
    }

    pub fn jwks_client_with(&self, config: JwksClientConfig) -> Arc<JwksClient> {
        Arc::new(JwksClient::new(config).unwrap())
    }

    pub fn validator(&self) -> TokenValidator {
        TokenValidator::with_jwks_client(
            self.jwks_client(),
            ISSUER,
            AUDIENCE,
            Duration::from_secs(60),
        )
    }
}

/// JWT builder with valid defaults.
#[derive(Clone)]
pub struct TokenBuilder {
    pub header: Map<String, Value>,
    pub claims: Map<String, Value>,
}

impl TokenBuilder {
    pub fn new(alg: &str, kid: &str) -> Self {
        let now = now();
        let header = json!({ "alg": alg, "typ": "JWT", "kid": kid });
        let claims = json!({
            "iss": ISSUER,
            "sub": "user-42",
            "aud": AUDIENCE,
            "iat": now,
            "exp": now + 3600,
            "scope": "files:read files:write",
        });
        Self {
            header: header.as_object().cloned().unwrap(),
            claims: claims.as_object().cloned().unwrap(),
        }
    }

    pub fn es256() -> Self {
        Self::new("ES256", EC_KID)
    }

    pub fn rs256() -> Self {
        Self::new("RS256", RSA_KID)
    }

    pub fn header(mut self, key: &str, value: Value) -> Self {
        self.header.insert(key.to_string(), value);
        self
    }

    pub fn without_header(mut self, key: &str) -> Self {
        self.header.remove(key);
        self
    }

    pub fn claim(mut self, key: &str, value: Value) -> Self {
        self.claims.insert(key.to_string(), value);
        self
    }

    fn signing_input(&self) -> String {
        format!(
            "{}.{}",
            b64(serde_json::to_vec(&self.header).unwrap()),
            b64(serde_json::to_vec(&self.claims).unwrap())
        )
    }

    pub fn sign_ec(&self, key: &EcSigningKey) -> String {
        let input = self.signing_input();
        let signature: p256::ecdsa::Signature = key.sign(input.as_bytes());
        format!("{input}.{}", b64(signature.to_bytes()))
    }

    pub fn sign_rsa(&self, key: &RsaPrivateKey) -> String {
        let input = self.signing_input();
        let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
        let signature = signer.sign(input.as_bytes());
        format!("{input}.{}", b64(signature.to_vec()))
    }

    /// Signed with the published EC key.
    pub fn build(&self) -> String {
        self.sign_ec(&ec_key())
    }
}
