//! End-to-end access token validation with real signatures.

mod common;

use common::{AUDIENCE, EC_KID, ISSUER, MockAuthServer, TokenBuilder, b64, published_keys};
use pretty_assertions::assert_eq;
use serde_json::json;
use toolui_auth::{ValidationError, has_scopes};

async fn server() -> MockAuthServer {
    common::init_tracing();
    let auth = MockAuthServer::start().await;
    auth.mock_jwks(published_keys(), 1).await;
    auth
}

#[tokio::test]
async fn es256_token_is_accepted() {
    let auth = server().await;
    let claims = auth
        .validator()
        .validate(&TokenBuilder::es256().claim("tenant", json!("acme")).build())
        .await
        .unwrap();

    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.sub, "user-42");
    assert!(claims.aud.contains(AUDIENCE));
    assert_eq!(claims.extra["tenant"], "acme");
    assert!(has_scopes(&claims, &["files:read"]));
    assert!(!has_scopes(&claims, &["admin"]));
}

#[tokio::test]
async fn rs256_token_is_accepted() {
    let auth = server().await;
    let token = TokenBuilder::rs256()
        .claim("aud", json!(["https://other.example.com", AUDIENCE]))
        .claim("scope", json!(["files:read"]))
        .sign_rsa(common::rsa_key());

    let claims = auth.validator().validate(&token).await.unwrap();
    assert_eq!(claims.scopes(), vec!["files:read"]);
}

#[tokio::test]
async fn tampered_payload_fails_signature() {
    let auth = server().await;
    let token = TokenBuilder::es256().build();
    let parts: Vec<&str> = token.split('.').collect();
    let forged_claims = TokenBuilder::es256().claim("sub", json!("admin")).claims;
    let forged = format!(
        "{}.{}.{}",
        parts[0],
        b64(serde_json::to_vec(&forged_claims).unwrap()),
        parts[2]
    );

    assert_eq!(
        auth.validator().validate(&forged).await,
        Err(ValidationError::InvalidSignature)
    );
}

#[tokio::test]
async fn foreign_key_fails_signature() {
    let auth = server().await;
    let token = TokenBuilder::es256().sign_ec(&common::rogue_ec_key());
    assert_eq!(
        auth.validator().validate(&token).await,
        Err(ValidationError::InvalidSignature)
    );
}

#[tokio::test]
async fn algorithm_must_match_key_type() {
    let auth = server().await;
    // RSA signature presented under the EC key id
    let token = TokenBuilder::new("RS256", EC_KID).sign_rsa(common::rsa_key());
    assert_eq!(
        auth.validator().validate(&token).await,
        Err(ValidationError::InvalidSignature)
    );
}

#[tokio::test]
async fn unsupported_algorithm_is_named() {
    let auth = server().await;
    let token = TokenBuilder::new("HS256", EC_KID).build();
    let err = auth.validator().validate(&token).await.unwrap_err();
    assert_eq!(err, ValidationError::UnsupportedAlgorithm("HS256".into()));
    assert_eq!(err.to_string(), "Unsupported algorithm: HS256");
}

#[tokio::test]
async fn unknown_kid_is_reported() {
    let auth = MockAuthServer::start().await;
    auth.mock_jwks(published_keys(), 1).await;
    let token = TokenBuilder::new("ES256", "retired-key").build();

    let err = auth.validator().validate(&token).await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown signing key: retired-key");
}

#[tokio::test]
async fn missing_kid_is_reported_before_fetching() {
    let auth = MockAuthServer::start().await;
    auth.mock_jwks(published_keys(), 0).await;
    let token = TokenBuilder::es256().without_header("kid").build();

    assert_eq!(
        auth.validator().validate(&token).await,
        Err(ValidationError::MissingKeyId)
    );
}

#[tokio::test]
async fn issuer_and_audience_are_enforced() {
    let auth = server().await;
    let validator = auth.validator();

    let wrong_issuer = TokenBuilder::es256()
        .claim("iss", json!("https://evil.example.com"))
        .build();
    assert_eq!(
        validator.validate(&wrong_issuer).await.unwrap_err().to_string(),
        "Invalid issuer: expected https://auth.example.com, got https://evil.example.com"
    );

    let wrong_audience = TokenBuilder::es256()
        .claim("aud", json!(["https://other.example.com"]))
        .build();
    assert_eq!(
        validator.validate(&wrong_audience).await.unwrap_err().to_string(),
        "Invalid audience: expected https://mcp.example.com"
    );
}

#[tokio::test]
async fn expiry_honors_clock_skew() {
    let auth = server().await;
    let validator = auth.validator();
    let now = common::now();

    let just_expired = TokenBuilder::es256().claim("exp", json!(now - 30)).build();
    assert!(validator.validate_at(&just_expired, now).await.is_ok());

    let long_expired = TokenBuilder::es256().claim("exp", json!(now - 61)).build();
    assert_eq!(
        validator.validate_at(&long_expired, now).await,
        Err(ValidationError::Expired)
    );
}

#[tokio::test]
async fn not_before_honors_clock_skew() {
    let auth = server().await;
    let validator = auth.validator();
    let now = common::now();

    let almost_valid = TokenBuilder::es256().claim("nbf", json!(now + 30)).build();
    assert!(validator.validate_at(&almost_valid, now).await.is_ok());

    let future = TokenBuilder::es256().claim("nbf", json!(now + 120)).build();
    assert_eq!(
        validator.validate_at(&future, now).await,
        Err(ValidationError::NotYetValid)
    );
}

#[tokio::test]
async fn malformed_claims_after_valid_signature() {
    let auth = server().await;
    let mut builder = TokenBuilder::es256();
    builder.claims.remove("sub");

    let err = auth.validator().validate(&builder.build()).await.unwrap_err();
    assert!(matches!(err, ValidationError::InvalidClaims(_)));
}

#[tokio::test]
async fn fractional_expiry_is_accepted() {
    let auth = server().await;
    let now = common::now();
    let token = TokenBuilder::es256()
        .claim("exp", json!(now as f64 + 300.5))
        .claim("iat", json!(now as f64 - 0.25))
        .build();

    let claims = auth.validator().validate_at(&token, now).await.unwrap();
    assert_eq!(claims.exp, now + 300);
}
