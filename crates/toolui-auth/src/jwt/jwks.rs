//! JWKS (JSON Web Key Set) fetching and caching
//!
//! - **TTL cache**: keys are served from memory for `cache_ttl` (default 1 hour)
//! - **Refetch on unknown `kid`**: a key id missing from a fresh cache triggers one refetch
//! - **Single flight**: concurrent misses share one in-flight request
//! - **Fail closed**: any fetch failure resolves to "no key"
//!
//! The cache is replaced wholesale on every successful fetch; keys never
//! survive a refetch that no longer lists them.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::{Host, Url};

use super::algorithm::JwsAlgorithm;
use crate::error::{AuthError, AuthResult};

/// Default lifetime of a fetched key set.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default bound on a single JWKS request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A JSON Web Key (RFC 7517).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA`, `EC`)
    pub kty: String,

    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Intended use (`sig`)
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve (`P-256`, `P-384`, `P-521`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// RSA key with modulus and exponent.
    pub fn is_rsa(&self) -> bool {
        self.kty == "RSA" && self.n.is_some() && self.e.is_some()
    }

    /// EC key with curve and both coordinates.
    pub fn is_ec(&self) -> bool {
        self.kty == "EC" && self.crv.is_some() && self.x.is_some() && self.y.is_some()
    }

    /// Usable for signature verification (`use` absent or `sig`).
    pub fn is_signing_key(&self) -> bool {
        self.use_.as_ref().is_none_or(|u| u == "sig")
    }

    /// Whether this key can verify signatures made with `algorithm`.
    ///
    /// RSA keys only verify `RS*`; EC keys only verify the `ES*` algorithm
    /// matching their curve. A key that pins `alg` only verifies that one.
    pub fn is_compatible_with(&self, algorithm: JwsAlgorithm) -> bool {
        if !self.is_signing_key() {
            return false;
        }
        if let Some(alg) = &self.alg
            && alg != algorithm.as_str()
        {
            return false;
        }
        match algorithm.curve() {
            None => self.is_rsa(),
            Some(curve) => self.is_ec() && self.crv.as_deref() == Some(curve),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawJwkSet {
    #[serde(default)]
    keys: Vec<Value>,
}

impl RawJwkSet {
    /// Keys indexed by `kid`. Keys without a `kid` or that do not parse are skipped.
    fn into_keyed(self) -> HashMap<String, Arc<Jwk>> {
        let mut keys = HashMap::with_capacity(self.keys.len());
        for raw in self.keys {
            match serde_json::from_value::<Jwk>(raw) {
                Ok(jwk) => match jwk.kid.clone() {
                    Some(kid) => {
                        keys.insert(kid, Arc::new(jwk));
                    }
                    None => debug!(kty = %jwk.kty, "Skipping JWK without kid"),
                },
                Err(e) => debug!(error = %e, "Skipping malformed JWK"),
            }
        }
        keys
    }
}

/// Why a JWKS fetch failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum JwksError {
    /// Transport-level failure.
    #[error("JWKS request failed: {0}")]
    Request(String),

    /// The request exceeded the fetch timeout.
    #[error("JWKS request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status.
    #[error("JWKS endpoint returned HTTP {0}")]
    Status(u16),

    /// The body was not a JWK set.
    #[error("Malformed JWKS document: {0}")]
    Body(String),
}

impl From<reqwest::Error> for JwksError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// JWKS client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwksClientConfig {
    /// JWKS endpoint; https, or http on a loopback host
    pub jwks_uri: String,
    /// How long a fetched key set is trusted
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: Duration,
    /// Bound on a single request
    #[serde(default = "default_fetch_timeout")]
    pub timeout: Duration,
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

impl JwksClientConfig {
    /// Defaults for `jwks_uri`.
    pub fn new(jwks_uri: impl Into<String>) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Override the cache lifetime.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct CachedJwks {
    keys: HashMap<String, Arc<Jwk>>,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<usize, JwksError>>>;

/// Fetches and caches a JWK set, resolving signing keys by `kid`.
///
/// # Example
///
/// ```rust,no_run
/// # use toolui_auth::jwt::{JwksClient, JwksClientConfig};
/// # tokio_test::block_on(async {
/// let client = JwksClient::new(JwksClientConfig::new(
///     "https://auth.example.com/.well-known/jwks.json",
/// ))?;
///
/// if let Some(key) = client.get_signing_key("key-2024-01").await {
///     println!("found {} key", key.kty);
/// }
/// # Ok::<(), toolui_auth::AuthError>(())
/// # });
/// ```
pub struct JwksClient {
    jwks_uri: String,
    cache_ttl: Duration,
    http: reqwest::Client,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    in_flight: Mutex<Option<(u64, SharedFetch)>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for JwksClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksClient")
            .field("jwks_uri", &self.jwks_uri)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl JwksClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidUrl`] when the endpoint is neither https
    /// nor http on a loopback host, or [`AuthError::HttpClient`] if the
    /// HTTP client cannot be built.
    pub fn new(config: JwksClientConfig) -> AuthResult<Self> {
        validate_jwks_uri(&config.jwks_uri)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::HttpClient(e.to_string()))?;

        Ok(Self {
            jwks_uri: config.jwks_uri,
            cache_ttl: config.cache_ttl,
            http,
            cache: Arc::new(RwLock::new(None)),
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    /// The endpoint this client fetches from.
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Resolve the signing key with id `kid`.
    ///
    /// Served from cache when the cache is fresh and holds `kid`; otherwise
    /// the key set is refetched once. Returns `None` if the fetch fails or
    /// the refreshed set still lacks `kid`.
    pub async fn get_signing_key(&self, kid: &str) -> Option<Arc<Jwk>> {
        if let Some(key) = self.cached_key(kid) {
            return Some(key);
        }

        debug!(kid, jwks_uri = %self.jwks_uri, "Signing key not cached, refreshing JWKS");
        if let Err(e) = self.refresh().await {
            warn!(kid, jwks_uri = %self.jwks_uri, error = %e, "JWKS refresh failed");
            return None;
        }

        let key = self.cached_key(kid);
        if key.is_none() {
            warn!(kid, jwks_uri = %self.jwks_uri, "Signing key not present in JWKS");
        }
        key
    }

    fn cached_key(&self, kid: &str) -> Option<Arc<Jwk>> {
        let cache = self.cache.read();
        cache
            .as_ref()
            .filter(|cached| cached.is_fresh(self.cache_ttl))
            .and_then(|cached| cached.keys.get(kid).cloned())
    }

    /// Fetch the key set now, joining a fetch already in progress.
    ///
    /// Returns the number of keys cached.
    ///
    /// # Errors
    ///
    /// Returns the [`JwksError`] of the shared fetch; the cache is left as it was.
    pub async fn refresh(&self) -> Result<usize, JwksError> {
        let (generation, fetch) = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some((generation, fetch)) => (*generation, fetch.clone()),
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let fetch = fetch_jwks(
                        self.http.clone(),
                        self.jwks_uri.clone(),
                        Arc::clone(&self.cache),
                    )
                    .boxed()
                    .shared();
                    *slot = Some((generation, fetch.clone()));
                    (generation, fetch)
                }
            }
        };

        let result = fetch.await;

        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|(current, _)| *current == generation) {
            *slot = None;
        }
        result
    }

    /// Drop the cached key set; the next lookup refetches.
    pub fn clear_cache(&self) {
        *self.cache.write() = None;
        debug!(jwks_uri = %self.jwks_uri, "JWKS cache cleared");
    }

    /// Key ids currently cached, fresh or not.
    pub fn cached_kids(&self) -> Vec<String> {
        self.cache
            .read()
            .as_ref()
            .map(|cached| cached.keys.keys().cloned().collect())
            .unwrap_or_default()
    }
}

async fn fetch_jwks(
    http: reqwest::Client,
    jwks_uri: String,
    cache: Arc<RwLock<Option<CachedJwks>>>,
) -> Result<usize, JwksError> {
    debug!(jwks_uri = %jwks_uri, "Fetching JWKS");
    let response = http
        .get(&jwks_uri)
        .header(ACCEPT, "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(JwksError::Status(status.as_u16()));
    }

    let body = response.bytes().await?;
    let set: RawJwkSet =
        serde_json::from_slice(&body).map_err(|e| JwksError::Body(e.to_string()))?;
    let keys = set.into_keyed();
    let key_count = keys.len();

    *cache.write() = Some(CachedJwks {
        keys,
        fetched_at: Instant::now(),
    });
    info!(jwks_uri = %jwks_uri, key_count, "JWKS refreshed");
    Ok(key_count)
}

/// Require https, allowing plain http only for loopback hosts.
fn validate_jwks_uri(uri: &str) -> AuthResult<()> {
    let parsed = Url::parse(uri).map_err(|e| AuthError::InvalidUrl {
        url: uri.to_string(),
        reason: e.to_string(),
    })?;
    let loopback = match parsed.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    };
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if loopback => Ok(()),
        other => Err(AuthError::InvalidUrl {
            url: uri.to_string(),
            reason: format!("JWKS endpoint must use https, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ec_key(kid: Option<&str>, crv: &str) -> Jwk {
        Jwk {
            kty: "EC".into(),
            kid: kid.map(str::to_string),
            alg: None,
            use_: Some("sig".into()),
            n: None,
            e: None,
            crv: Some(crv.into()),
            x: Some("x".into()),
            y: Some("y".into()),
        }
    }

    #[test]
    fn compatibility_follows_key_type_and_curve() {
        let key = ec_key(Some("k"), "P-256");
        assert!(key.is_compatible_with(JwsAlgorithm::ES256));
        assert!(!key.is_compatible_with(JwsAlgorithm::ES384));
        assert!(!key.is_compatible_with(JwsAlgorithm::RS256));

        let mut pinned = ec_key(Some("k"), "P-384");
        pinned.alg = Some("ES256".into());
        assert!(!pinned.is_compatible_with(JwsAlgorithm::ES384));

        let mut encryption = ec_key(Some("k"), "P-256");
        encryption.use_ = Some("enc".into());
        assert!(!encryption.is_compatible_with(JwsAlgorithm::ES256));
    }

    #[test]
    fn keys_without_kid_or_malformed_are_skipped() {
        let set: RawJwkSet = serde_json::from_value(json!({
            "keys": [
                serde_json::to_value(ec_key(Some("a"), "P-256")).unwrap(),
                serde_json::to_value(ec_key(None, "P-256")).unwrap(),
                {"kid": "no-kty"},
            ]
        }))
        .unwrap();
        let keys = set.into_keyed();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key("a"));
    }

    #[test]
    fn cache_freshness_uses_ttl() {
        let cached = CachedJwks {
            keys: HashMap::new(),
            fetched_at: Instant::now(),
        };
        assert!(cached.is_fresh(Duration::from_secs(60)));
        assert!(!cached.is_fresh(Duration::ZERO));
    }

    #[test]
    fn jwks_uri_must_be_https_unless_loopback() {
        assert!(validate_jwks_uri("https://auth.example.com/jwks").is_ok());
        assert!(validate_jwks_uri("http://127.0.0.1:8080/jwks").is_ok());
        assert!(validate_jwks_uri("http://localhost/jwks").is_ok());
        assert!(validate_jwks_uri("http://auth.example.com/jwks").is_err());
        assert!(validate_jwks_uri("not a url").is_err());
    }

    #[tokio::test]
    async fn clear_cache_empties_the_key_set() {
        let client = JwksClient::new(JwksClientConfig::new("https://auth.example.com/jwks")).unwrap();
        *client.cache.write() = Some(CachedJwks {
            keys: HashMap::from([("a".to_string(), Arc::new(ec_key(Some("a"), "P-256")))]),
            fetched_at: Instant::now(),
        });
        assert!(client.get_signing_key("a").await.is_some());

        client.clear_cache();
        assert!(client.cached_kids().is_empty());
    }
}
