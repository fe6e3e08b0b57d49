//! Signing-key resolution via the provider's published JWKS.
//!
//! The discovery document's `jwks_uri` points at the provider's key set.
//! Keys are parsed into `jsonwebtoken` decoding keys, cached by `kid`, and
//! refreshed on the same TTL as the discovery document so rotated keys are
//! picked up without restarting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::auth::discovery::{Clock, DocumentFetcher, ProviderConfigCache};
use crate::auth::error::AuthError;

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA")
    pub kty: String,
    /// Key ID, matched against the JWT header `kid`
    pub kid: Option<String>,
    /// Algorithm (e.g., "RS256")
    pub alg: Option<String>,
    /// Key use ("sig" or "enc")
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url encoded)
    pub n: Option<String>,
    /// RSA exponent (base64url encoded)
    pub e: Option<String>,
    /// X.509 certificate chain
    pub x5c: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Clone)]
struct CachedKey {
    key: DecodingKey,
    algorithm: Algorithm,
}

/// TTL cache of the provider's signing keys, keyed by `kid`.
pub struct SigningKeyCache {
    discovery: Arc<ProviderConfigCache>,
    ttl: std::time::Duration,
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn DocumentFetcher>,
    keys: RwLock<HashMap<String, CachedKey>>,
    last_fetch: RwLock<Option<Instant>>,
    refresh: Mutex<()>,
}

impl SigningKeyCache {
    /// Create a key cache fed by the given discovery cache.
    pub fn new(
        discovery: Arc<ProviderConfigCache>,
        ttl: std::time::Duration,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn DocumentFetcher>,
    ) -> Self {
        Self {
            discovery,
            ttl,
            clock,
            fetcher,
            keys: RwLock::new(HashMap::new()),
            last_fetch: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Get the decoding key and algorithm for a token's `kid`.
    ///
    /// With `kid` absent the first cached key is used. A key missing from a
    /// fresh key set is an invalid token, not a fetch failure: the provider
    /// simply never published it.
    pub async fn get_key(&self, kid: Option<&str>) -> Result<(DecodingKey, Algorithm), AuthError> {
        if self.is_fresh().await {
            if let Some(cached) = self.from_cache(kid).await {
                return Ok((cached.key, cached.algorithm));
            }
        }

        let _guard = self.refresh.lock().await;
        if self.is_fresh().await {
            if let Some(cached) = self.from_cache(kid).await {
                return Ok((cached.key, cached.algorithm));
            }
        }

        self.fetch_keys().await?;

        match self.from_cache(kid).await {
            Some(cached) => Ok((cached.key, cached.algorithm)),
            None => Err(AuthError::InvalidToken(match kid {
                Some(k) => format!("Unknown signing key: {}", k),
                None => "No signing keys available".to_string(),
            })),
        }
    }

    async fn is_fresh(&self) -> bool {
        let last_fetch = self.last_fetch.read().await;
        match *last_fetch {
            Some(t) => self.clock.now().saturating_duration_since(t) < self.ttl,
            None => false,
        }
    }

    async fn from_cache(&self, kid: Option<&str>) -> Option<CachedKey> {
        let keys = self.keys.read().await;
        match kid {
            Some(k) => keys.get(k).cloned(),
            None => keys.values().next().cloned(),
        }
    }

    async fn fetch_keys(&self) -> Result<(), AuthError> {
        let config = self.discovery.get().await?;
        let jwks_uri = config.jwks_uri().ok_or_else(|| {
            AuthError::ConfigFetch("discovery document has no jwks_uri".to_string())
        })?;

        debug!("Fetching JWKS from {}", jwks_uri);
        let document = self.fetcher.fetch_json(jwks_uri).await?;
        let jwks: JwksDocument = serde_json::from_value(document)
            .map_err(|e| AuthError::ConfigFetch(format!("invalid JWKS document: {}", e)))?;

        let mut new_keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                debug!("Skipping non-RSA key: {}", jwk.kty);
                continue;
            }
            if jwk.key_use.as_deref() == Some("enc") {
                debug!("Skipping encryption key");
                continue;
            }

            match Self::decode_jwk(&jwk) {
                Ok(cached) => {
                    let kid = jwk.kid.clone().unwrap_or_else(|| "default".to_string());
                    debug!("Cached signing key with kid: {}", kid);
                    new_keys.insert(kid, cached);
                }
                Err(e) => {
                    warn!("Failed to parse JWK: {}", e);
                }
            }
        }

        if new_keys.is_empty() {
            return Err(AuthError::ConfigFetch(
                "no usable signing keys in JWKS".to_string(),
            ));
        }

        {
            let mut keys = self.keys.write().await;
            *keys = new_keys;
        }
        {
            let mut last_fetch = self.last_fetch.write().await;
            *last_fetch = Some(self.clock.now());
        }

        Ok(())
    }

    fn decode_jwk(jwk: &Jwk) -> Result<CachedKey, AuthError> {
        let algorithm = match jwk.alg.as_deref() {
            Some(alg) => alg.parse::<Algorithm>().map_err(|_| {
                AuthError::ConfigFetch(format!("unsupported JWK algorithm: {}", alg))
            })?,
            None => Algorithm::RS256,
        };

        // Prefer n/e components, the common case in JWKS documents.
        if let (Some(n), Some(e)) = (&jwk.n, &jwk.e) {
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|e| AuthError::ConfigFetch(format!("invalid RSA components: {}", e)))?;
            return Ok(CachedKey { key, algorithm });
        }

        // Fall back to the x5c certificate chain.
        if let Some(cert) = jwk.x5c.as_ref().and_then(|chain| chain.first()) {
            // x5c entries are standard (not URL-safe) base64 DER.
            let der = base64::engine::general_purpose::STANDARD
                .decode(cert)
                .map_err(|e| AuthError::ConfigFetch(format!("invalid x5c entry: {}", e)))?;
            return Ok(CachedKey {
                key: DecodingKey::from_rsa_der(&der),
                algorithm,
            });
        }

        Err(AuthError::ConfigFetch(
            "RSA key missing both n/e components and x5c".to_string(),
        ))
    }

    /// Number of cached keys.
    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }
}
