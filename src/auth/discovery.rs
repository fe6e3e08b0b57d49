//! OIDC discovery-document fetching and caching.
//!
//! The discovery document (`<issuer>/.well-known/openid-configuration`) is
//! fetched once per TTL window and shared by all requests. The clock and the
//! HTTP fetch are both pluggable so tests can force expiry and count
//! outbound calls without real time or network.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::auth::error::AuthError;
use crate::config::AuthSettings;

/// Well-known path of the OIDC discovery document, relative to the issuer.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// A fetched OIDC discovery document.
///
/// Replaced wholesale on cache refresh, never partially mutated.
#[derive(Debug, Clone)]
pub struct ProviderConfig(Map<String, Value>);

impl ProviderConfig {
    /// Wrap a parsed discovery document.
    pub fn new(document: Map<String, Value>) -> Self {
        Self(document)
    }

    /// Look up a raw value in the document.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The `jwks_uri` entry, where the provider publishes its signing keys.
    pub fn jwks_uri(&self) -> Option<&str> {
        self.get("jwks_uri").and_then(Value::as_str)
    }

    /// The `issuer` entry as asserted by the provider itself.
    pub fn issuer(&self) -> Option<&str> {
        self.get("issuer").and_then(Value::as_str)
    }
}

/// Time source for cache expiry. Pluggable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Fetches a JSON document from a URL.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value, AuthError>;
}

/// Production fetcher backed by reqwest with a bounded timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, AuthError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::ConfigFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::ConfigFetch(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::ConfigFetch(e.to_string()))
    }
}

struct CachedDocument {
    config: Arc<ProviderConfig>,
    fetched_at: Instant,
}

/// TTL cache for the discovery document of the configured issuer.
///
/// Reads within the TTL window are served from memory. Expired entries are
/// refreshed single-flight: racing callers serialize on the refresh lock and
/// all but one observe the value the winner installed. No lock is held
/// across the network call except that refresh lock.
pub struct ProviderConfigCache {
    url: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn DocumentFetcher>,
    entry: RwLock<Option<CachedDocument>>,
    refresh: Mutex<()>,
}

impl ProviderConfigCache {
    /// Create a cache for the settings' primary issuer.
    ///
    /// Discovery uses only the first configured issuer; see
    /// [`AuthSettings::primary_issuer`].
    pub fn new(
        settings: &AuthSettings,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn DocumentFetcher>,
    ) -> Self {
        let issuer = settings.primary_issuer().trim_end_matches('/');
        Self {
            url: format!("{}{}", issuer, DISCOVERY_PATH),
            ttl: settings.config_ttl(),
            clock,
            fetcher,
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// The discovery URL this cache fetches from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the provider configuration, fetching if the cache is empty or
    /// expired. Fetch and parse failures propagate; they are never treated
    /// as an anonymous result.
    pub async fn get(&self) -> Result<Arc<ProviderConfig>, AuthError> {
        if let Some(config) = self.fresh_entry().await {
            return Ok(config);
        }

        // Single-flight refresh: the first caller through fetches, the rest
        // find a fresh entry after the lock.
        let _guard = self.refresh.lock().await;
        if let Some(config) = self.fresh_entry().await {
            return Ok(config);
        }

        debug!("Fetching OIDC configuration from {}", self.url);
        let document = self.fetcher.fetch_json(&self.url).await?;
        let Value::Object(map) = document else {
            return Err(AuthError::ConfigFetch(format!(
                "discovery document from {} is not a JSON object",
                self.url
            )));
        };

        let config = Arc::new(ProviderConfig::new(map));
        let mut entry = self.entry.write().await;
        *entry = Some(CachedDocument {
            config: config.clone(),
            fetched_at: self.clock.now(),
        });

        Ok(config)
    }

    async fn fresh_entry(&self) -> Option<Arc<ProviderConfig>> {
        let entry = self.entry.read().await;
        entry.as_ref().and_then(|cached| {
            let age = self.clock.now().saturating_duration_since(cached.fetched_at);
            (age < self.ttl).then(|| cached.config.clone())
        })
    }

    /// Drop the cached document (useful for testing).
    pub async fn clear(&self) {
        let mut entry = self.entry.write().await;
        *entry = None;
    }
}
