//! Authenticator configuration.
//!
//! Settings are loaded once at startup, validated, and passed by `Arc` into
//! the authenticator and its sub-components. Nothing reads configuration
//! through globals after startup.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use std::{env, fs, path::PathBuf};
use url::Url;

/// Default Authorization scheme expected on incoming requests.
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

/// Default provider-config cache TTL in seconds (10 minutes).
pub const DEFAULT_CONFIG_EXPIRATION_SECS: u64 = 600;

/// Default timeout for outbound discovery/JWKS fetches in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;

/// Process-wide authentication settings, immutable after load.
///
/// `issuer` and `audience` accept either a single string or a non-empty list
/// in the serialized form; both are normalized to a list at load time so
/// downstream code never branches on the shape.
///
/// The user resolver is not a serialized setting; it is injected into the
/// authenticator as a strategy object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Trusted token issuer URL(s). Claim validation accepts any of them.
    #[serde(deserialize_with = "one_or_many")]
    pub issuer: Vec<String>,
    /// Accepted audience value(s). A token must carry at least one of them.
    #[serde(deserialize_with = "one_or_many")]
    pub audience: Vec<String>,
    /// Authorization header scheme, matched case-insensitively.
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    /// Realm reported in the WWW-Authenticate challenge.
    #[serde(default = "default_realm")]
    pub realm: String,
    /// How long a fetched OIDC discovery document stays cached, in seconds.
    #[serde(default = "default_config_expiration")]
    pub oidc_config_expiration_secs: u64,
    /// Timeout for each outbound discovery/JWKS fetch, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// When set, authentication additionally requires an API scope with
    /// `api_scope_prefix`.
    #[serde(default)]
    pub require_api_scope_for_authentication: bool,
    /// Prefix checked against the token's scopes when the flag above is set.
    #[serde(default)]
    pub api_scope_prefix: String,
}

fn default_auth_scheme() -> String {
    DEFAULT_AUTH_SCHEME.to_string()
}

fn default_realm() -> String {
    "api".to_string()
}

fn default_config_expiration() -> u64 {
    DEFAULT_CONFIG_EXPIRATION_SECS
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

/// Accept `"a"` or `["a", "b"]` and normalize to `Vec<String>`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

impl AuthSettings {
    /// Create settings for a single issuer and audience with defaults for
    /// everything else.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: vec![issuer.into()],
            audience: vec![audience.into()],
            auth_scheme: default_auth_scheme(),
            realm: default_realm(),
            oidc_config_expiration_secs: default_config_expiration(),
            fetch_timeout_secs: default_fetch_timeout(),
            require_api_scope_for_authentication: false,
            api_scope_prefix: String::new(),
        }
    }

    /// Enable the API scope requirement with the given prefix.
    pub fn with_required_api_scope(mut self, prefix: impl Into<String>) -> Self {
        self.require_api_scope_for_authentication = true;
        self.api_scope_prefix = prefix.into();
        self
    }

    /// The issuer used for the discovery-document fetch.
    ///
    /// Only the first configured issuer is used for discovery, while claim
    /// validation accepts the full issuer list. This asymmetry mirrors the
    /// long-standing behavior of deployments this authenticator replaces;
    /// true multi-issuer discovery would key the cache per issuer.
    pub fn primary_issuer(&self) -> &str {
        self.issuer.first().map(String::as_str).unwrap_or_default()
    }

    /// Provider-config cache TTL.
    pub fn config_ttl(&self) -> Duration {
        Duration::from_secs(self.oidc_config_expiration_secs)
    }

    /// Outbound fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Validate the loaded settings.
    ///
    /// Checks that issuer/audience lists are non-empty, issuers parse as
    /// URLs, the scheme is non-empty, and a scope prefix is present when the
    /// scope requirement is enabled.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.issuer.is_empty() {
            anyhow::bail!("`issuer` must contain at least one entry");
        }
        if self.audience.is_empty() {
            anyhow::bail!("`audience` must contain at least one entry");
        }
        for issuer in &self.issuer {
            Url::parse(issuer)
                .map_err(|e| anyhow::anyhow!("issuer `{}` is not a valid URL: {}", issuer, e))?;
        }
        if self.auth_scheme.trim().is_empty() {
            anyhow::bail!("`auth_scheme` must not be empty");
        }
        if self.require_api_scope_for_authentication && self.api_scope_prefix.is_empty() {
            anyhow::bail!(
                "`api_scope_prefix` is required when \
                 `require_api_scope_for_authentication` is enabled"
            );
        }
        Ok(())
    }
}

/// Locate the settings file.
///
/// Checks `TOKENGATE_CONFIG`, then `$XDG_CONFIG_HOME/tokengate/tokengate.json`,
/// then `./tokengate.json`.
pub fn resolve_settings_path() -> anyhow::Result<PathBuf> {
    if let Ok(p) = env::var("TOKENGATE_CONFIG") {
        return Ok(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("tokengate").join("tokengate.json");
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let candidate = PathBuf::from("tokengate.json");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow::anyhow!(
        "Could not find tokengate.json (set TOKENGATE_CONFIG or create ./tokengate.json)"
    ))
}

/// Load and validate settings from the given path.
pub fn load_settings(path: &PathBuf) -> anyhow::Result<AuthSettings> {
    let raw = fs::read_to_string(path)?;
    let settings: AuthSettings = serde_json::from_str(&raw)?;
    settings.validate()?;
    Ok(settings)
}
