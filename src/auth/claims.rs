//! Decoded token claims and their validation.

use std::sync::Arc;

use jsonwebtoken::{Validation, decode, decode_header};
use serde_json::{Map, Value};
use tracing::debug;

use crate::auth::error::AuthError;
use crate::auth::jwks::SigningKeyCache;
use crate::config::AuthSettings;

/// Validated claims decoded from a token payload.
///
/// The `amr` claim is always in its canonical shape here: a sequence of
/// strings, never a bare string.
#[derive(Debug, Clone)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Wrap an already-normalized claims map.
    pub fn new(payload: Map<String, Value>) -> Self {
        Self(payload)
    }

    /// Look up a raw claim value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The `sub` claim.
    pub fn sub(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// The `email` claim.
    pub fn email(&self) -> Option<&str> {
        self.get("email").and_then(Value::as_str)
    }

    /// The `name` claim.
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    /// The `amr` claim (authentication methods references).
    pub fn amr(&self) -> Option<&Value> {
        self.get("amr")
    }

    /// Scope values from the space-delimited `scope` claim.
    pub fn scopes(&self) -> Vec<&str> {
        self.get("scope")
            .and_then(Value::as_str)
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// The underlying claims map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Coerce a string-valued `amr` claim into a one-element array.
///
/// Some OPs provide `amr` as a bare string while the specification requires
/// an array of strings. Idempotent: an already-array `amr` is untouched.
pub fn normalize_amr(payload: &mut Map<String, Value>) {
    if let Some(amr) = payload.get("amr")
        && amr.is_string()
    {
        let value = amr.clone();
        payload.insert("amr".to_string(), Value::Array(vec![value]));
        debug!("Modified \"amr\" claim to be an array of strings instead of a string");
    }
}

/// Validates raw bearer credentials into [`Claims`].
pub struct ClaimsValidator {
    settings: Arc<AuthSettings>,
    keys: Arc<SigningKeyCache>,
}

impl ClaimsValidator {
    /// Create a validator using the given signing-key cache.
    pub fn new(settings: Arc<AuthSettings>, keys: Arc<SigningKeyCache>) -> Self {
        Self { settings, keys }
    }

    /// Decode and validate a raw credential.
    ///
    /// Verifies the signature against the provider's published keys and
    /// checks issuer, audience, and expiry. The `aud` claim is essential:
    /// its absence is a failure, not an unchecked pass. On success the
    /// `amr` normalization has already been applied.
    pub async fn validate(&self, credential: &str) -> Result<Claims, AuthError> {
        let header = decode_header(credential).map_err(|e| {
            debug!("Failed to parse token header: {}", e);
            AuthError::InvalidToken("Invalid token".to_string())
        })?;

        let (key, algorithm) = self.keys.get_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&self.settings.issuer);
        validation.set_audience(&self.settings.audience);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let token_data = decode::<Map<String, Value>>(credential, &key, &validation)
            .map_err(|e| map_decode_error(&e))?;

        let mut payload = token_data.claims;
        normalize_amr(&mut payload);

        debug!("Token payload decoded as: {:?}", payload);

        Ok(Claims::new(payload))
    }
}

/// Map a decode failure to a generic user-visible message.
///
/// The underlying error is traced at debug level only; responses never carry
/// token contents or cryptographic detail.
fn map_decode_error(e: &jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;

    debug!("Token validation failed: {}", e);

    let message = match e.kind() {
        ErrorKind::ExpiredSignature => "Token expired".to_string(),
        ErrorKind::ImmatureSignature => "Token not yet valid".to_string(),
        ErrorKind::InvalidAudience => "Invalid audience".to_string(),
        ErrorKind::InvalidIssuer => "Invalid issuer".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => {
            format!("Missing required claim: {}", claim)
        }
        _ => "Invalid token signature".to_string(),
    };

    AuthError::InvalidToken(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::discovery::ProviderConfigCache;
    use crate::auth::discovery::test_support::{ManualClock, StaticFetcher};
    use crate::auth::test_keys::{self, TestTokenBuilder};
    use serde_json::json;

    fn validator_for(settings: AuthSettings) -> ClaimsValidator {
        let settings = Arc::new(settings);
        let clock = Arc::new(ManualClock::new());
        let fetcher = Arc::new(
            StaticFetcher::new()
                .respond(
                    &format!(
                        "{}/.well-known/openid-configuration",
                        settings.primary_issuer().trim_end_matches('/')
                    ),
                    json!({"jwks_uri": "https://idp.example/jwks"}),
                )
                .respond("https://idp.example/jwks", test_keys::jwks_document()),
        );
        let discovery = Arc::new(ProviderConfigCache::new(
            &settings,
            clock.clone(),
            fetcher.clone(),
        ));
        let keys = Arc::new(SigningKeyCache::new(
            discovery,
            settings.config_ttl(),
            clock,
            fetcher,
        ));
        ClaimsValidator::new(settings, keys)
    }

    fn default_settings() -> AuthSettings {
        AuthSettings::new("https://idp.example", "api")
    }

    #[tokio::test]
    async fn test_valid_token_decodes() {
        let validator = validator_for(default_settings());
        let token = TestTokenBuilder::new().for_user("alice").build();

        let claims = validator.validate(&token).await.unwrap();
        assert_eq!(claims.sub(), Some("alice"));
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let validator = validator_for(default_settings());
        let token = TestTokenBuilder::new().with_audience(json!("other")).build();

        let err = validator.validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
        assert_eq!(err.to_string(), "Invalid audience");
    }

    #[tokio::test]
    async fn test_missing_audience_is_failure() {
        // A validly-signed token with a correct issuer but no aud claim at
        // all must fail, not pass unchecked.
        let validator = validator_for(default_settings());
        let token = TestTokenBuilder::new().without_claim("aud").build();

        let err = validator.validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_audience_intersection_accepted() {
        let validator = validator_for(default_settings());
        let token = TestTokenBuilder::new()
            .with_audience(json!(["other", "api"]))
            .build();

        assert!(validator.validate(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_issuer_rejected() {
        let validator = validator_for(default_settings());
        let token = TestTokenBuilder::new()
            .with_issuer("https://evil.example")
            .build();

        let err = validator.validate(&token).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid issuer");
    }

    #[tokio::test]
    async fn test_any_configured_issuer_accepted() {
        let mut settings = default_settings();
        settings.issuer.push("https://second.example".to_string());
        let validator = validator_for(settings);

        let token = TestTokenBuilder::new()
            .with_issuer("https://second.example")
            .build();
        assert!(validator.validate(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let validator = validator_for(default_settings());
        // Past the default decode leeway.
        let token = TestTokenBuilder::new().expires_in(-300).build();

        let err = validator.validate(&token).await.unwrap_err();
        assert_eq!(err.to_string(), "Token expired");
    }

    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let validator = validator_for(default_settings());
        let token = TestTokenBuilder::new().for_user("alice").build();

        // Swap in a forged payload; the signature no longer matches.
        let forged = TestTokenBuilder::new().for_user("mallory").build();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_payload = forged.split('.').nth(1).unwrap();
        parts[1] = forged_payload;
        let tampered = parts.join(".");

        let err = validator.validate(&tampered).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid token signature");
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let validator = validator_for(default_settings());
        let err = validator.validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_amr_string_normalized_to_array() {
        let validator = validator_for(default_settings());
        let token = TestTokenBuilder::new().claim("amr", json!("pwd")).build();

        let claims = validator.validate(&token).await.unwrap();
        assert_eq!(claims.amr(), Some(&json!(["pwd"])));
    }

    #[tokio::test]
    async fn test_amr_array_left_unchanged() {
        let validator = validator_for(default_settings());
        let token = TestTokenBuilder::new().claim("amr", json!(["pwd"])).build();

        let claims = validator.validate(&token).await.unwrap();
        assert_eq!(claims.amr(), Some(&json!(["pwd"])));
    }

    #[test]
    fn test_normalize_amr_idempotent() {
        let mut payload = serde_json::Map::new();
        payload.insert("amr".to_string(), json!("pwd"));
        normalize_amr(&mut payload);
        assert_eq!(payload.get("amr"), Some(&json!(["pwd"])));
        normalize_amr(&mut payload);
        assert_eq!(payload.get("amr"), Some(&json!(["pwd"])));
    }

    #[test]
    fn test_normalize_amr_absent_is_noop() {
        let mut payload = serde_json::Map::new();
        payload.insert("sub".to_string(), json!("alice"));
        normalize_amr(&mut payload);
        assert!(!payload.contains_key("amr"));
    }

    #[test]
    fn test_scopes_split_on_whitespace() {
        let mut payload = serde_json::Map::new();
        payload.insert("scope".to_string(), json!("myapi.read openid profile"));
        let claims = Claims::new(payload);
        assert_eq!(claims.scopes(), vec!["myapi.read", "openid", "profile"]);
    }

    #[test]
    fn test_scopes_empty_without_claim() {
        let claims = Claims::new(serde_json::Map::new());
        assert!(claims.scopes().is_empty());
    }
}
