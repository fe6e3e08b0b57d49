//! The token-to-identity pipeline.

use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::request::Parts;
use tracing::debug;

use crate::auth::authz::UserAuthorization;
use crate::auth::claims::ClaimsValidator;
use crate::auth::discovery::{
    Clock, DocumentFetcher, HttpFetcher, ProviderConfigCache, SystemClock,
};
use crate::auth::error::AuthError;
use crate::auth::header::{bearer_token, challenge};
use crate::auth::jwks::SigningKeyCache;
use crate::auth::user::{InMemoryUserStore, SharedUserResolver, User};
use crate::config::AuthSettings;

/// Authenticates bearer-token requests against a configured OIDC provider.
///
/// The pipeline is strictly linear: extract credential, validate claims
/// against the cached provider configuration, resolve a local user, build
/// the authorization context, then apply the optional API scope gate. Every
/// exit is `Ok(None)` (no credential), a `(user, authorization)` pair, or a
/// terminal [`AuthError`].
pub struct ApiTokenAuthenticator {
    settings: Arc<AuthSettings>,
    validator: ClaimsValidator,
    resolver: SharedUserResolver,
}

impl ApiTokenAuthenticator {
    /// Create an authenticator with the production HTTP fetcher, system
    /// clock, and in-memory user store.
    pub fn new(settings: AuthSettings) -> Self {
        let fetch_timeout = settings.fetch_timeout();
        Self::with_components(
            Arc::new(settings),
            Arc::new(InMemoryUserStore::new()),
            Arc::new(SystemClock),
            Arc::new(HttpFetcher::new(fetch_timeout)),
        )
    }

    /// Create an authenticator with injected collaborators.
    ///
    /// The resolver is the pluggable identity-mapping hook; clock and
    /// fetcher injection exists for deterministic tests.
    pub fn with_components(
        settings: Arc<AuthSettings>,
        resolver: SharedUserResolver,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn DocumentFetcher>,
    ) -> Self {
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
        let validator = ClaimsValidator::new(settings.clone(), keys);
        Self {
            settings,
            validator,
            resolver,
        }
    }

    /// Replace the user resolver.
    pub fn with_resolver(mut self, resolver: SharedUserResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// The settings this authenticator was built with.
    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Authenticate a request.
    ///
    /// Returns `Ok(None)` when no matching credential is present so other
    /// authentication mechanisms may run. Any failure past that point is
    /// terminal for the attempt; there is no fallback to anonymous.
    pub async fn authenticate(
        &self,
        request: &Parts,
    ) -> Result<Option<(User, UserAuthorization)>, AuthError> {
        let header = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let Some(credential) = bearer_token(header, &self.settings.auth_scheme)? else {
            return Ok(None);
        };

        let claims = self.validator.validate(credential).await?;

        let user = self
            .resolver
            .resolve(request, &claims)
            .await
            .map_err(|e| AuthError::UserResolution(e.to_string()))?;

        let authorization = UserAuthorization::new(&user, claims, self.settings.clone());

        if self.settings.require_api_scope_for_authentication {
            let prefix = &self.settings.api_scope_prefix;
            if !authorization.has_api_scope_with_prefix(prefix) {
                return Err(AuthError::ScopeDenied(prefix.clone()));
            }
        }

        debug!("Authenticated user {}", user.external_id);

        Ok(Some((user, authorization)))
    }

    /// The WWW-Authenticate challenge value for 401 responses.
    pub fn authenticate_header(&self) -> String {
        challenge(&self.settings.auth_scheme, &self.settings.realm)
    }
}
