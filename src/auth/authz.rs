//! Authorization context built from validated claims.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::user::User;
use crate::config::AuthSettings;

/// Queryable authorization for an authenticated request.
///
/// Wraps the validated claims and the process settings; read-only after
/// construction and pure, no I/O. The user entity itself stays owned by the
/// user store; only its id is carried here.
#[derive(Debug, Clone)]
pub struct UserAuthorization {
    user_id: Uuid,
    claims: Claims,
    settings: Arc<AuthSettings>,
}

impl UserAuthorization {
    /// Build the authorization context for a resolved user.
    pub fn new(user: &User, claims: Claims, settings: Arc<AuthSettings>) -> Self {
        Self {
            user_id: user.id,
            claims,
            settings,
        }
    }

    /// Id of the user this authorization belongs to.
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// The validated claims backing this authorization.
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Scope values granted by the token.
    pub fn api_scopes(&self) -> Vec<&str> {
        self.claims.scopes()
    }

    /// True iff at least one granted scope starts with `prefix`.
    pub fn has_api_scope_with_prefix(&self, prefix: &str) -> bool {
        self.claims
            .scopes()
            .iter()
            .any(|scope| scope.starts_with(prefix))
    }

    /// The settings this authorization was built against.
    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExternalUserId, IdentityProvider};
    use serde_json::json;

    fn user() -> User {
        User::new(
            ExternalUserId::new("sub123"),
            IdentityProvider::new("oidc"),
            None,
            None,
        )
    }

    fn claims_with_scope(scope: &str) -> Claims {
        let mut payload = serde_json::Map::new();
        payload.insert("scope".to_string(), json!(scope));
        Claims::new(payload)
    }

    fn settings() -> Arc<AuthSettings> {
        Arc::new(AuthSettings::new("https://idp.example", "api"))
    }

    #[test]
    fn test_scope_prefix_match() {
        let auth = UserAuthorization::new(&user(), claims_with_scope("myapi.read openid"), settings());
        assert!(auth.has_api_scope_with_prefix("myapi"));
        assert!(auth.has_api_scope_with_prefix("myapi.read"));
        assert!(!auth.has_api_scope_with_prefix("otherapi"));
    }

    #[test]
    fn test_no_scope_claim_matches_nothing() {
        let auth = UserAuthorization::new(&user(), Claims::new(serde_json::Map::new()), settings());
        assert!(!auth.has_api_scope_with_prefix("myapi"));
        assert!(auth.api_scopes().is_empty());
    }

    #[test]
    fn test_api_scopes_listing() {
        let auth = UserAuthorization::new(&user(), claims_with_scope("a b c"), settings());
        assert_eq!(auth.api_scopes(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_user_id_carried() {
        let u = user();
        let auth = UserAuthorization::new(&u, Claims::new(serde_json::Map::new()), settings());
        assert_eq!(auth.user_id(), u.id);
    }
}
