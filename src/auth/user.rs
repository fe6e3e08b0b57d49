//! Local user entities and the pluggable resolver that produces them.
//!
//! User persistence lives outside the authenticator; the [`UserResolver`]
//! trait is its boundary. The bundled [`InMemoryUserStore`] implements
//! get-or-create semantics keyed by the token's `sub` claim, which is enough
//! for single-process deployments and for tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::request::Parts;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::types::{ExternalUserId, IdentityProvider};

/// A locally resolved application user.
#[derive(Debug, Clone)]
pub struct User {
    /// Locally assigned id.
    pub id: Uuid,
    /// Identity asserted by the provider (the `sub` claim).
    pub external_id: ExternalUserId,
    /// Provider that authenticated the user.
    pub provider: IdentityProvider,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Deactivated users fail resolution.
    pub is_active: bool,
}

impl User {
    /// Create an active user with a fresh id.
    pub fn new(
        external_id: ExternalUserId,
        provider: IdentityProvider,
        email: Option<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id,
            provider,
            email,
            display_name,
            is_active: true,
        }
    }
}

/// A value-validation failure from a user resolver.
#[derive(Debug, Clone)]
pub struct UserResolutionError(pub String);

impl UserResolutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for UserResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UserResolutionError {}

/// Maps validated claims (plus the request) to a local user.
///
/// The one externally pluggable policy hook in the pipeline. Implementations
/// are only ever invoked after claim validation has succeeded.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, request: &Parts, claims: &Claims)
    -> Result<User, UserResolutionError>;
}

/// Default resolver: get-or-create users in process memory, keyed by `sub`.
pub struct InMemoryUserStore {
    users: RwLock<HashMap<ExternalUserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Find an existing user by external id, or create one from the claims.
    pub async fn get_or_create_user(&self, claims: &Claims) -> Result<User, UserResolutionError> {
        let sub = claims
            .sub()
            .ok_or_else(|| UserResolutionError::new("Claims did not contain a 'sub' claim"))?;
        let external_id = ExternalUserId::new(sub);

        {
            let users = self.users.read().await;
            if let Some(user) = users.get(&external_id) {
                return Ok(user.clone());
            }
        }

        let mut users = self.users.write().await;
        // Another task may have created the user between the locks.
        if let Some(user) = users.get(&external_id) {
            return Ok(user.clone());
        }

        let user = User::new(
            external_id.clone(),
            IdentityProvider::new("oidc"),
            claims.email().map(str::to_string),
            claims.name().map(str::to_string),
        );
        users.insert(external_id, user.clone());
        Ok(user)
    }

    /// Mark a user inactive; subsequent resolution for them fails.
    pub async fn deactivate_user(&self, external_id: &ExternalUserId) {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(external_id) {
            user.is_active = false;
        }
    }

    /// Number of known users.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserResolver for InMemoryUserStore {
    async fn resolve(
        &self,
        _request: &Parts,
        claims: &Claims,
    ) -> Result<User, UserResolutionError> {
        let user = self.get_or_create_user(claims).await?;
        if !user.is_active {
            return Err(UserResolutionError::new("User account is deactivated"));
        }
        Ok(user)
    }
}

/// Convenience alias for sharing a resolver across the authenticator.
pub type SharedUserResolver = Arc<dyn UserResolver>;
