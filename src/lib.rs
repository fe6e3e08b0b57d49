//! tokengate: OIDC bearer-token authentication for HTTP APIs.
//!
//! Validates OpenID-Connect-issued bearer tokens against a provider's
//! published configuration and resolves them to an application user plus a
//! queryable authorization context. Provider metadata (discovery document
//! and signing keys) is fetched once per TTL window and cached.

pub mod auth;
pub mod config;
pub mod server;
pub mod types;

pub use auth::{
    ApiTokenAuthenticator, AuthError, Claims, InMemoryUserStore, User, UserAuthorization,
    UserResolutionError, UserResolver,
};
pub use config::{AuthSettings, load_settings, resolve_settings_path};
pub use server::{AuthenticatedUser, router, serve};
pub use types::{ExternalUserId, IdentityProvider};
