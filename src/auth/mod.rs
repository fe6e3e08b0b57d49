//! Bearer-token authentication against an OIDC provider.
//!
//! The pipeline, in order:
//!
//! - **header**: extract the credential from the Authorization header
//! - **discovery** / **jwks**: cached provider metadata and signing keys
//! - **claims**: signature and claim validation, `amr` normalization
//! - **user**: map validated claims to a local user (pluggable resolver)
//! - **authz**: scope queries over the validated claims
//! - **authenticator**: the orchestration tying the stages together
//!
//! ## Security model
//!
//! - No credential present is "authentication not attempted", never an error
//! - Any failure after a credential is found is terminal for the attempt
//! - Token contents and validation detail are logged at debug level only;
//!   user-visible messages stay generic

pub mod authenticator;
pub mod authz;
pub mod claims;
pub mod discovery;
mod error;
pub mod header;
pub mod jwks;
pub mod user;

#[cfg(test)]
pub(crate) mod test_keys;

pub use authenticator::ApiTokenAuthenticator;
pub use authz::UserAuthorization;
pub use claims::{Claims, ClaimsValidator};
pub use discovery::{Clock, DocumentFetcher, HttpFetcher, ProviderConfig, ProviderConfigCache, SystemClock};
pub use error::AuthError;
pub use header::{bearer_token, challenge};
pub use jwks::SigningKeyCache;
pub use user::{InMemoryUserStore, SharedUserResolver, User, UserResolutionError, UserResolver};
