//! Authentication failure taxonomy.

use std::fmt;

/// Errors terminating an authentication attempt.
///
/// Absence of a credential is not an error; the authenticator returns
/// `Ok(None)` for that case so other mechanisms may run. Every variant here
/// is terminal for the request: there is no fallback to anonymous.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// Authorization header present but structurally invalid.
    MalformedHeader(&'static str),
    /// Signature or claim validation failed. The message is generic; the
    /// underlying cause is logged at debug level only.
    InvalidToken(String),
    /// The OIDC discovery document or JWKS could not be fetched or parsed.
    ConfigFetch(String),
    /// The user resolver rejected the validated claims.
    UserResolution(String),
    /// Claims validated and user resolved, but the required API scope
    /// prefix is absent.
    ScopeDenied(String),
}

impl AuthError {
    /// Message for a scheme-only Authorization header.
    pub const NO_CREDENTIALS: &'static str =
        "Invalid Authorization header. No credentials provided";

    /// Message for a credential containing embedded whitespace.
    pub const SPACES_IN_CREDENTIALS: &'static str =
        "Invalid Authorization header. Credentials string should not contain spaces.";
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHeader(msg) => write!(f, "{}", msg),
            Self::InvalidToken(msg) => write!(f, "{}", msg),
            Self::ConfigFetch(msg) => write!(f, "Failed to fetch OIDC configuration: {}", msg),
            Self::UserResolution(msg) => write!(f, "{}", msg),
            Self::ScopeDenied(prefix) => {
                write!(f, "Not authorized for API scope \"{}\"", prefix)
            }
        }
    }
}

impl std::error::Error for AuthError {}
