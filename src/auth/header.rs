//! Authorization header parsing and challenge formatting.

use crate::auth::error::AuthError;
use tracing::debug;

/// Extract the bearer credential from an Authorization header value.
///
/// The header is split on whitespace. A missing or empty header, or one
/// whose scheme does not match `scheme` case-insensitively, yields
/// `Ok(None)` so other authentication mechanisms may run. A matching scheme
/// with no credential or with a credential containing spaces is a
/// [`AuthError::MalformedHeader`].
pub fn bearer_token<'a>(
    header: Option<&'a str>,
    scheme: &str,
) -> Result<Option<&'a str>, AuthError> {
    let Some(header) = header else {
        return Ok(None);
    };

    debug!("Authorization header: {}", header);

    let mut parts = header.split_whitespace();
    let Some(first) = parts.next() else {
        return Ok(None);
    };

    if !first.eq_ignore_ascii_case(scheme) {
        return Ok(None);
    }

    let Some(credential) = parts.next() else {
        return Err(AuthError::MalformedHeader(AuthError::NO_CREDENTIALS));
    };

    if parts.next().is_some() {
        return Err(AuthError::MalformedHeader(AuthError::SPACES_IN_CREDENTIALS));
    }

    Ok(Some(credential))
}

/// Format the WWW-Authenticate challenge value sent with 401 responses.
pub fn challenge(scheme: &str, realm: &str) -> String {
    format!("{} realm=\"{}\"", scheme, realm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_header_is_no_credential() {
        assert!(bearer_token(None, "Bearer").unwrap().is_none());
    }

    #[test]
    fn test_empty_header_is_no_credential() {
        assert!(bearer_token(Some(""), "Bearer").unwrap().is_none());
        assert!(bearer_token(Some("   "), "Bearer").unwrap().is_none());
    }

    #[test]
    fn test_other_scheme_is_no_credential() {
        assert!(bearer_token(Some("Basic dXNlcjpwdw=="), "Bearer")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scheme_match_is_case_insensitive() {
        let token = bearer_token(Some("bearer abc.def.ghi"), "Bearer").unwrap();
        assert_eq!(token, Some("abc.def.ghi"));

        let token = bearer_token(Some("BEARER abc"), "Bearer").unwrap();
        assert_eq!(token, Some("abc"));
    }

    #[test]
    fn test_scheme_only_is_malformed() {
        let err = bearer_token(Some("Bearer"), "Bearer").unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader(_)));
        assert!(err.to_string().contains("No credentials provided"));
    }

    #[test]
    fn test_embedded_spaces_are_malformed() {
        let err = bearer_token(Some("Bearer tok1 tok2"), "Bearer").unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader(_)));
        assert!(err.to_string().contains("should not contain spaces"));
    }

    #[test]
    fn test_custom_scheme() {
        let token = bearer_token(Some("token xyz"), "Token").unwrap();
        assert_eq!(token, Some("xyz"));
        assert!(bearer_token(Some("Bearer xyz"), "Token").unwrap().is_none());
    }

    #[test]
    fn test_challenge_format() {
        assert_eq!(challenge("Bearer", "api"), "Bearer realm=\"api\"");
    }
}
