use thiserror::Error;
use tracing::{info, warn};

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing bearer token")]
    Unauthorized,

    #[error("Invalid bearer token")]
    Forbidden,
}

/// Proof that a request presented the configured bearer token. Only
/// [`Authorizer::authorize`] can create one.
#[derive(Debug)]
pub struct Authorized(());

/// Checks `Authorization: Bearer <token>` against a shared secret.
#[derive(Clone)]
pub struct Authorizer {
    secret: String,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer").finish_non_exhaustive()
    }
}

impl Authorizer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn authorize(&self, header: Option<&str>) -> Result<Authorized, AuthError> {
        let Some(header) = header else {
            warn!("auth: missing Authorization header");
            return Err(AuthError::Unauthorized);
        };

        let Some(token) = header.strip_prefix(BEARER_PREFIX) else {
            warn!("auth: Authorization header not Bearer scheme");
            return Err(AuthError::Unauthorized);
        };

        let token = token.trim();
        if token.is_empty() {
            warn!("auth: bearer token empty");
            return Err(AuthError::Unauthorized);
        }

        if token != self.secret {
            warn!("auth: invalid bearer token");
            return Err(AuthError::Forbidden);
        }

        info!("auth: ok");
        Ok(Authorized(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorizer() -> Authorizer {
        Authorizer::new("s3cret")
    }

    #[test]
    fn test_valid_token() {
        assert!(authorizer().authorize(Some("Bearer s3cret")).is_ok());
        // surrounding whitespace in the token is ignored
        assert!(authorizer().authorize(Some("Bearer   s3cret  ")).is_ok());
    }

    #[test]
    fn test_malformed_headers_are_unauthorized() {
        for header in [None, Some(""), Some("Bearer "), Some("Bearer    "), Some("Basic s3cret"), Some("bearer s3cret"), Some("Bearers3cret"), Some("s3cret")] {
            assert_eq!(
                authorizer().authorize(header).unwrap_err(),
                AuthError::Unauthorized,
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn test_wrong_tokens_are_forbidden() {
        for token in ["wrong", "s3cre", "s3cret!", "S3CRET", "Bearer s3cret"] {
            let header = format!("Bearer {}", token);
            assert_eq!(
                authorizer().authorize(Some(&header)).unwrap_err(),
                AuthError::Forbidden,
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn test_debug_hides_secret() {
        assert!(!format!("{:?}", authorizer()).contains("s3cret"));
    }
}
