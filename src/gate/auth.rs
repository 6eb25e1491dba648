//! Authentication probe seam.
//!
//! The gate does not care how credentials are verified. It only needs an
//! optional subject id for a request, which is what [`AuthProbe`] yields.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use thiserror::Error;

/// Reasons a credential could not be turned into an identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed credential: {0}")]
    Malformed(String),
    #[error("credential not recognized")]
    Unrecognized,
    /// For probes backed by credentials that carry a lifetime, such as
    /// session stores or signed tokens. The bearer table never expires.
    #[error("credential expired")]
    Expired,
}

/// An authenticated subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    /// The subject id used for rate limit keys.
    pub fn subject(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for credential verifiers.
///
/// `Ok(None)` means the request carried no credential at all. Errors are
/// treated by the gate exactly like `Ok(None)`.
#[async_trait]
pub trait AuthProbe: Send + Sync {
    /// Verify the request's credential and extract its subject.
    async fn probe(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthError>;
}

/// Probe that never authenticates anyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthProbe;

#[async_trait]
impl AuthProbe for NoAuthProbe {
    async fn probe(&self, _headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
        Ok(None)
    }
}

/// Verifies `Authorization: Bearer <token>` against a static token table.
#[derive(Clone, Default)]
pub struct BearerTokenProbe {
    tokens: HashMap<String, String>,
}

impl BearerTokenProbe {
    /// Create a probe from a token → subject table.
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// Tokens are credentials; keep them out of debug output.
impl std::fmt::Debug for BearerTokenProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenProbe")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

#[async_trait]
impl AuthProbe for BearerTokenProbe {
    async fn probe(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };

        let value = value
            .to_str()
            .map_err(|_| AuthError::Malformed("authorization header is not ASCII".to_string()))?;

        let (scheme, token) = value
            .split_once(' ')
            .ok_or_else(|| AuthError::Malformed("missing authorization scheme".to_string()))?;

        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::Malformed(format!(
                "unsupported authorization scheme '{}'",
                scheme
            )));
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Malformed("empty bearer token".to_string()));
        }

        self.tokens
            .get(token)
            .map(|subject| Some(Identity::new(subject.clone())))
            .ok_or(AuthError::Unrecognized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn probe() -> BearerTokenProbe {
        BearerTokenProbe::new(HashMap::from([(
            "s3cret".to_string(),
            "alice".to_string(),
        )]))
    }

    fn headers(authorization: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(authorization));
        headers
    }

    #[tokio::test]
    async fn test_valid_token_yields_subject() {
        let identity = probe().probe(&headers("Bearer s3cret")).await.unwrap();
        assert_eq!(identity, Some(Identity::new("alice")));
    }

    #[tokio::test]
    async fn test_scheme_is_case_insensitive() {
        let identity = probe().probe(&headers("bearer s3cret")).await.unwrap();
        assert_eq!(identity.unwrap().subject(), "alice");
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let identity = probe().probe(&HeaderMap::new()).await.unwrap();
        assert_eq!(identity, None);
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let result = probe().probe(&headers("Bearer nope")).await;
        assert_eq!(result, Err(AuthError::Unrecognized));
    }

    #[tokio::test]
    async fn test_malformed_headers() {
        let probe = probe();
        assert!(matches!(
            probe.probe(&headers("Basic czNjcmV0")).await,
            Err(AuthError::Malformed(_))
        ));
        assert!(matches!(
            probe.probe(&headers("s3cret")).await,
            Err(AuthError::Malformed(_))
        ));
        assert!(matches!(
            probe.probe(&headers("Bearer  ")).await,
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn test_debug_hides_tokens() {
        let rendered = format!("{:?}", probe());
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_no_auth_probe() {
        let identity = tokio_test::block_on(NoAuthProbe.probe(&headers("Bearer s3cret")));
        assert_eq!(identity, Ok(None));
    }
}
