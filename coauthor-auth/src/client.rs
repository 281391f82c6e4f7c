//! Verify client against the external auth service.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Auth client configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the auth service, without a path
    /// (e.g. `http://localhost:3001`).
    pub base_url: String,
    /// Deadline for one verify round trip.
    pub timeout: Duration,
}

impl AuthConfig {
    /// Create a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_millis(1200),
        }
    }

    /// Override the verify deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Claims returned by a successful verify call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyClaims {
    #[serde(rename = "userId")]
    pub user_id: u64,
    pub username: String,
    /// Token type; empty or `"access"` is accepted.
    #[serde(rename = "type", default)]
    pub token_type: String,
}

impl VerifyClaims {
    /// Whether these claims identify an access token.
    pub fn is_access(&self) -> bool {
        self.token_type.is_empty() || self.token_type == "access"
    }
}

#[derive(Debug, Deserialize)]
struct VerifyErrBody {
    #[serde(default)]
    error: String,
}

/// Client for the auth service's verify endpoint.
pub struct AuthClient {
    http: reqwest::Client,
    verify_url: String,
    timeout: Duration,
}

impl AuthClient {
    /// Build a client for the configured auth service.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AuthError::Upstream(format!("build http client: {e}")))?;
        // single place the path is joined, so callers cannot end up with
        // double slashes or a doubled /verify
        let verify_url = format!("{}/v1/auth/verify", config.base_url.trim_end_matches('/'));
        Ok(Self {
            http,
            verify_url,
            timeout: config.timeout,
        })
    }

    /// Verify a bearer token. Accepts the connection identity only for a
    /// 200 response whose claims carry an access (or untyped) token.
    pub async fn verify(&self, token: &str) -> AuthResult<VerifyClaims> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated(
                "Authorization header is missing or invalid".into(),
            ));
        }

        let resp = self
            .http
            .post(&self.verify_url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("verify request failed: {e}")))?;

        match resp.status().as_u16() {
            200 => {}
            401 => {
                let body: VerifyErrBody = resp.json().await.unwrap_or(VerifyErrBody {
                    error: String::new(),
                });
                let msg = if body.error.is_empty() {
                    "invalid token".to_string()
                } else {
                    body.error
                };
                return Err(AuthError::Unauthenticated(msg));
            }
            status => {
                return Err(AuthError::Upstream(format!("verify returned {status}")));
            }
        }

        let claims: VerifyClaims = resp
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("invalid verify response: {e}")))?;

        if !claims.is_access() {
            return Err(AuthError::Unauthenticated("access token required".into()));
        }

        debug!(user_id = claims.user_id, username = %claims.username, "token verified");
        Ok(claims)
    }
}

/// Extract the token from an `Authorization: Bearer ...` header value.
/// The prefix match is case-insensitive and surrounding whitespace is
/// dropped.
pub fn extract_bearer(header: &str) -> Option<&str> {
    const PREFIX: &str = "Bearer ";
    if header.len() > PREFIX.len() && header[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) {
        let token = header[PREFIX.len()..].trim();
        if !token.is_empty() {
            return Some(token);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("BEARER  abc  "), Some("abc"));
        assert_eq!(extract_bearer("Basic abc"), None);
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer(""), None);
    }

    #[test]
    fn test_claims_accept_empty_and_access_types() {
        let claims: VerifyClaims =
            serde_json::from_str(r#"{"userId":7,"username":"alice","type":"access"}"#).unwrap();
        assert!(claims.is_access());
        assert_eq!(claims.user_id, 7);

        let untyped: VerifyClaims =
            serde_json::from_str(r#"{"userId":7,"username":"alice"}"#).unwrap();
        assert!(untyped.is_access());

        let refresh: VerifyClaims =
            serde_json::from_str(r#"{"userId":7,"username":"alice","type":"refresh"}"#).unwrap();
        assert!(!refresh.is_access());
    }

    #[test]
    fn test_verify_url_join() {
        let client = AuthClient::new(AuthConfig::new("http://localhost:3001/")).unwrap();
        assert_eq!(client.verify_url, "http://localhost:3001/v1/auth/verify");
    }

    #[test]
    fn test_error_codes() {
        use crate::error::AuthError;
        assert_eq!(AuthError::Unauthenticated("x".into()).status(), 401);
        assert_eq!(AuthError::Upstream("x".into()).status(), 502);
        assert_eq!(AuthError::Upstream("x".into()).code(), "AUTH_UPSTREAM_ERROR");
    }
}
