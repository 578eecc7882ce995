// ABOUTME: OAuth 2.1 data models: flow entities, request/response wire types, RFC 6749 errors
// ABOUTME: Every stored entity carries or is stored under an expiration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use crate::upstream::UpstreamUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapped upstream credential pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Upstream access token
    pub access_token: String,
    /// Upstream refresh token
    pub refresh_token: String,
    /// Upstream-reported access token lifetime in seconds
    pub expires_in_secs: u64,
}

/// Flow state parked between the authorize redirect and the upstream
/// callback. Immutable once created; keyed by an opaque server-generated
/// authorization key and deleted on successful callback or expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// Requesting client id
    pub client_id: String,
    /// Client redirect URI, already scheme-validated
    pub redirect_uri: String,
    /// PKCE challenge, set exactly once and never mutated
    pub code_challenge: String,
    /// Challenge method (always `S256`)
    pub code_challenge_method: String,
    /// Client's opaque CSRF state, echoed back unchanged
    pub state: String,
    /// Gateway + upstream scopes the client requested
    pub scope: Vec<String>,
    /// Server-generated anti-CSRF state bound to the upstream leg
    pub upstream_state: String,
    /// Upstream application client id in effect when the flow started
    pub upstream_client_id: String,
}

/// Server-issued authorization code record.
///
/// Single-use: consumed with a delete-on-load at the token endpoint, whether
/// or not the subsequent validation succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Authenticated upstream user
    pub user: UpstreamUser,
    /// Upstream server the credential pair is bound to
    pub upstream_server: String,
    /// Wrapped upstream credential pair
    pub tokens: Tokens,
    /// Client the code was issued to
    pub client_id: String,
    /// Redirect URI the code was issued for
    pub redirect_uri: String,
    /// PKCE challenge carried over from the pending authorization
    pub code_challenge: String,
    /// Absolute expiry, re-checked at redemption
    pub expires_at: DateTime<Utc>,
    /// Upstream application client id
    pub upstream_client_id: String,
    /// Scopes granted to this code
    pub scope: Vec<String>,
}

/// Refresh token record. Reusable (not rotated) in the minimal design; the
/// stored shape supports rotation of the upstream credential if that
/// hardening is enabled later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenData {
    /// Authenticated upstream user
    pub user: UpstreamUser,
    /// Upstream server the credential pair is bound to
    pub upstream_server: String,
    /// Wrapped upstream credential pair
    pub tokens: Tokens,
    /// Client the refresh token was issued to
    pub client_id: String,
    /// Absolute expiry, re-checked at redemption
    pub expires_at: DateTime<Utc>,
    /// Upstream application client id
    pub upstream_client_id: String,
    /// Scopes granted with the original authorization
    pub scope: Vec<String>,
}

/// Claims sealed inside the authenticated-encrypted access token envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer (this gateway's external URL)
    pub iss: String,
    /// Audience (this gateway's resource identifier)
    pub aud: String,
    /// Subject: upstream user id
    pub sub: String,
    /// Issued-at, Unix seconds
    pub iat: i64,
    /// Expiry, Unix seconds
    pub exp: i64,
    /// Granted scopes across both namespaces
    pub scope: Vec<String>,
    /// Authenticated upstream user
    pub user: UpstreamUser,
    /// Upstream server the wrapped credential is bound to
    pub upstream_server: String,
    /// Upstream application client id
    pub upstream_client_id: String,
    /// Wrapped upstream credential pair
    pub tokens: Tokens,
}

/// Authorization endpoint query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Response type (must be `code`)
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response
    pub redirect_uri: String,
    /// PKCE code challenge
    pub code_challenge: String,
    /// PKCE challenge method (must be `S256`)
    pub code_challenge_method: Option<String>,
    /// Client CSRF state
    pub state: Option<String>,
    /// Requested scopes, space-delimited
    pub scope: Option<String>,
}

/// Upstream callback query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackParams {
    /// Upstream authorization code
    pub code: Option<String>,
    /// Composite state: `authorization_key:upstream_state`
    pub state: Option<String>,
    /// Upstream error code, if the upstream leg failed
    pub error: Option<String>,
    /// Upstream error description
    pub error_description: Option<String>,
}

/// Token endpoint form body, covering both supported grants
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// Grant type (`authorization_code` or `refresh_token`)
    pub grant_type: String,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI (authorization_code grant, must match issuance)
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (authorization_code grant)
    pub code_verifier: Option<String>,
    /// Client identifier
    pub client_id: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
}

/// Token endpoint success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Encrypted opaque access token
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Opaque refresh token identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes, space-delimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Client registration request (RFC 7591 subset for public clients)
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs for the authorization code flow
    pub redirect_uris: Vec<String>,
    /// Optional client name for display
    pub client_name: Option<String>,
}

/// Client registration response: a fixed public-client registration
#[derive(Debug, Clone, Serialize)]
pub struct ClientRegistrationResponse {
    /// Assigned client identifier
    pub client_id: String,
    /// Issuance timestamp, Unix seconds
    pub client_id_issued_at: i64,
    /// Registered redirect URIs
    pub redirect_uris: Vec<String>,
    /// Allowed grant types
    pub grant_types: Vec<String>,
    /// Allowed response types
    pub response_types: Vec<String>,
    /// Public clients authenticate with PKCE only
    pub token_endpoint_auth_method: String,
    /// Client name, echoed back when supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

/// OAuth 2.0 error response per RFC 6749 §5.2
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthError {
    /// Error code from the RFC 6749 vocabulary
    pub error: String,
    /// Human-readable error description (never secret material)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthError {
    fn new(error: &str, description: impl Into<String>) -> Self {
        Self {
            error: error.to_owned(),
            error_description: Some(description.into()),
        }
    }

    /// Malformed or missing request parameters
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self::new("invalid_request", description)
    }

    /// Unknown client
    #[must_use]
    pub fn invalid_client() -> Self {
        Self::new("invalid_client", "Client authentication failed")
    }

    /// Expired, absent, already-used code; PKCE mismatch; expired refresh token
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self::new("invalid_grant", description)
    }

    /// Bearer token failed verification. Deliberately undifferentiated so the
    /// caller learns nothing about why.
    #[must_use]
    pub fn invalid_token() -> Self {
        Self::new("invalid_token", "The access token is invalid or expired")
    }

    /// Authenticated but under-privileged
    #[must_use]
    pub fn insufficient_scope(missing: &[String]) -> Self {
        Self::new(
            "insufficient_scope",
            format!("Missing required scopes: {}", missing.join(" ")),
        )
    }

    /// Grant type outside `authorization_code` / `refresh_token`
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self::new(
            "unsupported_grant_type",
            "Only authorization_code and refresh_token grants are supported",
        )
    }

    /// Response type other than `code`
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self::new(
            "unsupported_response_type",
            "Only the 'code' response_type is supported",
        )
    }

    /// Upstream identity-provider or persistent-store failure
    #[must_use]
    pub fn server_error() -> Self {
        Self::new("server_error", "The authorization server encountered an internal error")
    }

    /// HTTP status this error maps to
    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        match self.error.as_str() {
            "invalid_token" => http::StatusCode::UNAUTHORIZED,
            "insufficient_scope" => http::StatusCode::FORBIDDEN,
            "server_error" => http::StatusCode::INTERNAL_SERVER_ERROR,
            "invalid_client" => http::StatusCode::UNAUTHORIZED,
            _ => http::StatusCode::BAD_REQUEST,
        }
    }
}

impl axum::response::IntoResponse for OAuthError {
    fn into_response(self) -> axum::response::Response {
        (self.http_status(), axum::Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_follow_rfc_vocabulary() {
        assert_eq!(OAuthError::invalid_token().http_status(), 401);
        assert_eq!(
            OAuthError::insufficient_scope(&["workbooks:read".into()]).http_status(),
            403
        );
        assert_eq!(OAuthError::server_error().http_status(), 500);
        assert_eq!(OAuthError::invalid_grant("used").http_status(), 400);
    }

    #[test]
    fn insufficient_scope_lists_missing_scopes() {
        let err = OAuthError::insufficient_scope(&["a:b".into(), "c:d".into()]);
        assert_eq!(
            err.error_description.as_deref(),
            Some("Missing required scopes: a:b c:d")
        );
    }
}
