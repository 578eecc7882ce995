// ABOUTME: PKCE authorization-code flow orchestration and encrypted token issuance
// ABOUTME: authorize -> upstream callback -> single-use code exchange -> refresh grants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! The authorization-server state machine.
//!
//! A flow moves through: pending authorization stored (authorize endpoint) →
//! upstream callback validated against the stored anti-CSRF state → server
//! authorization code minted, pending record deleted → code redeemed at the
//! token endpoint (PKCE verified, code consumed single-use) → zero or more
//! refresh grants → expiry. Access tokens are AES-256-GCM envelopes opaque
//! to the client; verification failures collapse to one `invalid_token`
//! outcome so callers learn nothing about why.

use super::models::{
    AccessTokenClaims, AuthorizationCode, AuthorizeRequest, CallbackParams, OAuthError,
    PendingAuthorization, RefreshTokenData, TokenRequest, TokenResponse, Tokens,
};
use crate::constants::key_prefixes;
use crate::crypto::{random_token, SecretCipher};
use crate::errors::AppError;
use crate::scopes::ScopeRegistry;
use crate::store::typed::TypedStore;
use crate::upstream::UpstreamIdentity;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use url::Url;

/// Typed façade over pending authorization records
pub type PendingAuthorizationStore = TypedStore<PendingAuthorization>;
/// Typed façade over server-issued authorization codes
pub type AuthorizationCodeStore = TypedStore<AuthorizationCode>;
/// Typed façade over refresh token records
pub type RefreshTokenStore = TypedStore<RefreshTokenData>;

/// Provider-level configuration, TTLs already clamped by the config layer
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    /// External issuer URL (this gateway, as clients reach it)
    pub issuer_url: String,
    /// Audience claim stamped into and required from every access token
    pub audience: String,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Authorization code lifetime
    pub authorization_code_ttl: Duration,
}

/// Successful authorize call: where to send the user agent
#[derive(Debug, Clone)]
pub struct AuthorizeRedirect {
    /// Upstream identity-provider authorize URL
    pub location: String,
}

/// Successful callback: where to send the user agent
#[derive(Debug, Clone)]
pub struct CallbackRedirect {
    /// Original client redirect URI with `code` and `state` appended
    pub location: String,
}

/// OAuth 2.1 authorization server
pub struct OAuthProvider {
    config: OAuthProviderConfig,
    cipher: SecretCipher,
    upstream: Arc<dyn UpstreamIdentity>,
    pending: PendingAuthorizationStore,
    codes: AuthorizationCodeStore,
    refresh_tokens: RefreshTokenStore,
}

impl OAuthProvider {
    /// Assemble the provider from its long-lived collaborators
    #[must_use]
    pub fn new(
        config: OAuthProviderConfig,
        cipher: SecretCipher,
        upstream: Arc<dyn UpstreamIdentity>,
        pending: PendingAuthorizationStore,
        codes: AuthorizationCodeStore,
        refresh_tokens: RefreshTokenStore,
    ) -> Self {
        Self {
            config,
            cipher,
            upstream,
            pending,
            codes,
            refresh_tokens,
        }
    }

    /// Handle the authorize endpoint: park the PKCE challenge and redirect
    /// the user agent to the upstream identity provider.
    ///
    /// # Errors
    ///
    /// Returns an RFC 6749 error for invalid parameters or a store failure.
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<AuthorizeRedirect, OAuthError> {
        if request.response_type != "code" {
            return Err(OAuthError::unsupported_response_type());
        }

        let method = request.code_challenge_method.as_deref().unwrap_or("S256");
        if method != "S256" {
            return Err(OAuthError::invalid_request(
                "code_challenge_method must be 'S256'",
            ));
        }

        // RFC 7636 §4.2: base64url of a SHA-256 digest is 43 characters
        if request.code_challenge.len() < 43 || request.code_challenge.len() > 128 {
            return Err(OAuthError::invalid_request(
                "code_challenge must be between 43 and 128 characters",
            ));
        }

        validate_redirect_uri(&request.redirect_uri)?;

        let scope = match request.scope.as_deref() {
            Some(raw) => {
                let parsed = ScopeRegistry::parse(raw);
                ScopeRegistry::validate(&parsed).map_err(|unknown| {
                    OAuthError::invalid_request(&format!(
                        "Unknown scopes requested: {}",
                        unknown.join(" ")
                    ))
                })?;
                parsed
            }
            // No scope requested: grant the full supported set
            None => ScopeRegistry::supported_scopes()
                .into_iter()
                .map(str::to_owned)
                .collect(),
        };

        let authorization_key = random_token(32).map_err(|_| OAuthError::server_error())?;
        let upstream_state = random_token(16).map_err(|_| OAuthError::server_error())?;

        let pending = PendingAuthorization {
            client_id: request.client_id.clone(),
            redirect_uri: request.redirect_uri,
            code_challenge: request.code_challenge,
            code_challenge_method: method.to_owned(),
            state: request.state.unwrap_or_default(),
            scope,
            upstream_state: upstream_state.clone(),
            upstream_client_id: self.upstream.client_id().to_owned(),
        };

        self.pending
            .set(&authorization_key, &pending)
            .await
            .map_err(log_store_error)?;

        // The composite state lets the callback recover our record and
        // validate the upstream leg against fixation in one parameter.
        let composite_state = format!("{authorization_key}:{upstream_state}");
        let location = self
            .upstream
            .authorize_url(&composite_state)
            .map_err(log_store_error)?;

        info!(client_id = %pending.client_id, "Authorization flow initiated");
        Ok(AuthorizeRedirect { location })
    }

    /// Handle the upstream identity-provider callback: validate state,
    /// exchange the upstream code, mint a server authorization code, and
    /// redirect back to the original client.
    ///
    /// # Errors
    ///
    /// Returns an RFC 6749 error when the flow state is absent or
    /// mismatched, or when the upstream exchange fails.
    pub async fn handle_callback(
        &self,
        params: CallbackParams,
    ) -> Result<CallbackRedirect, OAuthError> {
        let state = params
            .state
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("Missing state parameter"))?;

        let (authorization_key, returned_upstream_state) = state
            .split_once(':')
            .ok_or_else(|| OAuthError::invalid_request("Malformed state parameter"))?;

        let pending = self
            .pending
            .get(authorization_key)
            .await
            .map_err(log_store_error)?
            .ok_or_else(|| {
                warn!("Callback for unknown or expired authorization request");
                OAuthError::invalid_grant("Unknown or expired authorization request")
            })?;

        // Constant-time comparison; a mismatch means fixation or replay.
        if !bool::from(
            returned_upstream_state
                .as_bytes()
                .ct_eq(pending.upstream_state.as_bytes()),
        ) {
            warn!(client_id = %pending.client_id, "Upstream state mismatch on callback");
            return Err(OAuthError::invalid_grant("State mismatch"));
        }

        if let Some(error) = params.error.as_deref() {
            // The upstream leg failed; clean up the parked flow.
            let _ = self.pending.delete(authorization_key).await;
            warn!(
                upstream_error = %error,
                description = params.error_description.as_deref().unwrap_or(""),
                "Upstream identity provider returned an error"
            );
            return Err(OAuthError::server_error());
        }

        let upstream_code = params
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("Missing code parameter"))?;

        let tokens = self
            .upstream
            .exchange_code(upstream_code)
            .await
            .map_err(|e| {
                warn!("Upstream code exchange failed: {e}");
                OAuthError::server_error()
            })?;

        let user = self
            .upstream
            .fetch_user(&tokens.access_token)
            .await
            .map_err(|e| {
                warn!("Upstream identity lookup failed: {e}");
                OAuthError::server_error()
            })?;

        let code = random_token(32).map_err(|_| OAuthError::server_error())?;
        let code_ttl = self.config.authorization_code_ttl;
        let record = AuthorizationCode {
            user,
            upstream_server: self.upstream.server().to_owned(),
            tokens,
            client_id: pending.client_id.clone(),
            redirect_uri: pending.redirect_uri.clone(),
            code_challenge: pending.code_challenge.clone(),
            expires_at: Utc::now()
                + ChronoDuration::seconds(i64::try_from(code_ttl.as_secs()).unwrap_or(600)),
            upstream_client_id: pending.upstream_client_id.clone(),
            scope: pending.scope.clone(),
        };

        self.codes
            .set_with_ttl(&code, &record, code_ttl)
            .await
            .map_err(log_store_error)?;

        self.pending
            .delete(authorization_key)
            .await
            .map_err(log_store_error)?;

        let mut location = Url::parse(&pending.redirect_uri)
            .map_err(|_| OAuthError::invalid_request("Invalid redirect_uri"))?;
        location
            .query_pairs_mut()
            .append_pair("code", &code)
            .append_pair("state", &pending.state);

        info!(client_id = %pending.client_id, "Authorization code issued");
        Ok(CallbackRedirect {
            location: location.to_string(),
        })
    }

    /// Handle the token endpoint for both supported grants.
    ///
    /// # Errors
    ///
    /// Returns an RFC 6749 error for invalid grants or store failures.
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        match request.grant_type.as_str() {
            "authorization_code" => self.handle_authorization_code_grant(request).await,
            "refresh_token" => self.handle_refresh_token_grant(request).await,
            _ => Err(OAuthError::unsupported_grant_type()),
        }
    }

    async fn handle_authorization_code_grant(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("Missing authorization code"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("Missing redirect_uri"))?;
        let verifier = request
            .code_verifier
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("Missing code_verifier"))?;

        // Single-use serialization point: the delete inside take() decides
        // concurrent redemptions before any validation or response.
        let record = self
            .codes
            .take(code)
            .await
            .map_err(log_store_error)?
            .ok_or_else(|| {
                warn!("Authorization code absent, expired, or already redeemed");
                OAuthError::invalid_grant("Invalid or expired authorization code")
            })?;

        if Utc::now() > record.expires_at {
            return Err(OAuthError::invalid_grant("Authorization code expired"));
        }

        if record.redirect_uri != redirect_uri {
            return Err(OAuthError::invalid_grant("redirect_uri mismatch"));
        }

        if let Some(client_id) = request.client_id.as_deref() {
            if record.client_id != client_id {
                return Err(OAuthError::invalid_grant(
                    "Code was issued to a different client",
                ));
            }
        }

        verify_pkce(verifier, &record.code_challenge)?;

        let (access_token, expires_in) = self.mint_access_token(
            &record.user,
            &record.upstream_server,
            &record.upstream_client_id,
            &record.tokens,
            &record.scope,
        )?;

        let refresh_token_id = format!(
            "{}{}",
            key_prefixes::REFRESH_TOKEN_ID,
            random_token(32).map_err(|_| OAuthError::server_error())?
        );
        let refresh_record = RefreshTokenData {
            user: record.user,
            upstream_server: record.upstream_server,
            tokens: record.tokens,
            client_id: record.client_id.clone(),
            expires_at: Utc::now()
                + ChronoDuration::seconds(
                    i64::try_from(self.config.refresh_token_ttl.as_secs()).unwrap_or(0),
                ),
            upstream_client_id: record.upstream_client_id,
            scope: record.scope.clone(),
        };

        self.refresh_tokens
            .set_with_ttl(
                &refresh_token_id,
                &refresh_record,
                self.config.refresh_token_ttl,
            )
            .await
            .map_err(log_store_error)?;

        info!(client_id = %record.client_id, "Authorization code redeemed");
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in,
            refresh_token: Some(refresh_token_id),
            scope: Some(ScopeRegistry::format(&record.scope)),
        })
    }

    async fn handle_refresh_token_grant(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("Missing refresh_token"))?;

        // Reusable refresh tokens: redemption is non-destructive, so two
        // racing refreshes both succeed with independently minted tokens.
        let record = self
            .refresh_tokens
            .get(refresh_token)
            .await
            .map_err(log_store_error)?
            .ok_or_else(|| OAuthError::invalid_grant("Invalid or expired refresh token"))?;

        if Utc::now() > record.expires_at {
            return Err(OAuthError::invalid_grant("Refresh token expired"));
        }

        let (access_token, expires_in) = self.mint_access_token(
            &record.user,
            &record.upstream_server,
            &record.upstream_client_id,
            &record.tokens,
            &record.scope,
        )?;

        info!(client_id = %record.client_id, "Access token refreshed");
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in,
            refresh_token: Some(refresh_token.to_owned()),
            scope: Some(ScopeRegistry::format(&record.scope)),
        })
    }

    /// Seal claims into an encrypted access token; the returned lifetime is
    /// the configured TTL capped by the upstream credential's own expiry.
    fn mint_access_token(
        &self,
        user: &crate::upstream::UpstreamUser,
        upstream_server: &str,
        upstream_client_id: &str,
        tokens: &Tokens,
        scope: &[String],
    ) -> Result<(String, u64), OAuthError> {
        let expires_in = self
            .config
            .access_token_ttl
            .as_secs()
            .min(tokens.expires_in_secs.max(1));
        let now = Utc::now().timestamp();

        let claims = AccessTokenClaims {
            iss: self.config.issuer_url.clone(),
            aud: self.config.audience.clone(),
            sub: user.id.clone(),
            iat: now,
            exp: now + i64::try_from(expires_in).unwrap_or(0),
            scope: scope.to_vec(),
            user: user.clone(),
            upstream_server: upstream_server.to_owned(),
            upstream_client_id: upstream_client_id.to_owned(),
            tokens: tokens.clone(),
        };

        let plaintext = serde_json::to_vec(&claims).map_err(|e| {
            warn!("Access token serialization failed: {e}");
            OAuthError::server_error()
        })?;
        let access_token = self
            .cipher
            .encrypt_to_string(&plaintext)
            .map_err(log_store_error)?;

        Ok((access_token, expires_in))
    }

    /// Authenticate a bearer token presented to the resource server.
    ///
    /// # Errors
    ///
    /// Every failure mode (decryption, issuer, audience, expiry) collapses
    /// to `invalid_token`.
    pub fn verify_token(&self, token: &str) -> Result<AccessTokenClaims, OAuthError> {
        let plaintext = self
            .cipher
            .decrypt_from_string(token)
            .ok_or_else(OAuthError::invalid_token)?;

        let claims: AccessTokenClaims =
            serde_json::from_slice(&plaintext).map_err(|_| OAuthError::invalid_token())?;

        if claims.iss != self.config.issuer_url
            || claims.aud != self.config.audience
            || claims.exp <= Utc::now().timestamp()
        {
            return Err(OAuthError::invalid_token());
        }

        Ok(claims)
    }

    /// Issuer URL, used by the discovery documents
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.config.issuer_url
    }
}

/// Compute the PKCE S256 challenge for a verifier
#[must_use]
pub fn pkce_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Verify a code verifier against a stored challenge per RFC 7636
fn verify_pkce(verifier: &str, stored_challenge: &str) -> Result<(), OAuthError> {
    if verifier.len() < 43 || verifier.len() > 128 {
        return Err(OAuthError::invalid_grant(
            "code_verifier must be between 43 and 128 characters",
        ));
    }

    // Only unreserved characters are permitted: ALPHA / DIGIT / - . _ ~
    if !verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return Err(OAuthError::invalid_grant(
            "code_verifier contains invalid characters",
        ));
    }

    let computed = pkce_challenge(verifier);
    if bool::from(computed.as_bytes().ct_eq(stored_challenge.as_bytes())) {
        Ok(())
    } else {
        warn!("PKCE verification failed: verifier does not match challenge");
        Err(OAuthError::invalid_grant("Invalid code_verifier"))
    }
}

/// Reject redirect URIs outside https, loopback http, or a custom scheme
///
/// # Errors
///
/// Returns `invalid_request` for unparseable URIs and non-loopback http.
pub fn validate_redirect_uri(redirect_uri: &str) -> Result<(), OAuthError> {
    let url = Url::parse(redirect_uri)
        .map_err(|_| OAuthError::invalid_request("Invalid redirect_uri"))?;

    match url.scheme() {
        "https" => Ok(()),
        "http" => {
            let is_loopback = matches!(
                url.host_str(),
                Some("localhost" | "127.0.0.1" | "[::1]" | "::1")
            );
            if is_loopback {
                Ok(())
            } else {
                Err(OAuthError::invalid_request(
                    "http redirect_uri is only allowed for loopback addresses",
                ))
            }
        }
        // Native apps register a custom scheme (RFC 8252 §7.1)
        _ => Ok(()),
    }
}

fn log_store_error(error: AppError) -> OAuthError {
    warn!("Store operation failed during OAuth flow: {error}");
    OAuthError::server_error()
}
