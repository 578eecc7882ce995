// ABOUTME: Upstream analytics-platform identity seam: code exchange and user lookup
// ABOUTME: Trait boundary consumed by the OAuth provider; reqwest client implements it
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! The gateway's only contact surface with the upstream identity provider.
//!
//! The OAuth provider consumes exactly three capabilities: building the
//! upstream authorize URL, exchanging an upstream authorization code for a
//! credential pair, and resolving the authenticated user for a credential.
//! Everything else about the platform's REST API lives behind the tool
//! layer and is out of scope here.

use crate::errors::{AppError, AppResult};
use crate::oauth2::models::Tokens;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Identity of the authenticated upstream user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamUser {
    /// Stable upstream user identifier
    pub id: String,
    /// Upstream account name
    pub name: String,
    /// Upstream site/tenant the session is bound to
    pub site: Option<String>,
}

/// Upstream identity provider contract
#[async_trait::async_trait]
pub trait UpstreamIdentity: Send + Sync {
    /// Build the upstream authorize URL carrying our composite `state`
    ///
    /// # Errors
    ///
    /// Returns an error if the configured endpoint is malformed.
    fn authorize_url(&self, state: &str) -> AppResult<String>;

    /// Exchange an upstream authorization code for a credential pair
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream exchange fails.
    async fn exchange_code(&self, code: &str) -> AppResult<Tokens>;

    /// Resolve the authenticated user for an upstream access token
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream lookup fails.
    async fn fetch_user(&self, access_token: &str) -> AppResult<UpstreamUser>;

    /// Host identifier of the upstream server, stored alongside credentials
    fn server(&self) -> &str;

    /// Upstream application client id, recorded with every grant
    fn client_id(&self) -> &str;
}

/// Upstream endpoint and credential configuration
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the upstream platform (e.g. `https://viz.example.com`)
    pub server_url: String,
    /// Authorize endpoint path or absolute URL
    pub auth_url: String,
    /// Token endpoint path or absolute URL
    pub token_url: String,
    /// Current-user endpoint URL
    pub userinfo_url: String,
    /// Our registered client id at the platform
    pub client_id: String,
    /// Our registered client secret at the platform
    pub client_secret: String,
    /// Callback URL the platform redirects back to
    pub redirect_uri: String,
    /// Upstream scopes requested for the credential pair
    pub scopes: Vec<String>,
    /// Request timeout applied to every upstream call
    pub request_timeout: Duration,
}

/// Wire shape of the upstream token endpoint response
#[derive(Debug, Deserialize)]
struct UpstreamTokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

/// Wire shape of the upstream current-user endpoint response
#[derive(Debug, Deserialize)]
struct UpstreamUserResponse {
    id: String,
    name: String,
    #[serde(default)]
    site: Option<String>,
}

/// reqwest-backed implementation of [`UpstreamIdentity`]
pub struct RestUpstreamClient {
    config: UpstreamConfig,
    client: reqwest::Client,
}

impl RestUpstreamClient {
    /// Build a client for the configured upstream platform
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: UpstreamConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl UpstreamIdentity for RestUpstreamClient {
    fn authorize_url(&self, state: &str) -> AppResult<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AppError::config(format!("Invalid upstream auth URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> AppResult<Tokens> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::external_service("upstream token endpoint", e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::external_service(
                "upstream token endpoint",
                format!("status {}", response.status()),
            ));
        }

        let token: UpstreamTokenResponse = response.json().await.map_err(|e| {
            AppError::external_service("upstream token endpoint", e.to_string())
        })?;

        Ok(Tokens {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in_secs: token.expires_in,
        })
    }

    async fn fetch_user(&self, access_token: &str) -> AppResult<UpstreamUser> {
        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::external_service("upstream userinfo", e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::external_service(
                "upstream userinfo",
                format!("status {}", response.status()),
            ));
        }

        let user: UpstreamUserResponse = response
            .json()
            .await
            .map_err(|e| AppError::external_service("upstream userinfo", e.to_string()))?;

        Ok(UpstreamUser {
            id: user.id,
            name: user.name,
            site: user.site,
        })
    }

    fn server(&self) -> &str {
        &self.config.server_url
    }

    fn client_id(&self) -> &str {
        &self.config.client_id
    }
}
