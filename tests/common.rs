// ABOUTME: Shared test fixtures: fake upstream identity provider and resource builders
// ABOUTME: Drives the full authorize -> callback -> token flow against in-memory stores
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use url::Url;
use vizgate::config::ServerConfig;
use vizgate::constants::key_prefixes;
use vizgate::context::ServerResources;
use vizgate::crypto::SecretCipher;
use vizgate::errors::AppResult;
use vizgate::mcp::ToolDispatcher;
use vizgate::oauth2::models::{
    AccessTokenClaims, AuthorizeRequest, CallbackParams, TokenRequest, TokenResponse, Tokens,
};
use vizgate::oauth2::provider::{pkce_challenge, OAuthProvider, OAuthProviderConfig};
use vizgate::store::factory::{StoreBackendConfig, StoreFactory};
use vizgate::store::memory::MemoryStore;
use vizgate::store::typed::TypedStore;
use vizgate::store::KeyValueStore;
use vizgate::upstream::{UpstreamConfig, UpstreamIdentity, UpstreamUser};

pub const ISSUER: &str = "http://localhost:8080";
pub const CLIENT_ID: &str = "vz_client_test";
pub const REDIRECT_URI: &str = "http://localhost:9400/callback";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

/// In-crate stand-in for the analytics platform's identity endpoints
pub struct FakeUpstream {
    pub user: UpstreamUser,
    pub token_lifetime_secs: u64,
}

impl Default for FakeUpstream {
    fn default() -> Self {
        Self {
            user: UpstreamUser {
                id: "user-42".to_owned(),
                name: "Test Analyst".to_owned(),
                site: Some("default".to_owned()),
            },
            token_lifetime_secs: 7200,
        }
    }
}

#[async_trait::async_trait]
impl UpstreamIdentity for FakeUpstream {
    fn authorize_url(&self, state: &str) -> AppResult<String> {
        let mut url = Url::parse("https://upstream.test/oauth2/v1/auth").unwrap();
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id())
            .append_pair("response_type", "code")
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> AppResult<Tokens> {
        Ok(Tokens {
            access_token: format!("up-access-{code}"),
            refresh_token: format!("up-refresh-{code}"),
            expires_in_secs: self.token_lifetime_secs,
        })
    }

    async fn fetch_user(&self, _access_token: &str) -> AppResult<UpstreamUser> {
        Ok(self.user.clone())
    }

    fn server(&self) -> &str {
        "https://upstream.test"
    }

    fn client_id(&self) -> &str {
        "upstream-app-1"
    }
}

/// Dispatcher that echoes the invocation back, for transport tests
pub struct EchoDispatcher;

#[async_trait::async_trait]
impl ToolDispatcher for EchoDispatcher {
    async fn call(
        &self,
        operation: &str,
        arguments: serde_json::Value,
        claims: &AccessTokenClaims,
    ) -> AppResult<serde_json::Value> {
        Ok(serde_json::json!({
            "operation": operation,
            "arguments": arguments,
            "user": claims.sub,
        }))
    }
}

pub fn memory_backend() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new(1024))
}

pub fn provider_config() -> OAuthProviderConfig {
    OAuthProviderConfig {
        issuer_url: ISSUER.to_owned(),
        audience: ISSUER.to_owned(),
        access_token_ttl: Duration::from_secs(3600),
        refresh_token_ttl: Duration::from_secs(30 * 86_400),
        authorization_code_ttl: Duration::from_secs(600),
    }
}

/// Provider over fresh in-memory stores and the fake upstream
pub fn build_provider(config: OAuthProviderConfig) -> OAuthProvider {
    let backend = memory_backend();
    OAuthProvider::new(
        config.clone(),
        SecretCipher::generate(),
        Arc::new(FakeUpstream::default()),
        TypedStore::new(
            Arc::clone(&backend),
            key_prefixes::PENDING_AUTHORIZATION,
            Duration::from_secs(600),
        ),
        TypedStore::new(
            Arc::clone(&backend),
            key_prefixes::AUTHORIZATION_CODE,
            config.authorization_code_ttl,
        ),
        TypedStore::new(backend, key_prefixes::REFRESH_TOKEN, config.refresh_token_ttl),
    )
}

fn server_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        external_url: ISSUER.to_owned(),
        enforce_scopes: true,
        oauth_store: StoreBackendConfig::Memory { max_entries: 1024 },
        session_store: StoreBackendConfig::Memory { max_entries: 1024 },
        pending_authorization_ttl: Duration::from_secs(600),
        authorization_code_ttl: Duration::from_secs(600),
        access_token_ttl: Duration::from_secs(3600),
        refresh_token_ttl: Duration::from_secs(30 * 86_400),
        upstream: UpstreamConfig {
            server_url: "https://upstream.test".to_owned(),
            auth_url: "https://upstream.test/oauth2/v1/auth".to_owned(),
            token_url: "https://upstream.test/oauth2/v1/token".to_owned(),
            userinfo_url: "https://upstream.test/api/current-user".to_owned(),
            client_id: "upstream-app-1".to_owned(),
            client_secret: "upstream-secret".to_owned(),
            redirect_uri: format!("{ISSUER}/oauth/callback"),
            scopes: vec!["viz:content:read".to_owned()],
            request_timeout: Duration::from_secs(5),
        },
    }
}

/// Fully assembled resources over in-memory stores, for HTTP-level tests
pub async fn build_resources() -> Arc<ServerResources> {
    let resources = ServerResources::assemble(
        server_config(),
        SecretCipher::generate(),
        Arc::new(FakeUpstream::default()),
        Arc::new(EchoDispatcher),
        &StoreFactory::new(),
    )
    .await
    .unwrap();
    Arc::new(resources)
}

pub fn authorize_request(scope: Option<&str>) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".to_owned(),
        client_id: CLIENT_ID.to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        code_challenge: pkce_challenge(VERIFIER),
        code_challenge_method: Some("S256".to_owned()),
        state: Some("client-csrf-token".to_owned()),
        scope: scope.map(str::to_owned),
    }
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Run the full flow against `provider` and return the issued code
pub async fn obtain_code(provider: &OAuthProvider, scope: Option<&str>) -> String {
    let redirect = provider.authorize(authorize_request(scope)).await.unwrap();
    let state = query_param(&redirect.location, "state").unwrap();

    let callback = provider
        .handle_callback(CallbackParams {
            code: Some("upstream-code-1".to_owned()),
            state: Some(state),
            error: None,
            error_description: None,
        })
        .await
        .unwrap();

    query_param(&callback.location, "code").unwrap()
}

pub fn token_request(code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".to_owned(),
        code: Some(code.to_owned()),
        redirect_uri: Some(REDIRECT_URI.to_owned()),
        code_verifier: Some(VERIFIER.to_owned()),
        client_id: Some(CLIENT_ID.to_owned()),
        refresh_token: None,
    }
}

/// Full flow through the token endpoint
pub async fn obtain_tokens(provider: &OAuthProvider, scope: Option<&str>) -> TokenResponse {
    let code = obtain_code(provider, scope).await;
    provider.token(token_request(&code)).await.unwrap()
}
