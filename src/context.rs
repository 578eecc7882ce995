// ABOUTME: Shared server resources wired once at startup and passed as axum state
// ABOUTME: Assembles stores, the OAuth provider, and the session manager from configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use crate::config::ServerConfig;
use crate::constants::key_prefixes;
use crate::crypto::SecretCipher;
use crate::errors::AppResult;
use crate::mcp::ToolDispatcher;
use crate::oauth2::provider::{OAuthProvider, OAuthProviderConfig};
use crate::session::SessionManager;
use crate::store::factory::StoreFactory;
use crate::store::typed::TypedStore;
use crate::upstream::UpstreamIdentity;
use std::sync::Arc;

/// Everything a request handler needs, constructed once and shared
pub struct ServerResources {
    /// Loaded gateway configuration
    pub config: ServerConfig,
    /// OAuth 2.1 authorization server
    pub oauth_provider: Arc<OAuthProvider>,
    /// Protocol session lifecycle
    pub session_manager: Arc<SessionManager>,
    /// Tool execution seam for `tools/call`
    pub tool_dispatcher: Arc<dyn ToolDispatcher>,
}

impl ServerResources {
    /// Wire up stores and services from configuration.
    ///
    /// Store backends are connected and health-checked here; a failing
    /// backend aborts startup before the listener binds.
    ///
    /// # Errors
    ///
    /// Returns an error when a store backend cannot be built or verified.
    pub async fn assemble(
        config: ServerConfig,
        token_cipher: SecretCipher,
        upstream: Arc<dyn UpstreamIdentity>,
        tool_dispatcher: Arc<dyn ToolDispatcher>,
        factory: &StoreFactory,
    ) -> AppResult<Self> {
        let oauth_backend = factory.create(&config.oauth_store).await?;
        let session_backend = factory.create(&config.session_store).await?;

        let provider_config = OAuthProviderConfig {
            issuer_url: config.external_url.clone(),
            audience: config.external_url.clone(),
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
            authorization_code_ttl: config.authorization_code_ttl,
        };

        let oauth_provider = Arc::new(OAuthProvider::new(
            provider_config,
            token_cipher,
            upstream,
            TypedStore::new(
                Arc::clone(&oauth_backend),
                key_prefixes::PENDING_AUTHORIZATION,
                config.pending_authorization_ttl,
            ),
            TypedStore::new(
                Arc::clone(&oauth_backend),
                key_prefixes::AUTHORIZATION_CODE,
                config.authorization_code_ttl,
            ),
            TypedStore::new(
                oauth_backend,
                key_prefixes::REFRESH_TOKEN,
                config.refresh_token_ttl,
            ),
        ));

        let session_manager = Arc::new(SessionManager::new(session_backend));

        Ok(Self {
            config,
            oauth_provider,
            session_manager,
            tool_dispatcher,
        })
    }
}
