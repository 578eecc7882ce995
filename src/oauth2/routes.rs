// ABOUTME: HTTP surface of the authorization server: discovery, registration, flow endpoints
// ABOUTME: Thin axum handlers delegating to OAuthProvider; errors render as RFC 6749 JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use super::models::{
    AuthorizeRequest, CallbackParams, ClientRegistrationRequest, ClientRegistrationResponse,
    OAuthError, TokenRequest, TokenResponse,
};
use crate::context::ServerResources;
use crate::scopes::ScopeRegistry;
use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// RFC 8414 authorization server metadata
#[derive(Debug, Serialize)]
pub struct AuthorizationServerMetadata {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    registration_endpoint: String,
    response_types_supported: Vec<&'static str>,
    grant_types_supported: Vec<&'static str>,
    code_challenge_methods_supported: Vec<&'static str>,
    token_endpoint_auth_methods_supported: Vec<&'static str>,
    scopes_supported: Vec<&'static str>,
}

/// RFC 9728 protected resource metadata
#[derive(Debug, Serialize)]
pub struct ProtectedResourceMetadata {
    resource: String,
    authorization_servers: Vec<String>,
    scopes_supported: Vec<&'static str>,
    bearer_methods_supported: Vec<&'static str>,
}

/// Mount every OAuth endpoint on a fresh router
pub fn router() -> Router<Arc<ServerResources>> {
    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        )
        .route("/oauth/register", post(register_client))
        .route("/oauth/authorize", get(authorize))
        .route("/oauth/callback", get(callback))
        .route("/oauth/token", post(token))
}

async fn authorization_server_metadata(
    State(resources): State<Arc<ServerResources>>,
) -> Json<AuthorizationServerMetadata> {
    let issuer = resources.oauth_provider.issuer_url().to_owned();
    Json(AuthorizationServerMetadata {
        authorization_endpoint: format!("{issuer}/oauth/authorize"),
        token_endpoint: format!("{issuer}/oauth/token"),
        registration_endpoint: format!("{issuer}/oauth/register"),
        issuer,
        response_types_supported: vec!["code"],
        grant_types_supported: vec!["authorization_code", "refresh_token"],
        code_challenge_methods_supported: vec!["S256"],
        token_endpoint_auth_methods_supported: vec!["none"],
        scopes_supported: ScopeRegistry::supported_scopes(),
    })
}

async fn protected_resource_metadata(
    State(resources): State<Arc<ServerResources>>,
) -> Json<ProtectedResourceMetadata> {
    let issuer = resources.oauth_provider.issuer_url().to_owned();
    Json(ProtectedResourceMetadata {
        resource: issuer.clone(),
        authorization_servers: vec![issuer],
        scopes_supported: ScopeRegistry::supported_scopes(),
        bearer_methods_supported: vec!["header"],
    })
}

/// Dynamic registration for public clients (RFC 7591 subset). Registration
/// is stateless: the client id is minted and echoed back with the fixed
/// public-client policy, and clients prove possession with PKCE alone.
async fn register_client(
    Json(request): Json<ClientRegistrationRequest>,
) -> Result<(http::StatusCode, Json<ClientRegistrationResponse>), OAuthError> {
    if request.redirect_uris.is_empty() {
        return Err(OAuthError::invalid_request(
            "At least one redirect_uri is required",
        ));
    }
    for uri in &request.redirect_uris {
        super::provider::validate_redirect_uri(uri)?;
    }

    let client_id = format!("vz_client_{}", Uuid::new_v4().simple());
    info!(client_id = %client_id, "Registered public client");

    Ok((
        http::StatusCode::CREATED,
        Json(ClientRegistrationResponse {
            client_id,
            client_id_issued_at: Utc::now().timestamp(),
            redirect_uris: request.redirect_uris,
            grant_types: vec!["authorization_code".to_owned(), "refresh_token".to_owned()],
            response_types: vec!["code".to_owned()],
            token_endpoint_auth_method: "none".to_owned(),
            client_name: request.client_name,
        }),
    ))
}

async fn authorize(
    State(resources): State<Arc<ServerResources>>,
    Query(request): Query<AuthorizeRequest>,
) -> Result<Redirect, OAuthError> {
    let redirect = resources.oauth_provider.authorize(request).await?;
    Ok(Redirect::to(&redirect.location))
}

async fn callback(
    State(resources): State<Arc<ServerResources>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, OAuthError> {
    let redirect = resources.oauth_provider.handle_callback(params).await?;
    Ok(Redirect::to(&redirect.location))
}

async fn token(
    State(resources): State<Arc<ServerResources>>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let response = resources.oauth_provider.token(request).await?;
    Ok(Json(response))
}
