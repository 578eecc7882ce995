// ABOUTME: HTTP-level tests for bearer authentication and scope enforcement
// ABOUTME: Exercises 401 challenges, 403 scope deficits, SSE error framing, public endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

mod common;

use anyhow::Result;
use axum::body::Body;
use common::{build_resources, obtain_tokens};
use http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use vizgate::server;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn mcp_request(token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn tools_call(tool: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "tools/call",
        "params": { "name": tool, "arguments": {} },
        "id": 1,
    })
}

#[tokio::test]
async fn missing_bearer_gets_a_challenge() -> Result<()> {
    let resources = build_resources().await;
    let app = server::router(resources);

    let response = app
        .oneshot(mcp_request(None, tools_call("list_workbooks")))
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .unwrap()
        .to_str()?;
    assert!(challenge.contains("resource_metadata="));
    assert!(!challenge.contains("error="));
    // The challenge names the scopes the attempted operation needs.
    assert!(challenge.contains("workbooks:read"));
    assert!(challenge.contains("viz:content:read"));
    assert!(!challenge.contains("viz:data:query"));
    // No credentials were presented, so no error body asserts one failed.
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert!(bytes.is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_bearer_is_401_invalid_token() -> Result<()> {
    let resources = build_resources().await;
    let app = server::router(resources);

    let response = app
        .oneshot(mcp_request(Some("bogus"), tools_call("list_workbooks")))
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .unwrap()
        .to_str()?;
    assert!(challenge.contains("error=\"invalid_token\""));
    Ok(())
}

#[tokio::test]
async fn underscoped_token_is_403_with_exact_deficit() -> Result<()> {
    let resources = build_resources().await;
    let issued = obtain_tokens(
        &resources.oauth_provider,
        Some("workbooks:read viz:content:read"),
    )
    .await;
    let app = server::router(resources);

    let response = app
        .oneshot(mcp_request(
            Some(&issued.access_token),
            tools_call("get_view_data"),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "insufficient_scope");
    let description = body["error_description"].as_str().unwrap();
    assert!(description.contains("views:read"));
    assert!(description.contains("viz:views:download"));
    assert!(!description.contains("workbooks:read"));
    Ok(())
}

#[tokio::test]
async fn scoped_token_reaches_the_dispatcher() -> Result<()> {
    let resources = build_resources().await;
    let issued = obtain_tokens(
        &resources.oauth_provider,
        Some("workbooks:read viz:content:read"),
    )
    .await;
    let app = server::router(resources);

    let response = app
        .oneshot(mcp_request(
            Some(&issued.access_token),
            tools_call("list_workbooks"),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"]["content"]["operation"], "list_workbooks");
    assert_eq!(body["result"]["content"]["user"], "user-42");
    Ok(())
}

#[tokio::test]
async fn batch_fails_when_any_call_is_underscoped() -> Result<()> {
    let resources = build_resources().await;
    let issued = obtain_tokens(
        &resources.oauth_provider,
        Some("workbooks:read viz:content:read"),
    )
    .await;
    let app = server::router(resources);

    let batch = json!([tools_call("list_workbooks"), tools_call("query_datasource")]);
    let response = app
        .oneshot(mcp_request(Some(&issued.access_token), batch))
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn initialize_needs_authentication_but_no_scopes() -> Result<()> {
    let resources = build_resources().await;
    // Token granted no gateway scopes at all beyond what was asked.
    let issued = obtain_tokens(&resources.oauth_provider, Some("metadata:read viz:content:read")).await;
    let app = server::router(resources);

    let initialize = json!({
        "jsonrpc": "2.0",
        "method": "initialize",
        "params": { "clientInfo": { "name": "test-client", "version": "1.0.0" } },
        "id": 1,
    });
    let response = app
        .oneshot(mcp_request(Some(&issued.access_token), initialize))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("mcp-session-id"));
    let body = body_json(response).await;
    assert_eq!(body["result"]["serverInfo"]["name"], "vizgate");
    Ok(())
}

#[tokio::test]
async fn sse_clients_get_framed_errors() -> Result<()> {
    let resources = build_resources().await;
    let app = server::router(resources);

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::ACCEPT, "text/event-stream")
        .header(header::AUTHORIZATION, "Bearer bogus")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(tools_call("list_workbooks").to_string()))?;
    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let frame = String::from_utf8(bytes.to_vec())?;
    assert!(frame.starts_with("event: error\ndata: "));
    assert!(frame.contains("invalid_token"));
    Ok(())
}

#[tokio::test]
async fn discovery_and_health_are_public() -> Result<()> {
    let resources = build_resources().await;

    for uri in [
        "/health",
        "/.well-known/oauth-authorization-server",
        "/.well-known/oauth-protected-resource",
    ] {
        let app = server::router(std::sync::Arc::clone(&resources));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
    Ok(())
}

#[tokio::test]
async fn authorization_server_metadata_is_complete() -> Result<()> {
    let resources = build_resources().await;
    let app = server::router(resources);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/.well-known/oauth-authorization-server")
                .body(Body::empty())?,
        )
        .await?;
    let body = body_json(response).await;

    assert_eq!(body["issuer"], common::ISSUER);
    assert_eq!(body["code_challenge_methods_supported"], json!(["S256"]));
    assert_eq!(
        body["grant_types_supported"],
        json!(["authorization_code", "refresh_token"])
    );
    assert!(body["scopes_supported"]
        .as_array()
        .unwrap()
        .contains(&json!("viz:data:query")));
    Ok(())
}

#[tokio::test]
async fn client_registration_returns_a_public_client() -> Result<()> {
    let resources = build_resources().await;
    let app = server::router(resources);

    let request = Request::builder()
        .method("POST")
        .uri("/oauth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "redirect_uris": ["http://localhost:9400/callback"],
                "client_name": "test-client",
            })
            .to_string(),
        ))?;
    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["client_id"].as_str().unwrap().starts_with("vz_client_"));
    assert_eq!(body["token_endpoint_auth_method"], "none");
    Ok(())
}

#[tokio::test]
async fn registration_rejects_non_loopback_http_redirects() -> Result<()> {
    let resources = build_resources().await;
    let app = server::router(resources);

    let request = Request::builder()
        .method("POST")
        .uri("/oauth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "redirect_uris": ["http://evil.example.com/cb"] }).to_string(),
        ))?;
    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_request");
    Ok(())
}

#[tokio::test]
async fn token_endpoint_accepts_form_bodies() -> Result<()> {
    let resources = build_resources().await;
    let code = common::obtain_code(&resources.oauth_provider, None).await;
    let app = server::router(resources);

    let form = serde_urlencoded::to_string([
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", common::REDIRECT_URI),
        ("code_verifier", common::VERIFIER),
        ("client_id", common::CLIENT_ID),
    ])?;
    let request = Request::builder()
        .method("POST")
        .uri("/oauth/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))?;
    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].as_str().is_some());
    Ok(())
}
