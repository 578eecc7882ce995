// ABOUTME: Resource-server middleware: bearer parsing, token verification, scope enforcement
// ABOUTME: 401 challenges carry resource metadata; 403 lists the exact missing scopes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! Every protected request passes through here before reaching the MCP
//! dispatcher. The middleware authenticates the bearer token, and when scope
//! enforcement is enabled it inspects the JSON-RPC body to decide which tool
//! operations the request invokes and whether the token's grant covers them.
//!
//! Clients speaking the streamable HTTP transport ask for
//! `text/event-stream`; errors for those requests are framed as SSE events
//! so the client's stream parser surfaces them instead of choking.

use crate::context::ServerResources;
use crate::oauth2::models::{AccessTokenClaims, OAuthError};
use crate::scopes::ScopeRegistry;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest JSON-RPC body the middleware will buffer for inspection
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Authenticated identity attached to the request for downstream handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Verified claims from the bearer token
    pub claims: AccessTokenClaims,
}

/// Authenticate and authorize a request against the protected resource.
///
/// On success the request proceeds with an [`AuthContext`] extension; on
/// failure the response is an RFC 6750 challenge (401) or an
/// `insufficient_scope` error (403), SSE-framed when the client asked for
/// an event stream.
pub async fn resource_auth(
    State(resources): State<Arc<ServerResources>>,
    request: Request,
    next: Next,
) -> Response {
    let wants_sse = accepts_event_stream(&request);
    let metadata_url = format!(
        "{}/.well-known/oauth-protected-resource",
        resources.oauth_provider.issuer_url()
    );

    let Some(token) = bearer_token(&request).map(str::to_owned) else {
        debug!("Request rejected: no bearer token presented");
        let scope = advertised_scopes(request).await;
        return challenge_response(&metadata_url, None, &scope, wants_sse);
    };

    let claims = match resources.oauth_provider.verify_token(&token) {
        Ok(claims) => claims,
        Err(_) => {
            warn!("Request rejected: bearer token failed verification");
            let scope = advertised_scopes(request).await;
            return challenge_response(&metadata_url, Some("invalid_token"), &scope, wants_sse);
        }
    };

    let request = if resources.config.enforce_scopes {
        match enforce_scopes(request, &claims, wants_sse).await {
            Ok(request) => request,
            Err(response) => return response,
        }
    } else {
        request
    };

    let mut request = request;
    request.extensions_mut().insert(AuthContext { claims });
    next.run(request).await
}

/// Buffer and inspect the JSON-RPC body, rejecting the request if the
/// token's grant does not cover every invoked operation.
async fn enforce_scopes(
    request: Request,
    claims: &AccessTokenClaims,
    wants_sse: bool,
) -> Result<Request, Response> {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return Err(render_error(
                OAuthError::invalid_request("Request body too large or unreadable"),
                wants_sse,
            ));
        }
    };

    let mut missing = missing_scopes_for_body(&bytes, &claims.scope);
    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        warn!(
            user = %claims.sub,
            missing = %missing.join(" "),
            "Request rejected: insufficient scope"
        );
        return Err(render_error(
            OAuthError::insufficient_scope(&missing),
            wants_sse,
        ));
    }

    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// Union of scope deficits across every operation the body invokes.
///
/// Non-JSON bodies (GET stream re-attach) and lifecycle methods such as
/// `initialize` require no scopes. Batch requests are checked element by
/// element so a single under-privileged call fails the whole batch before
/// any side effects.
fn missing_scopes_for_body(bytes: &Bytes, granted: &[String]) -> Vec<String> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return Vec::new();
    };

    match &value {
        serde_json::Value::Array(batch) => batch
            .iter()
            .flat_map(|entry| missing_scopes_for_message(entry, granted))
            .collect(),
        message => missing_scopes_for_message(message, granted),
    }
}

fn missing_scopes_for_message(message: &serde_json::Value, granted: &[String]) -> Vec<String> {
    let Some("tools/call") = message.get("method").and_then(|m| m.as_str()) else {
        return Vec::new();
    };
    let Some(operation) = message
        .pointer("/params/name")
        .and_then(|name| name.as_str())
    else {
        return Vec::new();
    };
    ScopeRegistry::missing_scopes(granted, operation)
}

/// Scopes to advertise in a challenge: the union of scopes the request's
/// operations require, or every supported scope when the body names none
/// (lifecycle methods, unreadable bodies, stream re-attach).
async fn advertised_scopes(request: Request) -> String {
    let required = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => required_scopes_for_body(&bytes),
        Err(_) => Vec::new(),
    };

    if required.is_empty() {
        ScopeRegistry::supported_scopes().join(" ")
    } else {
        required.join(" ")
    }
}

/// Union of required scopes across every operation the body invokes
fn required_scopes_for_body(bytes: &Bytes) -> Vec<String> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return Vec::new();
    };

    let messages: Vec<&serde_json::Value> = match &value {
        serde_json::Value::Array(batch) => batch.iter().collect(),
        message => vec![message],
    };

    let mut required: Vec<String> = messages
        .into_iter()
        .filter_map(|message| {
            let method = message.get("method").and_then(|m| m.as_str())?;
            if method != "tools/call" {
                return None;
            }
            let operation = message.pointer("/params/name").and_then(|n| n.as_str())?;
            ScopeRegistry::required_for(operation)
        })
        .flat_map(|req| req.all().into_iter().map(str::to_owned))
        .collect();
    required.sort();
    required.dedup();
    required
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

fn accepts_event_stream(request: &Request) -> bool {
    request
        .headers()
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

/// Build the 401 challenge. `error` is omitted when no credentials were
/// presented at all, per RFC 6750 §3.1.
fn challenge_response(
    metadata_url: &str,
    error: Option<&str>,
    scope: &str,
    wants_sse: bool,
) -> Response {
    let challenge = match error {
        Some(code) => format!(
            "Bearer resource_metadata=\"{metadata_url}\", error=\"{code}\", scope=\"{scope}\""
        ),
        None => format!("Bearer resource_metadata=\"{metadata_url}\", scope=\"{scope}\""),
    };

    // With no credentials presented there is no token failure to describe;
    // the challenge header alone tells the client what to do next.
    let mut response = match error {
        Some(_) => render_error(OAuthError::invalid_token(), wants_sse),
        None => StatusCode::UNAUTHORIZED.into_response(),
    };
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    if let Ok(value) = challenge.parse() {
        response.headers_mut().insert(WWW_AUTHENTICATE, value);
    }
    response
}

/// Render an OAuth error as JSON, or as an SSE `error` event for clients
/// that negotiated an event stream.
fn render_error(error: OAuthError, wants_sse: bool) -> Response {
    if wants_sse {
        let status = error.http_status();
        let payload = serde_json::to_string(&error).unwrap_or_else(|_| "{}".to_owned());
        let frame = format!("event: error\ndata: {payload}\n\n");
        (
            status,
            [(CONTENT_TYPE, "text/event-stream")],
            frame,
        )
            .into_response()
    } else {
        error.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> Bytes {
        Bytes::copy_from_slice(json.as_bytes())
    }

    #[test]
    fn tools_call_requires_operation_scopes() {
        let granted = vec!["workbooks:read".to_owned()];
        let bytes = body(r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"query_datasource","arguments":{}},"id":1}"#);
        let missing = missing_scopes_for_body(&bytes, &granted);
        assert!(missing.contains(&"datasources:query".to_owned()));
        assert!(missing.contains(&"viz:data:query".to_owned()));
    }

    #[test]
    fn initialize_requires_no_scopes() {
        let bytes = body(r#"{"jsonrpc":"2.0","method":"initialize","params":{},"id":1}"#);
        assert!(missing_scopes_for_body(&bytes, &[]).is_empty());
    }

    #[test]
    fn batch_fails_on_any_underprivileged_call() {
        let granted = vec![
            "workbooks:read".to_owned(),
            "viz:content:read".to_owned(),
        ];
        let bytes = body(
            r#"[{"jsonrpc":"2.0","method":"tools/call","params":{"name":"list_workbooks"},"id":1},
                {"jsonrpc":"2.0","method":"tools/call","params":{"name":"get_view_data"},"id":2}]"#,
        );
        let missing = missing_scopes_for_body(&bytes, &granted);
        assert!(missing.contains(&"views:read".to_owned()));
    }

    #[test]
    fn non_json_bodies_pass_scope_inspection() {
        assert!(missing_scopes_for_body(&body("not json"), &[]).is_empty());
    }

    #[test]
    fn challenge_advertises_the_requested_operations_scopes() {
        let bytes = body(r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"list_workbooks"},"id":1}"#);
        let required = required_scopes_for_body(&bytes);
        assert_eq!(required, vec!["viz:content:read", "workbooks:read"]);

        // Lifecycle methods fall back to the full supported set upstream.
        let bytes = body(r#"{"jsonrpc":"2.0","method":"initialize","params":{},"id":1}"#);
        assert!(required_scopes_for_body(&bytes).is_empty());
    }
}
