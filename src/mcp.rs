// ABOUTME: MCP JSON-RPC transport: lifecycle methods, tool listing, streamable HTTP endpoints
// ABOUTME: POST handles single and batch messages; GET attaches the session event stream
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! Protocol surface behind the resource-server middleware. By the time a
//! request reaches these handlers it carries a verified [`AuthContext`] and
//! has passed scope enforcement, so handlers only deal in protocol
//! semantics. Tool execution itself goes through the [`ToolDispatcher`]
//! seam; the catalog of operations and their required scopes comes from the
//! scope registry.

use crate::constants::protocol;
use crate::context::ServerResources;
use crate::errors::{AppError, AppResult};
use crate::middleware::AuthContext;
use crate::oauth2::models::AccessTokenClaims;
use crate::scopes::ScopeRegistry;
use crate::session::ClientInfo;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures_util::StreamExt;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// JSON-RPC error code: method not found
const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code: invalid request object
const INVALID_REQUEST: i64 = -32600;
/// JSON-RPC error code: server-side execution failure
const INTERNAL_ERROR: i64 = -32603;

/// Incoming JSON-RPC message
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version marker, must be `"2.0"`
    #[serde(default)]
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Value,
    /// Request id; absent for notifications
    #[serde(default)]
    pub id: Option<Value>,
}

/// Outgoing JSON-RPC message
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`
    pub jsonrpc: &'static str,
    /// Echoed request id
    pub id: Value,
    /// Success payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Numeric error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: protocol::JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: protocol::JSONRPC_VERSION,
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Execution seam for `tools/call`.
///
/// The dispatcher receives the verified claims so it can use the wrapped
/// upstream credential; the concrete analytics connector plugs in here.
#[async_trait::async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Execute `operation` with `arguments` on behalf of the token holder.
    ///
    /// # Errors
    ///
    /// Returns an error when the tool execution fails.
    async fn call(
        &self,
        operation: &str,
        arguments: Value,
        claims: &AccessTokenClaims,
    ) -> AppResult<Value>;
}

/// Dispatcher used when no analytics connector is wired in
pub struct NoopToolDispatcher;

#[async_trait::async_trait]
impl ToolDispatcher for NoopToolDispatcher {
    async fn call(
        &self,
        operation: &str,
        _arguments: Value,
        _claims: &AccessTokenClaims,
    ) -> AppResult<Value> {
        Err(AppError::internal(format!(
            "No tool connector is configured for '{operation}'"
        )))
    }
}

/// POST /mcp: process a single message or a batch
pub async fn post_message(
    State(resources): State<Arc<ServerResources>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Ok(value) = serde_json::from_str::<Value>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::failure(
                Value::Null,
                INVALID_REQUEST,
                "Request body is not valid JSON",
            )),
        )
            .into_response();
    };

    match value {
        Value::Array(batch) => {
            let mut responses = Vec::with_capacity(batch.len());
            for entry in batch {
                if let Some(response) =
                    handle_message(&resources, &auth, &headers, entry).await
                {
                    responses.push(response);
                }
            }
            if responses.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        message => match handle_message(&resources, &auth, &headers, message).await {
            Some(response) => {
                // initialize is the one response that must carry the
                // session id back to the client.
                if let Some(session_id) = response
                    .result
                    .as_ref()
                    .and_then(|r| r.pointer("/_meta/sessionId"))
                    .and_then(Value::as_str)
                {
                    let mut http_response = Json(&response).into_response();
                    if let Ok(header) = session_id.parse() {
                        http_response
                            .headers_mut()
                            .insert(protocol::SESSION_ID_HEADER, header);
                    }
                    return http_response;
                }
                Json(response).into_response()
            }
            None => StatusCode::ACCEPTED.into_response(),
        },
    }
}

/// Dispatch one message; notifications produce no response
async fn handle_message(
    resources: &ServerResources,
    auth: &AuthContext,
    headers: &HeaderMap,
    message: Value,
) -> Option<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(_) => {
            return Some(JsonRpcResponse::failure(
                Value::Null,
                INVALID_REQUEST,
                "Malformed JSON-RPC message",
            ));
        }
    };

    let id = request.id.clone()?;

    let response = match request.method.as_str() {
        "initialize" => handle_initialize(resources, &request, id).await,
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, tools_list()),
        "tools/call" => handle_tool_call(resources, auth, &request, id).await,
        "session/close" => handle_session_close(resources, headers, id).await,
        other => {
            debug!(method = %other, "Unknown JSON-RPC method");
            JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Unknown method '{other}'"))
        }
    };

    Some(response)
}

async fn handle_initialize(
    resources: &ServerResources,
    request: &JsonRpcRequest,
    id: Value,
) -> JsonRpcResponse {
    let client_info = request
        .params
        .pointer("/clientInfo")
        .and_then(|info| serde_json::from_value::<ClientInfo>(info.clone()).ok())
        .unwrap_or_else(|| ClientInfo {
            name: "unknown".to_owned(),
            version: "0.0.0".to_owned(),
        });

    match resources.session_manager.create_session(client_info).await {
        Ok(record) => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": protocol::MCP_PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": protocol::SERVER_NAME,
                    "version": protocol::SERVER_VERSION,
                },
                "_meta": { "sessionId": record.session_id },
            }),
        ),
        Err(e) => {
            warn!("Session creation failed: {e}");
            JsonRpcResponse::failure(id, INTERNAL_ERROR, "Failed to create session")
        }
    }
}

/// Advertise the operation catalog with the scopes each one requires
fn tools_list() -> Value {
    let tools: Vec<Value> = ScopeRegistry::operations()
        .iter()
        .map(|operation| {
            let required = ScopeRegistry::required_for(operation)
                .map(|r| r.all().join(" "))
                .unwrap_or_default();
            json!({
                "name": operation,
                "description": format!("Requires scopes: {required}"),
                "inputSchema": { "type": "object" },
            })
        })
        .collect();
    json!({ "tools": tools })
}

async fn handle_tool_call(
    resources: &ServerResources,
    auth: &AuthContext,
    request: &JsonRpcRequest,
    id: Value,
) -> JsonRpcResponse {
    let Some(operation) = request.params.pointer("/name").and_then(Value::as_str) else {
        return JsonRpcResponse::failure(id, INVALID_REQUEST, "tools/call requires params.name");
    };

    if ScopeRegistry::required_for(operation).is_none() {
        return JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Unknown tool '{operation}'"));
    }

    let arguments = request
        .params
        .pointer("/arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    match resources
        .tool_dispatcher
        .call(operation, arguments, &auth.claims)
        .await
    {
        Ok(result) => JsonRpcResponse::success(id, json!({ "content": result })),
        Err(e) => {
            warn!(operation = %operation, "Tool execution failed: {e}");
            JsonRpcResponse::failure(id, INTERNAL_ERROR, e.message)
        }
    }
}

async fn handle_session_close(
    resources: &ServerResources,
    headers: &HeaderMap,
    id: Value,
) -> JsonRpcResponse {
    let Some(session_id) = session_id_header(headers) else {
        return JsonRpcResponse::failure(id, INVALID_REQUEST, "Missing mcp-session-id header");
    };

    match resources.session_manager.close_session(&session_id).await {
        Ok(_) => JsonRpcResponse::success(id, json!({})),
        Err(e) => {
            warn!("Session close failed: {e}");
            JsonRpcResponse::failure(id, INTERNAL_ERROR, "Failed to close session")
        }
    }
}

/// GET /mcp: attach to the session's event stream
pub async fn get_stream(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_id_header(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_request", "error_description": "Missing mcp-session-id header"})),
        )
            .into_response();
    };

    match resources.session_manager.attach_transport(&session_id).await {
        Ok(receiver) => {
            let stream = BroadcastStream::new(receiver).filter_map(|frame| async {
                // Lagged receivers drop frames rather than kill the stream.
                frame
                    .ok()
                    .map(|data| Ok::<Event, Infallible>(Event::default().data(data)))
            });
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        }
        Err(e) => {
            debug!(session_id = %session_id, "Stream attach rejected: {e}");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "invalid_request", "error_description": "Unknown or expired session"})),
            )
                .into_response()
        }
    }
}

/// DELETE /mcp: tear the session down
pub async fn delete_session(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_id_header(&headers) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match resources.session_manager.close_session(&session_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Session delete failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn session_id_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(protocol::SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
