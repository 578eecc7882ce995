// ABOUTME: Router assembly and HTTP server lifecycle
// ABOUTME: OAuth endpoints are public; the MCP surface sits behind the auth middleware
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use crate::constants::protocol;
use crate::context::ServerResources;
use crate::errors::{AppError, AppResult};
use crate::{mcp, middleware, oauth2};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Default request timeout for the whole HTTP surface
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Interval between sweeps reclaiming transports of expired sessions
const TRANSPORT_REAP_INTERVAL_SECS: u64 = 300;

/// Build the complete application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    let protected = Router::new()
        .route(
            "/mcp",
            axum::routing::post(mcp::post_message)
                .get(mcp::get_stream)
                .delete(mcp::delete_session),
        )
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&resources),
            middleware::resource_auth,
        ));

    Router::new()
        .merge(oauth2::routes::router())
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(resources)
}

/// Bind the listener and serve until shutdown.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn run(resources: Arc<ServerResources>) -> AppResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], resources.config.http_port));

    let session_manager = Arc::clone(&resources.session_manager);
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(TRANSPORT_REAP_INTERVAL_SECS));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = session_manager.reap_stale_transports().await {
                warn!("Transport sweep failed: {e}");
            }
        }
    });

    let app = router(resources);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::config(format!("Failed to bind {addr}: {e}")))?;

    info!("Listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": protocol::SERVER_NAME,
        "version": protocol::SERVER_VERSION,
    }))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
