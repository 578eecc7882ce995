// ABOUTME: OAuth 2.1 authorization server: PKCE flow, encrypted opaque tokens, refresh grants
// ABOUTME: Submodules: data models, flow orchestration, HTTP routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

/// Flow entities, wire types, and RFC 6749 error vocabulary
pub mod models;
/// PKCE authorization-code flow orchestration and token issuance
pub mod provider;
/// HTTP endpoints: discovery, registration, authorize, callback, token
pub mod routes;

pub use models::OAuthError;
pub use provider::OAuthProvider;
