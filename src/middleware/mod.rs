// ABOUTME: HTTP middleware for the protected resource surface
// ABOUTME: Bearer verification, scope enforcement, and challenge rendering
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

/// Bearer token authentication and per-operation scope enforcement
pub mod auth;

pub use auth::{resource_auth, AuthContext};
