// ABOUTME: Main library entry point for the vizgate analytics-platform gateway
// ABOUTME: OAuth 2.1 authorization + resource server fronting an MCP tool surface
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

#![deny(unsafe_code)]

//! # Vizgate
//!
//! An API gateway that fronts a third-party analytics platform with an
//! MCP-style JSON-RPC surface, protected by a self-hosted OAuth 2.1
//! authorization server.
//!
//! ## Architecture
//!
//! - **oauth2**: PKCE authorization-code flow, encrypted opaque access
//!   tokens wrapping the upstream credential pair, refresh grants,
//!   discovery and dynamic registration
//! - **store**: pluggable key-value storage (memory, Redis, dual-layer,
//!   operator plugins) with TTL semantics shared by every flow entity
//! - **middleware**: resource-server bearer authentication and
//!   per-operation scope enforcement
//! - **session**: protocol session records plus process-local transport
//!   handles for the streamable HTTP transport
//! - **upstream**: the identity seam to the analytics platform
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vizgate::config::ServerConfig;
//! use vizgate::errors::AppResult;
//!
//! fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("vizgate configured for port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Environment-driven configuration with validated defaults
pub mod config;
/// System-wide constants: key prefixes, TTL clamps, protocol identifiers
pub mod constants;
/// Shared server resources wired once at startup
pub mod context;
/// Token encryption, at-rest encryption, and opaque id generation
pub mod crypto;
/// Unified error taxonomy for infrastructure faults
pub mod errors;
/// Structured logging initialization
pub mod logging;
/// MCP JSON-RPC transport endpoints
pub mod mcp;
/// Resource-server authentication and scope enforcement
pub mod middleware;
/// OAuth 2.1 authorization server
pub mod oauth2;
/// Operation-to-scope catalog
pub mod scopes;
/// Router assembly and server lifecycle
pub mod server;
/// Protocol session lifecycle
pub mod session;
/// Pluggable key-value storage with TTL semantics
pub mod store;
/// Upstream analytics-platform identity seam
pub mod upstream;
