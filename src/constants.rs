// ABOUTME: System-wide constants for the vizgate gateway
// ABOUTME: Key-prefix namespaces, TTL defaults and clamps, protocol identifiers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! # Constants Module
//!
//! Hardcoded defaults and namespace prefixes. Values with operational impact
//! (TTLs, ports) are defaults only and can be overridden through
//! [`crate::config::ServerConfig`].

/// Protocol-related constants
pub mod protocol {
    /// `JSON-RPC` version (standard, not configurable)
    pub const JSONRPC_VERSION: &str = "2.0";

    /// MCP protocol revision this gateway speaks
    pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

    /// Server name advertised during protocol initialize
    pub const SERVER_NAME: &str = "vizgate";

    /// Server version from Cargo.toml
    pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// HTTP header carrying the protocol session id
    pub const SESSION_ID_HEADER: &str = "mcp-session-id";
}

/// Key-prefix namespaces for multiplexing one backend across all stores
pub mod key_prefixes {
    /// Pending authorization records (PKCE challenge parked during the flow)
    pub const PENDING_AUTHORIZATION: &str = "pending-authz:";

    /// Server-issued authorization codes
    pub const AUTHORIZATION_CODE: &str = "authz-code:";

    /// Refresh token records
    pub const REFRESH_TOKEN: &str = "refresh-token:";

    /// Protocol session records
    pub const SESSION: &str = "session:";

    /// Prefix on opaque refresh-token identifiers handed to clients
    pub const REFRESH_TOKEN_ID: &str = "vz_rt_";
}

/// TTL defaults and enforced clamps, in seconds
pub mod ttl {
    /// Pending authorization lifetime (authorize -> upstream callback window)
    pub const DEFAULT_PENDING_AUTHORIZATION_SECS: u64 = 600;

    /// Authorization code lifetime
    pub const DEFAULT_AUTHORIZATION_CODE_SECS: u64 = 600;
    /// Lower clamp for authorization code lifetime
    pub const MIN_AUTHORIZATION_CODE_SECS: u64 = 60;
    /// Upper clamp for authorization code lifetime
    pub const MAX_AUTHORIZATION_CODE_SECS: u64 = 900;

    /// Access token lifetime
    pub const DEFAULT_ACCESS_TOKEN_SECS: u64 = 3600;
    /// Lower clamp for access token lifetime
    pub const MIN_ACCESS_TOKEN_SECS: u64 = 300;
    /// Upper clamp for access token lifetime
    pub const MAX_ACCESS_TOKEN_SECS: u64 = 86_400;

    /// Refresh token lifetime (30 days)
    pub const DEFAULT_REFRESH_TOKEN_SECS: u64 = 30 * 86_400;
    /// Lower clamp for refresh token lifetime (1 day)
    pub const MIN_REFRESH_TOKEN_SECS: u64 = 86_400;
    /// Upper clamp for refresh token lifetime (90 days)
    pub const MAX_REFRESH_TOKEN_SECS: u64 = 90 * 86_400;

    /// Protocol session lifetime
    pub const DEFAULT_SESSION_SECS: u64 = 4 * 3600;
}

/// Storage backend defaults
pub mod store {
    /// Bounded capacity for the in-memory store
    pub const DEFAULT_MEMORY_MAX_ENTRIES: usize = 10_000;

    /// Request timeout applied to persistent-store operations, in seconds
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
}

/// Default network configuration
pub mod ports {
    /// Default HTTP listener port
    pub const DEFAULT_HTTP_PORT: u16 = 8080;
}
