// ABOUTME: Environment-driven server configuration with validated defaults
// ABOUTME: TTL clamps, store backend selection, upstream endpoints, listener settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! Configuration is read once at startup from `VIZGATE_*` environment
//! variables. Lifetimes with security impact are clamped to safe ranges
//! rather than rejected, with a warning when a value is pulled back.

use crate::constants::{ports, store, ttl};
use crate::errors::{AppError, AppResult};
use crate::store::factory::StoreBackendConfig;
use crate::store::redis::RedisConnectionConfig;
use crate::upstream::UpstreamConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Top-level gateway configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listener port
    pub http_port: u16,
    /// External base URL clients use to reach this gateway; doubles as the
    /// token issuer and audience
    pub external_url: String,
    /// Whether per-operation scope enforcement is active
    pub enforce_scopes: bool,
    /// Backend powering the OAuth flow stores
    pub oauth_store: StoreBackendConfig,
    /// Backend powering the session store
    pub session_store: StoreBackendConfig,
    /// Pending authorization lifetime
    pub pending_authorization_ttl: Duration,
    /// Authorization code lifetime, clamped
    pub authorization_code_ttl: Duration,
    /// Access token lifetime, clamped
    pub access_token_ttl: Duration,
    /// Refresh token lifetime, clamped
    pub refresh_token_ttl: Duration,
    /// Upstream analytics-platform endpoints and credentials
    pub upstream: UpstreamConfig,
}

impl ServerConfig {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required upstream variable is missing or the
    /// store backend selector is unrecognized.
    pub fn from_env() -> AppResult<Self> {
        let http_port = env_parse("VIZGATE_HTTP_PORT", ports::DEFAULT_HTTP_PORT);
        let external_url = env_string(
            "VIZGATE_EXTERNAL_URL",
            &format!("http://localhost:{http_port}"),
        );
        let external_url = external_url.trim_end_matches('/').to_owned();

        let oauth_store = store_backend_from_env("VIZGATE_STORE_BACKEND")?;
        // Sessions default to the same backend but can be split off, e.g.
        // durable Redis for grants with memory-only sessions.
        let session_store = if env::var("VIZGATE_SESSION_STORE_BACKEND").is_ok() {
            store_backend_from_env("VIZGATE_SESSION_STORE_BACKEND")?
        } else {
            oauth_store.clone()
        };

        Ok(Self {
            http_port,
            external_url,
            enforce_scopes: env_parse("VIZGATE_ENFORCE_SCOPES", true),
            oauth_store,
            session_store,
            pending_authorization_ttl: Duration::from_secs(env_parse(
                "VIZGATE_PENDING_AUTHORIZATION_TTL_SECS",
                ttl::DEFAULT_PENDING_AUTHORIZATION_SECS,
            )),
            authorization_code_ttl: Duration::from_secs(clamped_ttl(
                "VIZGATE_AUTHORIZATION_CODE_TTL_SECS",
                ttl::DEFAULT_AUTHORIZATION_CODE_SECS,
                ttl::MIN_AUTHORIZATION_CODE_SECS,
                ttl::MAX_AUTHORIZATION_CODE_SECS,
            )),
            access_token_ttl: Duration::from_secs(clamped_ttl(
                "VIZGATE_ACCESS_TOKEN_TTL_SECS",
                ttl::DEFAULT_ACCESS_TOKEN_SECS,
                ttl::MIN_ACCESS_TOKEN_SECS,
                ttl::MAX_ACCESS_TOKEN_SECS,
            )),
            refresh_token_ttl: Duration::from_secs(clamped_ttl(
                "VIZGATE_REFRESH_TOKEN_TTL_SECS",
                ttl::DEFAULT_REFRESH_TOKEN_SECS,
                ttl::MIN_REFRESH_TOKEN_SECS,
                ttl::MAX_REFRESH_TOKEN_SECS,
            )),
            upstream: upstream_from_env()?,
        })
    }
}

fn store_backend_from_env(key: &str) -> AppResult<StoreBackendConfig> {
    let selector = env_string(key, "memory");
    let max_entries = env_parse(
        "VIZGATE_STORE_MAX_ENTRIES",
        store::DEFAULT_MEMORY_MAX_ENTRIES,
    );
    let at_rest_key = env::var("VIZGATE_STORE_ENCRYPTION_KEY").ok();

    match selector.as_str() {
        "memory" => Ok(StoreBackendConfig::Memory { max_entries }),
        "redis" => Ok(StoreBackendConfig::Redis {
            connection: redis_connection_from_env(),
            at_rest_key,
        }),
        "dual-layer" => Ok(StoreBackendConfig::DualLayer {
            max_entries,
            connection: redis_connection_from_env(),
            at_rest_key,
            repopulation_ttl_secs: env_parse("VIZGATE_REPOPULATION_TTL_SECS", 300),
        }),
        other => {
            if let Some(name) = other.strip_prefix("plugin:") {
                Ok(StoreBackendConfig::Plugin {
                    name: name.to_owned(),
                })
            } else {
                Err(AppError::config(format!(
                    "Unknown {key} '{other}' (expected memory, redis, dual-layer, or plugin:<name>)"
                )))
            }
        }
    }
}

fn redis_connection_from_env() -> RedisConnectionConfig {
    RedisConnectionConfig {
        url: env_string("VIZGATE_REDIS_URL", "redis://127.0.0.1:6379"),
        ..RedisConnectionConfig::default()
    }
}

fn upstream_from_env() -> AppResult<UpstreamConfig> {
    let server_url = required_env("VIZGATE_UPSTREAM_SERVER_URL")?;
    let server_url = server_url.trim_end_matches('/').to_owned();

    Ok(UpstreamConfig {
        auth_url: env_string(
            "VIZGATE_UPSTREAM_AUTH_URL",
            &format!("{server_url}/oauth2/v1/auth"),
        ),
        token_url: env_string(
            "VIZGATE_UPSTREAM_TOKEN_URL",
            &format!("{server_url}/oauth2/v1/token"),
        ),
        userinfo_url: env_string(
            "VIZGATE_UPSTREAM_USERINFO_URL",
            &format!("{server_url}/api/current-user"),
        ),
        client_id: required_env("VIZGATE_UPSTREAM_CLIENT_ID")?,
        client_secret: required_env("VIZGATE_UPSTREAM_CLIENT_SECRET")?,
        redirect_uri: required_env("VIZGATE_UPSTREAM_REDIRECT_URI")?,
        scopes: env_string(
            "VIZGATE_UPSTREAM_SCOPES",
            "viz:content:read viz:data:query viz:views:download",
        )
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect(),
        request_timeout: Duration::from_secs(env_parse(
            "VIZGATE_UPSTREAM_TIMEOUT_SECS",
            store::DEFAULT_REQUEST_TIMEOUT_SECS,
        )),
        server_url,
    })
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn required_env(key: &str) -> AppResult<String> {
    env::var(key).map_err(|_| AppError::config(format!("{key} must be set")))
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {key}='{raw}', using default");
            default
        }),
        Err(_) => default,
    }
}

fn clamped_ttl(key: &str, default: u64, min: u64, max: u64) -> u64 {
    let value: u64 = env_parse(key, default);
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!("{key}={value} outside [{min}, {max}], clamped to {clamped}");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn ttl_values_are_clamped_into_range() {
        env::set_var("VIZGATE_TEST_TTL", "10");
        assert_eq!(clamped_ttl("VIZGATE_TEST_TTL", 600, 60, 900), 60);

        env::set_var("VIZGATE_TEST_TTL", "5000");
        assert_eq!(clamped_ttl("VIZGATE_TEST_TTL", 600, 60, 900), 900);

        env::remove_var("VIZGATE_TEST_TTL");
        assert_eq!(clamped_ttl("VIZGATE_TEST_TTL", 600, 60, 900), 600);
    }

    #[test]
    #[serial]
    fn unparseable_values_fall_back_to_defaults() {
        env::set_var("VIZGATE_TEST_PORT", "not-a-port");
        assert_eq!(env_parse("VIZGATE_TEST_PORT", 8080_u16), 8080);
        env::remove_var("VIZGATE_TEST_PORT");
    }

    #[test]
    #[serial]
    fn plugin_selector_carries_the_backend_name() {
        env::set_var("VIZGATE_STORE_BACKEND", "plugin:etcd");
        let backend = store_backend_from_env("VIZGATE_STORE_BACKEND").unwrap();
        assert!(matches!(backend, StoreBackendConfig::Plugin { name } if name == "etcd"));
        env::remove_var("VIZGATE_STORE_BACKEND");
    }

    #[test]
    #[serial]
    fn unknown_selector_is_rejected() {
        env::set_var("VIZGATE_STORE_BACKEND", "postgres");
        assert!(store_backend_from_env("VIZGATE_STORE_BACKEND").is_err());
        env::remove_var("VIZGATE_STORE_BACKEND");
    }
}
