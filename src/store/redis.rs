// ABOUTME: Redis-backed persistent store with connection pooling and native TTL
// ABOUTME: Optional AES-256-GCM at-rest encryption; decrypt failures read as absent
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use super::KeyValueStore;
use crate::crypto::SecretCipher;
use crate::errors::{AppError, AppResult};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{error, info, warn};

/// Connection and retry parameters for the Redis backend
#[derive(Debug, Clone)]
pub struct RedisConnectionConfig {
    /// Connection URL (redis://...)
    pub url: String,
    /// TCP connect timeout in seconds
    pub connection_timeout_secs: u64,
    /// Per-command response timeout in seconds
    pub response_timeout_secs: u64,
    /// Retries during initial connection at startup
    pub initial_connection_retries: u64,
    /// Initial backoff delay between connection retries, in milliseconds
    pub initial_retry_delay_ms: u64,
    /// Upper bound on backoff delay, in milliseconds
    pub max_retry_delay_ms: u64,
    /// Reconnection retries after an established connection drops
    pub reconnection_retries: usize,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
            connection_timeout_secs: crate::constants::store::DEFAULT_REQUEST_TIMEOUT_SECS,
            response_timeout_secs: crate::constants::store::DEFAULT_REQUEST_TIMEOUT_SECS,
            initial_connection_retries: 3,
            initial_retry_delay_ms: 200,
            max_retry_delay_ms: 5_000,
            reconnection_retries: 6,
        }
    }
}

/// Durable store backed by Redis.
///
/// Uses Redis `ConnectionManager` for automatic reconnection. TTLs are
/// enforced natively with `SET ... EX`. When an at-rest cipher is
/// configured, serialized values are authenticated-encrypted before write
/// and decrypted after read; an undecryptable payload is indistinguishable
/// from an absent key.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    cipher: Option<SecretCipher>,
}

impl RedisStore {
    /// Connect to Redis and build the store
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established within the
    /// configured retry budget.
    pub async fn connect_with_config(
        config: &RedisConnectionConfig,
        cipher: Option<SecretCipher>,
    ) -> AppResult<Self> {
        info!(
            "Connecting to Redis at {} (timeout={}s, response_timeout={}s, retries={})",
            config.url,
            config.connection_timeout_secs,
            config.response_timeout_secs,
            config.initial_connection_retries
        );

        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| AppError::storage(format!("Failed to create Redis client: {e}")))?;

        let manager = Self::connect_with_retry(&client, config).await?;

        info!(
            at_rest_encryption = cipher.is_some(),
            "Successfully connected to Redis"
        );

        Ok(Self { manager, cipher })
    }

    /// Connect with exponential backoff retry on failure
    async fn connect_with_retry(
        client: &redis::Client,
        config: &RedisConnectionConfig,
    ) -> AppResult<ConnectionManager> {
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .set_response_timeout(Duration::from_secs(config.response_timeout_secs))
            .set_number_of_retries(config.reconnection_retries)
            .set_max_delay(config.max_retry_delay_ms);

        let max_retries = config.initial_connection_retries;
        let mut delay_ms = config.initial_retry_delay_ms;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match ConnectionManager::new_with_config(client.clone(), manager_config.clone()).await {
                Ok(manager) => {
                    if attempt > 0 {
                        info!("Redis connection established after {} retries", attempt);
                    }
                    return Ok(manager);
                }
                Err(e) => {
                    last_error = Some(e);

                    if attempt < max_retries {
                        warn!(
                            "Redis connection attempt {}/{} failed, retrying in {}ms: {}",
                            attempt + 1,
                            max_retries + 1,
                            delay_ms,
                            last_error
                                .as_ref()
                                .map_or_else(|| "unknown".to_owned(), ToString::to_string)
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(config.max_retry_delay_ms);
                    }
                }
            }
        }

        Err(AppError::storage(format!(
            "Failed to connect to Redis after {} attempts: {}",
            max_retries + 1,
            last_error.map_or_else(|| "unknown error".to_owned(), |e| e.to_string())
        )))
    }

    fn encode(&self, value: Vec<u8>) -> AppResult<Vec<u8>> {
        match &self.cipher {
            Some(cipher) => cipher.encrypt(&value),
            None => Ok(value),
        }
    }

    fn decode(&self, payload: Vec<u8>) -> Option<Vec<u8>> {
        match &self.cipher {
            // A wrong key or corrupted payload must look exactly like a miss
            Some(cipher) => cipher.decrypt(&payload),
            None => Some(payload),
        }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn connect(&self) -> AppResult<()> {
        // ConnectionManager connects eagerly in connect_with_config and
        // reconnects on its own; nothing further to establish here.
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();

        let payload: Option<Vec<u8>> = conn.get(key).await.map_err(|e| {
            error!("Redis GET operation failed: {}", e);
            AppError::storage(format!("Store error: {e}"))
        })?;

        Ok(payload.and_then(|bytes| self.decode(bytes)))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()> {
        let payload = self.encode(value)?;
        // SETEX writes value and expiry in one atomic operation
        let ttl_secs = ttl.as_secs().max(1);

        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, payload, ttl_secs)
            .await
            .map_err(|e| {
                error!("Redis SET operation failed: {}", e);
                AppError::storage(format!("Store error: {e}"))
            })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();

        let removed: u64 = conn.del(key).await.map_err(|e| {
            error!("Redis DEL operation failed: {}", e);
            AppError::storage(format!("Store error: {e}"))
        })?;

        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();

        let exists: bool = conn.exists(key).await.map_err(|e| {
            error!("Redis EXISTS operation failed: {}", e);
            AppError::storage(format!("Store error: {e}"))
        })?;

        Ok(exists)
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.manager.clone();

        match redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
        {
            Ok(response) if response == "PONG" => true,
            Ok(response) => {
                error!("Redis PING returned unexpected response '{response}'");
                false
            }
            Err(e) => {
                error!("Redis PING failed: {}", e);
                false
            }
        }
    }

    async fn close(&self) -> AppResult<()> {
        // ConnectionManager has no explicit shutdown; dropping the last
        // clone closes the multiplexed connection.
        Ok(())
    }
}
