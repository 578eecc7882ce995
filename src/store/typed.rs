// ABOUTME: Typed serde façade over a raw key-value backend with per-store key prefixes
// ABOUTME: Wraps every value in an expiry envelope re-checked on read
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use super::KeyValueStore;
use crate::errors::{AppError, AppResult};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Envelope persisted around every typed value.
///
/// `expires_at` duplicates the backend TTL so expiry holds even on backends
/// without native eviction (a plugin store, or a memory entry the LRU has
/// not yet dropped). A get past `expires_at` reads as absent.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    value: T,
    expires_at: i64,
}

/// One entity type stored under one key-prefix namespace.
///
/// Each façade is constructed once per process by the factory and shared via
/// `Arc`; the underlying backend may be multiplexed across façades since
/// every key carries the façade's prefix.
pub struct TypedStore<T> {
    backend: Arc<dyn KeyValueStore>,
    prefix: &'static str,
    default_ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            prefix: self.prefix,
            default_ttl: self.default_ttl,
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned + Send + Sync> TypedStore<T> {
    /// Create a façade over `backend` with the given namespace prefix
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>, prefix: &'static str, default_ttl: Duration) -> Self {
        Self {
            backend,
            prefix,
            default_ttl,
            _marker: PhantomData,
        }
    }

    fn full_key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// The TTL applied when `set` is called without an explicit TTL
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `value` under `id` with the façade's default TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    pub async fn set(&self, id: &str, value: &T) -> AppResult<()> {
        self.set_with_ttl(id, value, self.default_ttl).await
    }

    /// Store `value` under `id` with an explicit TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    pub async fn set_with_ttl(&self, id: &str, value: &T, ttl: Duration) -> AppResult<()> {
        let expires_at = Utc::now().timestamp_millis() + i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let envelope = Envelope { value, expires_at };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| AppError::serialization(format!("Store serialization failed: {e}")))?;

        self.backend.set(&self.full_key(id), bytes, ttl).await
    }

    /// Retrieve the value under `id`, treating expired entries as absent
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read or deserialization fails.
    pub async fn get(&self, id: &str) -> AppResult<Option<T>> {
        let key = self.full_key(id);
        let Some(bytes) = self.backend.get(&key).await? else {
            return Ok(None);
        };

        let envelope: Envelope<T> = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::serialization(format!("Store deserialization failed: {e}")))?;

        if Utc::now().timestamp_millis() >= envelope.expires_at {
            // Backend eviction lagged the logical TTL; drop the stale record
            let _ = self.backend.delete(&key).await;
            return Ok(None);
        }

        Ok(Some(envelope.value))
    }

    /// Delete the record under `id`. Returns `true` iff a record existed.
    ///
    /// This is the serialization point for single-use entities: under
    /// concurrent redemption exactly one caller observes `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete fails.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        self.backend.delete(&self.full_key(id)).await
    }

    /// Atomically take the value under `id`: get it and delete it.
    ///
    /// Returns `None` unless this caller both found the record unexpired
    /// and won the delete, so a second concurrent take observes absence.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend operation fails.
    pub async fn take(&self, id: &str) -> AppResult<Option<T>> {
        let Some(value) = self.get(id).await? else {
            return Ok(None);
        };
        // The delete result decides the race: only the winner gets the value.
        if self.delete(id).await? {
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    /// Check whether an unexpired record exists under `id`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub async fn exists(&self, id: &str) -> AppResult<bool> {
        // Route through get so the envelope expiry re-check applies
        Ok(self.get(id).await?.is_some())
    }

    /// Health of the underlying backend
    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }
}
