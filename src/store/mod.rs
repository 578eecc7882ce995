// ABOUTME: Key-value storage abstraction with pluggable backends and TTL semantics
// ABOUTME: Backends: in-memory (LRU, lazy expiry), Redis (native TTL, at-rest encryption), dual-layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! Storage layer for OAuth flow state and protocol sessions.
//!
//! The [`KeyValueStore`] trait is deliberately byte-valued and object-safe so
//! operator-supplied backends can be registered at startup (see
//! [`factory::StoreFactory`]). Entity typing, key-prefix namespacing, and
//! TTL re-checking live one level up in [`typed::TypedStore`].

/// Dual-layer (memory + persistent) composition
pub mod dual;
/// Store factory with backend selection and plugin registry
pub mod factory;
/// In-memory store with lazy TTL expiry
pub mod memory;
/// Redis-backed persistent store
pub mod redis;
/// Typed serde façades over a raw backend
pub mod typed;

use crate::errors::AppResult;
use std::time::Duration;

/// Contract every storage backend must fulfil.
///
/// Implementations must be safe for concurrent use from many request tasks;
/// each instance owns its backend connection for the process lifetime.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Idempotently establish backend connectivity.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn connect(&self) -> AppResult<()>;

    /// Retrieve the raw value stored under `key`, if present and unexpired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// Upsert `value` under `key`, resetting its TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()>;

    /// Delete the record under `key`. Returns `true` iff a record existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// Check whether an unexpired record exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Verify the backend is reachable and serving. Must not error.
    async fn health_check(&self) -> bool;

    /// Release backend resources.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails.
    async fn close(&self) -> AppResult<()>;
}

impl std::fmt::Debug for dyn KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyValueStore")
    }
}
