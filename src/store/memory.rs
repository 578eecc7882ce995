// ABOUTME: In-memory store implementation with LRU bounding and lazy TTL expiry
// ABOUTME: Expiry is checked on read; no background timers are spawned
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use super::KeyValueStore;
use crate::errors::AppResult;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// In-memory entry with its expiration instant
#[derive(Debug, Clone)]
struct MemoryEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl MemoryEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local store backed by a TTL-expiring LRU map.
///
/// Uses `Arc<RwLock<LruCache>>` so clones share state with concurrent request
/// tasks. Expired entries are removed lazily on the read path, which keeps
/// the store free of timers while still honoring the TTL contract: an entry
/// past its TTL is never returned, even if eviction has not run.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<LruCache<String, MemoryEntry>>>,
}

impl MemoryStore {
    /// Fallback capacity when configuration specifies zero entries
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
        Some(n) => n,
        None => unreachable!(),
    };

    /// Create a new store bounded to `max_entries`
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(Self::DEFAULT_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    /// Number of live (possibly expired but unevicted) entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(crate::constants::store::DEFAULT_MEMORY_MAX_ENTRIES)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn connect(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let mut entries = self.entries.write().await;

        // LruCache::get is mutable (updates recency order)
        if let Some(entry) = entries.get(key) {
            if entry.is_expired() {
                entries.pop(key);
                drop(entries);
                return Ok(None);
            }
            let data = entry.data.clone();
            drop(entries);
            return Ok(Some(data));
        }
        drop(entries);

        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()> {
        let entry = MemoryEntry::new(value, ttl);
        // LruCache handles eviction automatically on push
        self.entries.write().await.push(key.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut entries = self.entries.write().await;
        let removed = entries.pop(key);
        drop(entries);
        // An expired-but-unevicted record still counts as absent to callers
        Ok(removed.is_some_and(|e| !e.is_expired()))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get(key) {
            if entry.is_expired() {
                entries.pop(key);
                drop(entries);
                return Ok(false);
            }
            drop(entries);
            return Ok(true);
        }
        drop(entries);

        Ok(false)
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn close(&self) -> AppResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
