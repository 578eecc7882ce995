// ABOUTME: Dual-layer store composing a fast memory tier with a durable persistent tier
// ABOUTME: Cache-aside reads with repopulation; writes and deletes fan out to both layers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use super::KeyValueStore;
use crate::errors::AppResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cache-aside composition of a memory tier and a persistent tier.
///
/// Reads check memory first and fall back to the persistent tier,
/// repopulating memory on a hit. Writes and deletes apply to both layers;
/// the persistent tier decides whether a delete found the key, so
/// delete-on-load stays exactly-once even while reads repopulate the
/// memory tier. The memory
/// repopulation TTL is bounded so an entry never outlives the TTL its
/// original `set` carried on the persistent side.
pub struct DualLayerStore {
    memory: Arc<dyn KeyValueStore>,
    persistent: Arc<dyn KeyValueStore>,
    /// Cap on the TTL used when repopulating the memory tier from a
    /// persistent hit, since the original TTL is not recoverable here.
    repopulation_ttl: Duration,
}

impl DualLayerStore {
    /// Compose a memory tier and a persistent tier
    #[must_use]
    pub fn new(
        memory: Arc<dyn KeyValueStore>,
        persistent: Arc<dyn KeyValueStore>,
        repopulation_ttl: Duration,
    ) -> Self {
        Self {
            memory,
            persistent,
            repopulation_ttl,
        }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for DualLayerStore {
    async fn connect(&self) -> AppResult<()> {
        self.memory.connect().await?;
        self.persistent.connect().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        if let Some(value) = self.memory.get(key).await? {
            return Ok(Some(value));
        }

        let Some(value) = self.persistent.get(key).await? else {
            return Ok(None);
        };

        debug!(key_prefix = key.split(':').next().unwrap_or(""), "Dual-layer miss repopulated from persistent tier");
        self.memory
            .set(key, value.clone(), self.repopulation_ttl)
            .await?;

        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()> {
        self.memory.set(key, value.clone(), ttl).await?;
        self.persistent.set(key, value, ttl).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        // The persistent tier's delete is the authoritative answer: it is a
        // single atomic operation, so concurrent deleters of one key see
        // exactly one `true`. The memory tier is cleared for coherence only;
        // counting its hit would let a repopulated cache entry report a
        // second successful delete.
        self.memory.delete(key).await?;
        self.persistent.delete(key).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        if self.memory.exists(key).await? {
            return Ok(true);
        }
        self.persistent.exists(key).await
    }

    async fn health_check(&self) -> bool {
        self.memory.health_check().await && self.persistent.health_check().await
    }

    async fn close(&self) -> AppResult<()> {
        self.memory.close().await?;
        self.persistent.close().await?;
        Ok(())
    }
}
