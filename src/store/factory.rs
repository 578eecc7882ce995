// ABOUTME: Store factory for backend selection with startup connectivity verification
// ABOUTME: Plugin backends register a factory function keyed by backend name
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use super::dual::DualLayerStore;
use super::memory::MemoryStore;
use super::redis::{RedisConnectionConfig, RedisStore};
use super::KeyValueStore;
use crate::crypto::SecretCipher;
use crate::errors::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Discriminated backend selection for one store façade
#[derive(Debug, Clone)]
pub enum StoreBackendConfig {
    /// Process-local memory store
    Memory {
        /// LRU capacity bound
        max_entries: usize,
    },
    /// Durable Redis store
    Redis {
        /// Connection and retry parameters
        connection: RedisConnectionConfig,
        /// Base64-encoded 32-byte key enabling at-rest encryption
        at_rest_key: Option<String>,
    },
    /// Memory tier in front of a Redis tier
    DualLayer {
        /// Memory-tier LRU capacity bound
        max_entries: usize,
        /// Persistent-tier connection parameters
        connection: RedisConnectionConfig,
        /// Base64-encoded 32-byte key enabling persistent-tier encryption
        at_rest_key: Option<String>,
        /// Cap on the memory-tier TTL used when repopulating from the
        /// persistent tier, in seconds
        repopulation_ttl_secs: u64,
    },
    /// Operator-supplied backend registered by name
    Plugin {
        /// Registered backend name
        name: String,
    },
}

/// Constructor signature for operator-supplied backends.
///
/// Trait conformance is checked by the compiler at registration; the factory
/// only has to resolve the name. The returned store still goes through the
/// same connect-and-health-check gate as built-in backends.
pub type PluginStoreFactory =
    Arc<dyn Fn() -> AppResult<Arc<dyn KeyValueStore>> + Send + Sync>;

/// Builds concrete stores from configuration and verifies them at startup.
///
/// A store that cannot connect or fails its health check aborts startup;
/// serving traffic against a backend that might silently drop authorization
/// state is worse than not starting.
#[derive(Default)]
pub struct StoreFactory {
    plugins: HashMap<String, PluginStoreFactory>,
}

impl StoreFactory {
    /// Create a factory with no plugins registered
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator-supplied backend under `name`
    pub fn register_plugin(&mut self, name: impl Into<String>, factory: PluginStoreFactory) {
        let name = name.into();
        info!("Registered plugin store backend '{name}'");
        self.plugins.insert(name, factory);
    }

    /// Build, connect, and health-check a backend.
    ///
    /// # Errors
    ///
    /// Returns an error if construction fails, the backend is unreachable,
    /// the health check fails, or a plugin name is unknown.
    pub async fn create(&self, config: &StoreBackendConfig) -> AppResult<Arc<dyn KeyValueStore>> {
        let store: Arc<dyn KeyValueStore> = match config {
            StoreBackendConfig::Memory { max_entries } => {
                info!("Initializing in-memory store (max entries: {max_entries})");
                Arc::new(MemoryStore::new(*max_entries))
            }
            StoreBackendConfig::Redis {
                connection,
                at_rest_key,
            } => {
                let cipher = Self::at_rest_cipher(at_rest_key.as_deref())?;
                Arc::new(RedisStore::connect_with_config(connection, cipher).await?)
            }
            StoreBackendConfig::DualLayer {
                max_entries,
                connection,
                at_rest_key,
                repopulation_ttl_secs,
            } => {
                let cipher = Self::at_rest_cipher(at_rest_key.as_deref())?;
                let persistent: Arc<dyn KeyValueStore> =
                    Arc::new(RedisStore::connect_with_config(connection, cipher).await?);
                let memory: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(*max_entries));
                info!("Initializing dual-layer store (memory max entries: {max_entries})");
                Arc::new(DualLayerStore::new(
                    memory,
                    persistent,
                    Duration::from_secs(*repopulation_ttl_secs),
                ))
            }
            StoreBackendConfig::Plugin { name } => {
                let factory = self.plugins.get(name).ok_or_else(|| {
                    AppError::config(format!(
                        "Unknown store backend '{name}'; registered plugins: [{}]",
                        self.plugins
                            .keys()
                            .map(String::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                })?;
                factory()?
            }
        };

        store.connect().await?;

        if !store.health_check().await {
            return Err(AppError::config(
                "Store backend failed startup health check; refusing to serve traffic",
            ));
        }

        Ok(store)
    }

    fn at_rest_cipher(at_rest_key: Option<&str>) -> AppResult<Option<SecretCipher>> {
        at_rest_key.map(SecretCipher::from_base64).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_passes_startup_gate() {
        let factory = StoreFactory::new();
        let store = factory
            .create(&StoreBackendConfig::Memory { max_entries: 8 })
            .await
            .unwrap();
        assert!(store.health_check().await);
    }

    #[tokio::test]
    async fn unknown_plugin_is_a_descriptive_config_error() {
        let mut factory = StoreFactory::new();
        factory.register_plugin("etcd", Arc::new(|| Ok(Arc::new(MemoryStore::new(8)) as _)));

        let err = factory
            .create(&StoreBackendConfig::Plugin {
                name: "consul".into(),
            })
            .await
            .unwrap_err();

        assert!(err.message.contains("consul"));
        assert!(err.message.contains("etcd"));
    }

    #[tokio::test]
    async fn registered_plugin_is_constructed_and_checked() {
        let mut factory = StoreFactory::new();
        factory.register_plugin("etcd", Arc::new(|| Ok(Arc::new(MemoryStore::new(8)) as _)));

        let store = factory
            .create(&StoreBackendConfig::Plugin {
                name: "etcd".into(),
            })
            .await
            .unwrap();
        assert!(store.health_check().await);
    }
}
