// ABOUTME: MCP session lifecycle: persisted session records plus process-local transport handles
// ABOUTME: Records survive restarts through the store; live SSE senders never leave the process
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

//! A session has two halves with different lifetimes. The durable half,
//! `SessionRecord`, is what the `mcp-session-id` header resolves to and
//! lives in the key-value store so a restarted or horizontally-scaled
//! gateway still recognizes the id. The live half is the transport handle, a
//! broadcast sender feeding the session's event stream; handles are
//! process-local by nature and are simply absent after a restart, at which
//! point the client re-attaches and gets a fresh one.

use crate::constants::{key_prefixes, ttl};
use crate::errors::{AppError, AppResult};
use crate::store::typed::TypedStore;
use crate::store::KeyValueStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Buffered frames per session stream before slow receivers lag
const TRANSPORT_CHANNEL_CAPACITY: usize = 256;

/// Client identity supplied during MCP initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client implementation name
    pub name: String,
    /// Client implementation version
    pub version: String,
}

/// Durable session state, keyed by session id in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session identifier issued at initialization
    pub session_id: String,
    /// Client identity captured at initialization
    pub client_info: ClientInfo,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Typed façade over persisted session records
pub type SessionStore = TypedStore<SessionRecord>;

/// Frame pushed down a session's event stream
pub type TransportFrame = String;

/// Manages session records and their process-local transport channels
pub struct SessionManager {
    sessions: SessionStore,
    transports: DashMap<String, broadcast::Sender<TransportFrame>>,
}

impl SessionManager {
    /// Build a manager over the given store backend
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sessions: TypedStore::new(
                backend,
                key_prefixes::SESSION,
                Duration::from_secs(ttl::DEFAULT_SESSION_SECS),
            ),
            transports: DashMap::new(),
        }
    }

    /// Create a session for an initializing client and return its record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub async fn create_session(&self, client_info: ClientInfo) -> AppResult<SessionRecord> {
        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            client_info,
            created_at: Utc::now(),
        };

        self.sessions.set(&record.session_id, &record).await?;
        info!(session_id = %record.session_id, client = %record.client_info.name, "Session created");
        Ok(record)
    }

    /// Resolve a session id to its durable record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup fails; an unknown or expired id
    /// resolves to `None`.
    pub async fn get_session(&self, session_id: &str) -> AppResult<Option<SessionRecord>> {
        self.sessions.get(session_id).await
    }

    /// Attach (or re-attach) a transport to a session, returning a receiver
    /// for its event stream.
    ///
    /// Re-attaching after a restart is the expected path: the durable record
    /// still resolves, the old handle is gone, and a fresh channel is made.
    ///
    /// # Errors
    ///
    /// Returns an error if the session id does not resolve.
    pub async fn attach_transport(
        &self,
        session_id: &str,
    ) -> AppResult<broadcast::Receiver<TransportFrame>> {
        let Some(record) = self.get_session(session_id).await? else {
            // The record may have expired while a handle from an earlier
            // attach is still parked in the map.
            self.transports.remove(session_id);
            return Err(AppError::not_found(format!("Session {session_id}")));
        };

        let receiver = self
            .transports
            .entry(record.session_id)
            .or_insert_with(|| broadcast::channel(TRANSPORT_CHANNEL_CAPACITY).0)
            .subscribe();

        debug!(session_id = %session_id, "Transport attached");
        Ok(receiver)
    }

    /// Push a frame to a session's live stream. Returns `false` when no
    /// transport is attached in this process.
    pub fn send_frame(&self, session_id: &str, frame: TransportFrame) -> bool {
        self.transports
            .get(session_id)
            .is_some_and(|sender| sender.send(frame).is_ok())
    }

    /// Close a session: drop its transport handle and delete the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub async fn close_session(&self, session_id: &str) -> AppResult<bool> {
        self.transports.remove(session_id);
        let existed = self.sessions.delete(session_id).await?;
        if existed {
            info!(session_id = %session_id, "Session closed");
        }
        Ok(existed)
    }

    /// Drop transport handles whose session record has expired, returning
    /// how many were reclaimed.
    ///
    /// Records expire by TTL without anyone calling `close_session`, so a
    /// periodic sweep keeps the transport map from accumulating handles for
    /// clients that initialized and vanished.
    ///
    /// # Errors
    ///
    /// Returns an error if a store lookup fails; the sweep stops there and
    /// retries on the next interval.
    pub async fn reap_stale_transports(&self) -> AppResult<usize> {
        let session_ids: Vec<String> = self
            .transports
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = 0;
        for session_id in session_ids {
            if self.get_session(&session_id).await?.is_none() {
                self.transports.remove(&session_id);
                reaped += 1;
            }
        }

        if reaped > 0 {
            debug!(reaped, "Reclaimed transports for expired sessions");
        }
        Ok(reaped)
    }

    /// Number of sessions with a live transport in this process
    #[must_use]
    pub fn live_transport_count(&self) -> usize {
        self.transports.len()
    }
}
