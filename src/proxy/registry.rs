//! Registry of in-flight proxied reads.
//!
//! Each stream registers on start and unregisters when its guard drops.
//! [`StreamRegistry::cancel_all`] ends every stream, which drops its remote
//! reader and kills the remote process.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Entry {
    login: String,
    path: String,
    started: Instant,
    token: CancellationToken,
}

/// Snapshot of one active stream.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveStream {
    pub id: Uuid,
    pub login: String,
    pub path: String,
    pub elapsed_secs: u64,
}

#[derive(Default)]
pub struct StreamRegistry {
    streams: DashMap<Uuid, Entry>,
    root: CancellationToken,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream. It stays listed until the guard is dropped.
    pub fn register(self: &Arc<Self>, login: &str, path: &str) -> StreamGuard {
        let id = Uuid::new_v4();
        let token = self.root.child_token();
        self.streams.insert(
            id,
            Entry {
                login: login.to_string(),
                path: path.to_string(),
                started: Instant::now(),
                token: token.clone(),
            },
        );
        tracing::debug!(%id, login, path, "Stream registered");
        StreamGuard {
            registry: Arc::clone(self),
            id,
            token,
        }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn list(&self) -> Vec<ActiveStream> {
        self.streams
            .iter()
            .map(|e| ActiveStream {
                id: *e.key(),
                login: e.login.clone(),
                path: e.path.clone(),
                elapsed_secs: e.started.elapsed().as_secs(),
            })
            .collect()
    }

    /// Cancel every stream of one tenant. Returns how many were cancelled.
    pub fn cancel_tenant(&self, login: &str) -> usize {
        let mut n = 0;
        for entry in self.streams.iter().filter(|e| e.login == login) {
            entry.token.cancel();
            n += 1;
        }
        n
    }

    /// Cancel every stream, now and in the future.
    pub fn cancel_all(&self) {
        tracing::info!(active = self.streams.len(), "Cancelling all proxied streams");
        self.root.cancel();
    }
}

/// Keeps a stream registered. Dropping it unregisters the stream.
pub struct StreamGuard {
    registry: Arc<StreamRegistry>,
    id: Uuid,
    token: CancellationToken,
}

impl StreamGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.registry.streams.remove(&self.id);
        tracing::debug!(id = %self.id, "Stream unregistered");
    }
}
