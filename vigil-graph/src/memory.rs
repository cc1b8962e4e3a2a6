//! In-memory graph store for tests and dry runs

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{ConnectionUpsert, GraphError, GraphStore, HostUpsert};

/// Graph store that keeps upserts in memory
///
/// Writes honor the same merge-by-endpoint-key semantics as the real
/// sink, so repeated upserts of the same connection keep one entry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    connections: Mutex<Vec<ConnectionUpsert>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (for exercising the recoverable
    /// sink-failure path).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every persisted connection.
    pub fn connections(&self) -> Vec<ConnectionUpsert> {
        self.connections.lock().clone()
    }

    /// Latest persisted state of a host, by address key.
    ///
    /// Upserts keep the most recently written connection last, so the
    /// reverse scan yields the freshest snapshot of a host that appears
    /// in several connections.
    pub fn host(&self, address: &str) -> Option<HostUpsert> {
        self.connections
            .lock()
            .iter()
            .rev()
            .flat_map(|c| [&c.source, &c.destination])
            .find(|h| h.address == address)
            .cloned()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn ping(&self) -> Result<(), GraphError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), GraphError> {
        self.connections.lock().clear();
        Ok(())
    }

    async fn upsert_connection(&self, upsert: &ConnectionUpsert) -> Result<(), GraphError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GraphError::Server {
                status: 503,
                message: "write failure injected".to_string(),
            });
        }

        // Merge by endpoint key; re-upserts move to the back so order
        // stays write recency.
        let mut connections = self.connections.lock();
        if let Some(pos) = connections.iter().position(|c| {
            c.source.address == upsert.source.address
                && c.destination.address == upsert.destination.address
        }) {
            connections.remove(pos);
        }
        connections.push(upsert.clone());
        Ok(())
    }
}
