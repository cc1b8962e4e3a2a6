//! Graph store abstraction
//!
//! All writes are keyed upserts: a missed write means the sink value is
//! one cycle stale, never wrong, so failures are recoverable by design.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Graph store errors
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("store returned HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("query rejected: {0}")]
    Query(String),
}

/// One host node upsert, keyed by `address`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostUpsert {
    /// Merge key: `"<ip>:<port>"`.
    pub address: String,
    pub ip: String,
    pub port: u16,
    /// Current existence probability in `[0, 1]`.
    pub likelihood: f64,
}

/// One directed CONNECTED relationship upsert between two host nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionUpsert {
    pub source: HostUpsert,
    pub destination: HostUpsert,
    /// Current existence probability of the connection in `[0, 1]`.
    pub likelihood: f64,
}

/// Keyed upsert sink for belief snapshots
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Check that the store is reachable. Issued at startup; failure there
    /// is fatal.
    async fn ping(&self) -> Result<(), GraphError>;

    /// Remove every node and relationship.
    async fn clear(&self) -> Result<(), GraphError>;

    /// Upsert both endpoint hosts and the relationship between them.
    async fn upsert_connection(&self, upsert: &ConnectionUpsert) -> Result<(), GraphError>;
}

/// Thread-safe reference to a graph store
pub type SharedGraphStore = Arc<dyn GraphStore>;
