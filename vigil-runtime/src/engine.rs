//! Update scheduler engine
//!
//! The engine owns the belief registry and is the only task that mutates
//! it. Each cycle: take the accumulated evidence batch, route it, advance
//! every filter, then upsert the connection snapshot to the graph store.
//! Sink failures are logged and counted; in-memory belief has already
//! advanced and is never rolled back.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use ipnet::Ipv4Net;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use vigil_core::{BeliefRegistry, HostId, SharedQueue, DEFAULT_UPDATE_INTERVAL_SECS};
use vigil_graph::{ConnectionUpsert, GraphError, HostUpsert, SharedGraphStore};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// CIDR of the monitored network
    pub subnet: Ipv4Net,
    /// Belief update period
    pub interval: Duration,
    /// Concurrent in-flight graph upserts per cycle
    pub upsert_concurrency: usize,
    /// Stop after this many cycles (None = run until shutdown)
    pub max_cycles: Option<u64>,
}

impl EngineConfig {
    pub fn new(subnet: Ipv4Net) -> Self {
        Self {
            subnet,
            interval: Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS),
            upsert_concurrency: 8,
            max_cycles: None,
        }
    }
}

/// Fatal engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph store was unreachable (or could not be reset) at startup.
    #[error("graph store unavailable at startup: {0}")]
    Startup(#[source] GraphError),
}

/// Running totals, snapshotted for readers outside the scheduler
#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    pub cycles: u64,
    pub records_processed: u64,
    pub parse_failures: u64,
    pub filter_failures: u64,
    pub upserts: u64,
    pub upsert_failures: u64,
    pub hosts: usize,
    pub connections: usize,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// The update scheduler
pub struct Engine {
    config: EngineConfig,
    queue: SharedQueue,
    registry: BeliefRegistry,
    store: SharedGraphStore,
    status: Arc<RwLock<EngineStatus>>,
}

impl Engine {
    pub fn new(config: EngineConfig, queue: SharedQueue, store: SharedGraphStore) -> Self {
        Self {
            config,
            queue,
            registry: BeliefRegistry::new(),
            store,
            status: Arc::new(RwLock::new(EngineStatus::default())),
        }
    }

    /// Shared handle to the status snapshot.
    pub fn status_handle(&self) -> Arc<RwLock<EngineStatus>> {
        self.status.clone()
    }

    /// Startup checks: the store must be reachable before any traffic is
    /// served, and optionally gets wiped first. Failure here is fatal.
    pub async fn start(&self, reset_graph: bool) -> Result<(), EngineError> {
        self.store.ping().await.map_err(EngineError::Startup)?;
        if reset_graph {
            self.store.clear().await.map_err(EngineError::Startup)?;
            info!("graph store reset");
        }
        Ok(())
    }

    /// Run the scheduler until shutdown (or the configured cycle bound).
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval);
        info!(
            "update scheduler running every {:?}, monitoring {}",
            self.config.interval, self.config.subnet
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle().await;
                    if let Some(max) = self.config.max_cycles {
                        if self.status.read().cycles >= max {
                            info!("reached cycle bound ({max}), stopping");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("update scheduler stopped");
                        break;
                    }
                }
            }
        }
    }

    /// One scheduler cycle.
    async fn cycle(&mut self) {
        let batch = self.queue.take_all();
        let batch_len = batch.len();

        let batch_stats = self.registry.process_batch(batch, &self.config.subnet);
        if batch_stats.parse_failures > 0 {
            warn!("dropped {} malformed evidence records", batch_stats.parse_failures);
        }

        let update_stats = self.registry.update_all();
        for key in &update_stats.failed {
            error!("belief update degenerated for {key}");
        }

        let upserts = self.connection_upserts();
        let mut upsert_failures: u64 = 0;
        let results: Vec<Result<(), GraphError>> = stream::iter(&upserts)
            .map(|upsert| self.store.upsert_connection(upsert))
            .buffer_unordered(self.config.upsert_concurrency)
            .collect()
            .await;
        for result in results {
            if let Err(e) = result {
                warn!("graph upsert failed: {e}");
                upsert_failures += 1;
            }
        }

        let registry_stats = self.registry.stats();
        debug!(
            "registry: {}/{} hosts and {}/{} connections likely",
            registry_stats.likely_hosts,
            registry_stats.hosts,
            registry_stats.likely_connections,
            registry_stats.connections
        );

        let cycles = {
            let mut status = self.status.write();
            status.cycles += 1;
            status.records_processed += batch_stats.processed as u64;
            status.parse_failures += batch_stats.parse_failures as u64;
            status.filter_failures += update_stats.failed.len() as u64;
            status.upserts += (upserts.len() as u64).saturating_sub(upsert_failures);
            status.upsert_failures += upsert_failures;
            status.hosts = registry_stats.hosts;
            status.connections = registry_stats.connections;
            status.last_cycle_at = Some(Utc::now());
            status.cycles
        };

        info!(
            "cycle {cycles}: {batch_len} records ({} dropped), {} hosts, {} connections, {} upserts ({} failed)",
            batch_stats.parse_failures,
            registry_stats.hosts,
            registry_stats.connections,
            upserts.len(),
            upsert_failures
        );
    }

    /// Build the persistence snapshot: one upsert per tracked connection,
    /// carrying the current likelihood of both endpoint hosts.
    fn connection_upserts(&self) -> Vec<ConnectionUpsert> {
        self.registry
            .connections()
            .map(|(id, filter)| ConnectionUpsert {
                source: self.host_upsert(&id.source),
                destination: self.host_upsert(&id.destination),
                likelihood: filter.likelihood(),
            })
            .collect()
    }

    fn host_upsert(&self, id: &HostId) -> HostUpsert {
        HostUpsert {
            address: id.address(),
            ip: id.ip.to_string(),
            port: id.port,
            // Connections only exist between tracked hosts, so the lookup
            // succeeds; the fallback is the uninformed prior.
            likelihood: self.registry.host_likelihood(id).unwrap_or(0.5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::EvidenceQueue;
    use vigil_graph::MemoryStore;

    const TOLERANCE: f64 = 1e-9;

    fn test_engine(store: Arc<MemoryStore>) -> (Engine, SharedQueue) {
        let queue: SharedQueue = Arc::new(EvidenceQueue::new());
        let config = EngineConfig::new("10.0.0.0/24".parse().unwrap());
        let engine = Engine::new(config, queue.clone(), store);
        (engine, queue)
    }

    #[tokio::test]
    async fn test_cycle_routes_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, queue) = test_engine(store.clone());

        queue.push("1.2.3.4:80-10.0.0.5:22".to_string());
        engine.cycle().await;

        let connections = store.connections();
        assert_eq!(connections.len(), 1);

        // One evidence step from the prior: [0.875, 0.125].
        let connection = &connections[0];
        assert!((connection.likelihood - 0.875).abs() < TOLERANCE);
        assert_eq!(connection.source.address, "1.2.3.4:80");
        assert_eq!(connection.destination.address, "10.0.0.5:22");
        assert!((store.host("10.0.0.5:22").unwrap().likelihood - 0.875).abs() < TOLERANCE);

        let status = engine.status_handle().read().clone();
        assert_eq!(status.cycles, 1);
        assert_eq!(status.records_processed, 1);
        assert_eq!(status.upserts, 1);
    }

    #[tokio::test]
    async fn test_destination_outside_subnet_is_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, queue) = test_engine(store.clone());

        queue.push("1.2.3.4:80-9.9.9.9:22".to_string());
        engine.cycle().await;

        // The source host is tracked in memory, but with no connection
        // there is nothing to persist.
        assert!(store.connections().is_empty());
        let status = engine.status_handle().read().clone();
        assert_eq!(status.hosts, 1);
        assert_eq!(status.connections, 0);
    }

    #[tokio::test]
    async fn test_malformed_records_are_counted_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, queue) = test_engine(store.clone());

        queue.push("garbage".to_string());
        queue.push("1.2.3.4:80-10.0.0.5:22".to_string());
        engine.cycle().await;

        let status = engine.status_handle().read().clone();
        assert_eq!(status.parse_failures, 1);
        assert_eq!(status.records_processed, 1);
        assert_eq!(store.connections().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_block_the_next_cycle() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, queue) = test_engine(store.clone());

        queue.push("1.2.3.4:80-10.0.0.5:22".to_string());
        store.set_fail_writes(true);
        engine.cycle().await;

        assert_eq!(engine.status_handle().read().upsert_failures, 1);
        assert!(store.connections().is_empty());

        // Next cycle retries with fresh upserts; belief kept advancing.
        store.set_fail_writes(false);
        engine.cycle().await;

        let connections = store.connections();
        assert_eq!(connections.len(), 1);
        assert!(connections[0].likelihood < 0.875);
        assert_eq!(engine.status_handle().read().upserts, 1);
    }

    #[tokio::test]
    async fn test_silent_cycles_decay_persisted_likelihood() {
        let store = Arc::new(MemoryStore::new());
        let (mut engine, queue) = test_engine(store.clone());

        queue.push("1.2.3.4:80-10.0.0.5:22".to_string());
        engine.cycle().await;
        let after_evidence = store.connections()[0].likelihood;

        engine.cycle().await;
        let after_silence = store.connections()[0].likelihood;
        assert!(after_silence < after_evidence);
    }

    #[tokio::test]
    async fn test_run_honors_cycle_bound_and_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let queue: SharedQueue = Arc::new(EvidenceQueue::new());
        let mut config = EngineConfig::new("10.0.0.0/24".parse().unwrap());
        config.interval = Duration::from_millis(10);
        config.max_cycles = Some(3);
        let mut engine = Engine::new(config, queue, store);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        engine.run(shutdown_rx).await;

        assert_eq!(engine.status_handle().read().cycles, 3);
    }
}
