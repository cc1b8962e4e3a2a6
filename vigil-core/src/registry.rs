//! Belief registry - lazily created filters and evidence routing
//!
//! The registry owns one filter per observed host and per observed
//! host-pair, routes each flow record under the perimeter-monitoring
//! policy, and advances every filter once per cycle. All mutation goes
//! through `&mut self`, so the scheduler task is the single writer by
//! construction.

use ipnet::Ipv4Net;
use std::collections::HashMap;

use crate::{BeliefFilter, ConnectionId, FlowRecord, HostId};

/// Mapping from identities to belief filters
#[derive(Debug, Default)]
pub struct BeliefRegistry {
    hosts: HashMap<HostId, BeliefFilter>,
    connections: HashMap<ConnectionId, BeliefFilter>,
}

impl BeliefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the filter for a host if absent. Idempotent.
    pub fn ensure_host(&mut self, id: &HostId) {
        self.hosts.entry(id.clone()).or_default();
    }

    /// Create the filter for a connection if absent. Idempotent.
    pub fn ensure_connection(&mut self, id: &ConnectionId) {
        self.connections.entry(id.clone()).or_default();
    }

    /// Mark evidence for a host. Returns false if no filter exists yet.
    pub fn mark_host_evidence(&mut self, id: &HostId) -> bool {
        if let Some(filter) = self.hosts.get_mut(id) {
            filter.add_evidence();
            true
        } else {
            false
        }
    }

    /// Mark evidence for a connection. Returns false if no filter exists yet.
    pub fn mark_connection_evidence(&mut self, id: &ConnectionId) -> bool {
        if let Some(filter) = self.connections.get_mut(id) {
            filter.add_evidence();
            true
        } else {
            false
        }
    }

    /// Route one batch of raw evidence records.
    ///
    /// The source host is always tracked: any host that talks is partially
    /// observed. The destination host and the connection are tracked only
    /// when the destination lies inside the monitored subnet. Records that
    /// do not parse are dropped and counted, never fatal.
    pub fn process_batch(&mut self, records: Vec<String>, subnet: &Ipv4Net) -> BatchStats {
        let mut stats = BatchStats::default();

        for record in records {
            let flow: FlowRecord = match record.parse() {
                Ok(flow) => flow,
                Err(_) => {
                    stats.parse_failures += 1;
                    continue;
                }
            };

            self.ensure_host(&flow.source);
            self.mark_host_evidence(&flow.source);

            if subnet.contains(&flow.destination.ip) {
                self.ensure_host(&flow.destination);
                self.mark_host_evidence(&flow.destination);

                let connection = flow.connection();
                self.ensure_connection(&connection);
                self.mark_connection_evidence(&connection);
            }

            stats.processed += 1;
        }

        stats
    }

    /// Advance every filter one step, hosts first, then connections.
    ///
    /// Filters that saw no evidence still decay. A degenerate update is
    /// recorded against the entity's key and the rest still advance.
    pub fn update_all(&mut self) -> UpdateStats {
        let mut stats = UpdateStats::default();

        for (id, filter) in &mut self.hosts {
            match filter.update() {
                Ok(()) => stats.updated += 1,
                Err(_) => stats.failed.push(id.to_string()),
            }
        }
        for (id, filter) in &mut self.connections {
            match filter.update() {
                Ok(()) => stats.updated += 1,
                Err(_) => stats.failed.push(id.to_string()),
            }
        }

        stats
    }

    /// Current existence likelihood of a host, if tracked.
    pub fn host_likelihood(&self, id: &HostId) -> Option<f64> {
        self.hosts.get(id).map(BeliefFilter::likelihood)
    }

    /// Current existence likelihood of a connection, if tracked.
    pub fn connection_likelihood(&self, id: &ConnectionId) -> Option<f64> {
        self.connections.get(id).map(BeliefFilter::likelihood)
    }

    pub fn hosts(&self) -> impl Iterator<Item = (&HostId, &BeliefFilter)> {
        self.hosts.iter()
    }

    pub fn connections(&self) -> impl Iterator<Item = (&ConnectionId, &BeliefFilter)> {
        self.connections.iter()
    }

    /// Registry statistics for the cycle summary.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            hosts: self.hosts.len(),
            connections: self.connections.len(),
            likely_hosts: count_likely(self.hosts.values()),
            likely_connections: count_likely(self.connections.values()),
        }
    }
}

fn count_likely<'a>(filters: impl Iterator<Item = &'a BeliefFilter>) -> usize {
    filters
        .filter(|f| f.likelihood() > crate::LIKELY_THRESHOLD)
        .count()
}

/// Result of routing one evidence batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: usize,
    pub parse_failures: usize,
}

/// Result of one whole-registry update step
#[derive(Debug, Clone, Default)]
pub struct UpdateStats {
    pub updated: usize,
    /// Display keys of entities whose update degenerated.
    pub failed: Vec<String>,
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub hosts: usize,
    pub connections: usize,
    pub likely_hosts: usize,
    pub likely_connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn subnet() -> Ipv4Net {
        "10.0.0.0/24".parse().unwrap()
    }

    fn host(s: &str) -> HostId {
        let flow: FlowRecord = format!("{s}-1.1.1.1:1").parse().unwrap();
        flow.source
    }

    #[test]
    fn test_ensure_host_is_idempotent() {
        let mut registry = BeliefRegistry::new();
        let id = host("1.2.3.4:80");

        registry.ensure_host(&id);
        registry.mark_host_evidence(&id);
        registry.ensure_host(&id);

        // One filter, with its marked evidence intact.
        assert_eq!(registry.stats().hosts, 1);
        let (_, filter) = registry.hosts().next().unwrap();
        assert!(filter.has_pending_evidence());
    }

    #[test]
    fn test_mark_evidence_requires_existing_filter() {
        let mut registry = BeliefRegistry::new();
        assert!(!registry.mark_host_evidence(&host("1.2.3.4:80")));
    }

    #[test]
    fn test_batch_tracks_monitored_destination() {
        let mut registry = BeliefRegistry::new();
        let stats = registry.process_batch(vec!["1.2.3.4:80-10.0.0.5:22".to_string()], &subnet());

        assert_eq!(stats, BatchStats { processed: 1, parse_failures: 0 });
        assert!(registry.host_likelihood(&host("1.2.3.4:80")).is_some());
        assert!(registry.host_likelihood(&host("10.0.0.5:22")).is_some());

        let connection = ConnectionId::new(host("1.2.3.4:80"), host("10.0.0.5:22"));
        assert!(registry.connection_likelihood(&connection).is_some());
        assert_eq!(registry.stats().connections, 1);
    }

    #[test]
    fn test_batch_only_tracks_source_outside_subnet() {
        let mut registry = BeliefRegistry::new();
        registry.process_batch(vec!["1.2.3.4:80-9.9.9.9:22".to_string()], &subnet());

        assert!(registry.host_likelihood(&host("1.2.3.4:80")).is_some());
        assert!(registry.host_likelihood(&host("9.9.9.9:22")).is_none());
        assert_eq!(registry.stats().hosts, 1);
        assert_eq!(registry.stats().connections, 0);
    }

    #[test]
    fn test_malformed_records_are_dropped_and_counted() {
        let mut registry = BeliefRegistry::new();
        let stats = registry.process_batch(
            vec![
                "not a flow".to_string(),
                "1.2.3.4:80-10.0.0.5:22".to_string(),
            ],
            &subnet(),
        );

        assert_eq!(stats, BatchStats { processed: 1, parse_failures: 1 });
        assert_eq!(registry.stats().hosts, 2);
    }

    #[test]
    fn test_update_advances_touched_and_untouched_filters() {
        let mut registry = BeliefRegistry::new();
        registry.process_batch(vec!["1.2.3.4:80-10.0.0.5:22".to_string()], &subnet());
        registry.update_all();

        // Both hosts and the connection saw evidence this cycle.
        let marked = registry.host_likelihood(&host("1.2.3.4:80")).unwrap();
        assert!((marked - 0.875).abs() < TOLERANCE);

        // Next cycle with no evidence: everything decays.
        let stats = registry.update_all();
        assert_eq!(stats.updated, 3);
        assert!(stats.failed.is_empty());
        let decayed = registry.host_likelihood(&host("1.2.3.4:80")).unwrap();
        assert!(decayed < marked);
    }
}
