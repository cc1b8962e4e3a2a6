//! Shared evidence queue
//!
//! The only structure touched by more than one task: ingestion workers
//! append decoded payloads, the scheduler atomically takes the whole
//! batch once per cycle. Appends never block on belief-state work; the
//! mutex is held only for the push or the swap.

use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;

/// Append-only queue of decoded evidence records
#[derive(Debug, Default)]
pub struct EvidenceQueue {
    records: Mutex<Vec<String>>,
}

impl EvidenceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one decoded record (called from ingestion workers).
    pub fn push(&self, record: String) {
        self.records.lock().push(record);
    }

    /// Take every accumulated record, leaving the queue empty.
    ///
    /// The swap is atomic with respect to concurrent pushes: every record
    /// lands in exactly one batch.
    pub fn take_all(&self) -> Vec<String> {
        mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// Thread-safe handle shared between ingestion workers and the scheduler
pub type SharedQueue = Arc<EvidenceQueue>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_and_take_all() {
        let queue = EvidenceQueue::new();
        queue.push("a".to_string());
        queue.push("b".to_string());

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.take_all(), vec!["a".to_string(), "b".to_string()]);
        assert!(queue.is_empty());
        assert!(queue.take_all().is_empty());
    }

    #[test]
    fn test_concurrent_appends_land_in_one_batch() {
        const APPENDERS: usize = 8;
        const RECORDS_EACH: usize = 250;

        let queue: SharedQueue = Arc::new(EvidenceQueue::new());

        let handles: Vec<_> = (0..APPENDERS)
            .map(|worker| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..RECORDS_EACH {
                        queue.push(format!("{worker}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let batch = queue.take_all();
        assert_eq!(batch.len(), APPENDERS * RECORDS_EACH);

        // None duplicated, none lost.
        let unique: std::collections::HashSet<_> = batch.iter().collect();
        assert_eq!(unique.len(), APPENDERS * RECORDS_EACH);
        assert!(queue.take_all().is_empty());
    }
}
