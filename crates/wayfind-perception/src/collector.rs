//! Rolling buffer of floor estimates.
//!
//! Sensor sources run independently (altitude watcher, network monitor,
//! motion integrator, QR scanner, the visitor) and report at their own rate.
//! [`EstimateCollector`] is a cheap-to-clone handle around one shared,
//! lock-protected queue: every clone appends to the same buffer, so a
//! producer thread can hold its own handle while the fusion tick prunes and
//! snapshots through another.
//!
//! Entries are evicted two ways:
//! - by age, when [`EstimateCollector::prune`] runs (once per fusion tick);
//! - by capacity, oldest first, when a burst outruns the tick.
//!
//! The collector never judges plausibility. A floor of 42 is stored like any
//! other; filtering is fusion-time policy.
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use wayfind_perception::EstimateCollector;
//! use wayfind_types::EstimateMethod;
//!
//! let collector = EstimateCollector::new(Duration::seconds(10), 64);
//! let producer = collector.clone();
//!
//! let t0 = Utc::now();
//! producer.report_at(EstimateMethod::Wifi, 2, 0.5, t0);
//! producer.report_at(EstimateMethod::Barometric, 2, 0.8, t0 + Duration::seconds(8));
//!
//! collector.prune(t0 + Duration::seconds(12));
//! assert_eq!(collector.len(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::trace;
use wayfind_types::{EstimateMethod, FloorEstimate};

/// Default upper bound on buffered estimates.
pub const DEFAULT_CAPACITY: usize = 256;

/// Shared, thread-safe estimate buffer. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct EstimateCollector {
    buffer: Arc<Mutex<VecDeque<FloorEstimate>>>,
    retention: Duration,
    capacity: usize,
}

impl EstimateCollector {
    /// Create a collector keeping estimates for `retention` and at most
    /// `capacity` entries (a capacity of zero is raised to one).
    pub fn new(retention: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            retention,
            capacity,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an estimate stamped with the current wall-clock time.
    pub fn report(&self, method: EstimateMethod, floor: i32, confidence: f64) {
        self.report_at(method, floor, confidence, Utc::now());
    }

    /// Record an estimate with an explicit timestamp.
    pub fn report_at(
        &self,
        method: EstimateMethod,
        floor: i32,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) {
        self.push(FloorEstimate::new(method, floor, confidence, timestamp));
    }

    /// Append a prepared estimate, evicting the oldest entry when full.
    pub fn push(&self, estimate: FloorEstimate) {
        let mut buffer = self.lock();
        while buffer.len() >= self.capacity {
            if let Some(evicted) = buffer.pop_front() {
                trace!(method = %evicted.method, floor = evicted.floor, "estimate evicted by capacity");
            }
        }
        buffer.push_back(estimate);
    }

    /// Drop every estimate whose timestamp is not strictly newer than
    /// `now - retention`. Returns the number of entries removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut buffer = self.lock();
        let before = buffer.len();
        buffer.retain(|e| e.timestamp > cutoff);
        before - buffer.len()
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<FloorEstimate> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A producer that panicked mid-push cannot leave the deque itself in a
    // torn state, so the data behind a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<FloorEstimate>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EstimateCollector {
    fn default() -> Self {
        Self::new(Duration::seconds(10), DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn prune_uses_strict_cutoff() {
        let c = EstimateCollector::new(Duration::seconds(10), 16);
        c.report_at(EstimateMethod::Wifi, 1, 0.5, t0());
        c.report_at(EstimateMethod::Wifi, 2, 0.5, t0() + Duration::milliseconds(1));

        // Exactly at the cutoff: the first entry is no longer "newer than".
        let removed = c.prune(t0() + Duration::seconds(10));
        assert_eq!(removed, 1);
        assert_eq!(c.snapshot()[0].floor, 2);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let c = EstimateCollector::new(Duration::seconds(10), 3);
        for floor in 0..5 {
            c.report_at(EstimateMethod::Barometric, floor, 0.8, t0());
        }
        let floors: Vec<_> = c.snapshot().iter().map(|e| e.floor).collect();
        assert_eq!(floors, vec![2, 3, 4]);
    }

    #[test]
    fn implausible_floors_are_stored() {
        let c = EstimateCollector::default();
        c.report_at(EstimateMethod::Other("light".into()), 42, 0.3, t0());
        assert_eq!(c.snapshot()[0].floor, 42);
    }

    #[test]
    fn clones_share_the_buffer() {
        let a = EstimateCollector::default();
        let b = a.clone();
        b.report(EstimateMethod::Manual, 1, 1.0);
        assert_eq!(a.len(), 1);
        a.clear();
        assert!(b.is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let c = EstimateCollector::new(Duration::seconds(60), 10_000);
        let handles: Vec<_> = (0..8)
            .map(|p| {
                let producer = c.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        producer.report_at(EstimateMethod::Wifi, p, 0.3, t0());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.len(), 2_000);
        let snapshot = c.snapshot();
        for p in 0..8 {
            assert_eq!(snapshot.iter().filter(|e| e.floor == p).count(), 250);
        }
    }
}
