//! Debounced occupancy state.
//!
//! Every processed frame runs one cycle in three phases: upsert the current
//! sightings, evict entries whose last sighting is at least one TTL old, then
//! build a read-only snapshot of what is left.

use crate::models::{Detection, SnapshotEntry, StableSnapshot};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(35);

#[derive(Debug, Clone)]
struct Entry {
    spot_id: String,
    last_seen: Instant,
}

/// Vehicle -> (spot, last seen) map owned by the worker thread.
#[derive(Debug)]
pub struct PersistenceTracker {
    ttl: Duration,
    entries: HashMap<String, Entry>,
}

impl PersistenceTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run one full cycle and return the resulting snapshot
    pub fn cycle(&mut self, detections: &[Detection], now: Instant) -> StableSnapshot {
        self.observe(detections, now);
        self.evict_stale(now);
        self.snapshot()
    }

    /// Upsert phase. A vehicle seen in two zones keeps the last one in
    /// iteration order.
    pub fn observe(&mut self, detections: &[Detection], now: Instant) {
        for detection in detections {
            let entry = Entry {
                spot_id: detection.spot_id.clone(),
                last_seen: now,
            };
            if let Some(previous) = self.entries.insert(detection.vehicle_id.clone(), entry) {
                if previous.spot_id != detection.spot_id {
                    debug!(
                        "Vehicle {} moved from {} to {}",
                        detection.vehicle_id, previous.spot_id, detection.spot_id
                    );
                }
            }
        }
    }

    /// Eviction phase. Returns the number of removed entries.
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|vehicle_id, entry| {
            let keep = now.saturating_duration_since(entry.last_seen) < ttl;
            if !keep {
                debug!("Vehicle {} expired from {}", vehicle_id, entry.spot_id);
            }
            keep
        });
        before - self.entries.len()
    }

    /// Snapshot phase
    pub fn snapshot(&self) -> StableSnapshot {
        StableSnapshot::new(
            self.entries
                .iter()
                .map(|(vehicle_id, entry)| SnapshotEntry::new(&entry.spot_id, vehicle_id))
                .collect(),
        )
    }
}

impl Default for PersistenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
