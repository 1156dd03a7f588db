//! Reverse index: worker → segments it hosts.
//!
//! Derived from the segment lists of the arrays, which stay the source of
//! truth. Recovery reads it to visit only the failed worker's segments.

use super::types::{DistributedArray, WorkerId};
use crate::array::SegmentKey;

use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
pub struct ReverseIndex {
    primaries: DashMap<WorkerId, BTreeSet<SegmentKey>>,
    replicas: DashMap<WorkerId, BTreeSet<SegmentKey>>,
}

/// Per-worker `(primaries, replicas)`, without empty entries.
pub type IndexSnapshot = BTreeMap<WorkerId, (BTreeSet<SegmentKey>, BTreeSet<SegmentKey>)>;

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes the index from the arrays' segment lists.
    pub fn rebuild<'a>(arrays: impl IntoIterator<Item = &'a DistributedArray>) -> Self {
        let index = Self::new();
        for array in arrays {
            for segment in &array.segments {
                let key = array.segment_key(segment);
                if let Some(primary) = &segment.primary {
                    index.add_primary(primary, key.clone());
                }
                for replica in &segment.replicas {
                    index.add_replica(replica, key.clone());
                }
            }
        }
        index
    }

    pub fn add_primary(&self, worker: &WorkerId, key: SegmentKey) {
        self.primaries.entry(worker.clone()).or_default().insert(key);
    }

    pub fn remove_primary(&self, worker: &WorkerId, key: &SegmentKey) {
        remove_from(&self.primaries, worker, key);
    }

    pub fn add_replica(&self, worker: &WorkerId, key: SegmentKey) {
        self.replicas.entry(worker.clone()).or_default().insert(key);
    }

    pub fn remove_replica(&self, worker: &WorkerId, key: &SegmentKey) {
        remove_from(&self.replicas, worker, key);
    }

    pub fn primaries_of(&self, worker: &WorkerId) -> Vec<SegmentKey> {
        collect(&self.primaries, worker)
    }

    pub fn replicas_of(&self, worker: &WorkerId) -> Vec<SegmentKey> {
        collect(&self.replicas, worker)
    }

    pub fn primary_count(&self, worker: &WorkerId) -> usize {
        self.primaries.get(worker).map_or(0, |keys| keys.len())
    }

    pub fn replica_count(&self, worker: &WorkerId) -> usize {
        self.replicas.get(worker).map_or(0, |keys| keys.len())
    }

    pub fn remove_worker(&self, worker: &WorkerId) {
        self.primaries.remove(worker);
        self.replicas.remove(worker);
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        let mut out = IndexSnapshot::new();
        for entry in self.primaries.iter().filter(|e| !e.value().is_empty()) {
            out.entry(entry.key().clone()).or_default().0 = entry.value().clone();
        }
        for entry in self.replicas.iter().filter(|e| !e.value().is_empty()) {
            out.entry(entry.key().clone()).or_default().1 = entry.value().clone();
        }
        out
    }
}

fn remove_from(
    map: &DashMap<WorkerId, BTreeSet<SegmentKey>>,
    worker: &WorkerId,
    key: &SegmentKey,
) {
    if let Some(mut keys) = map.get_mut(worker) {
        keys.remove(key);
    }
    map.remove_if(worker, |_, keys| keys.is_empty());
}

fn collect(map: &DashMap<WorkerId, BTreeSet<SegmentKey>>, worker: &WorkerId) -> Vec<SegmentKey> {
    map.get(worker)
        .map(|keys| keys.iter().cloned().collect())
        .unwrap_or_default()
}
