//! Worker-local segment tables.
//!
//! Primary and replica copies live in separate tables keyed by `SegmentKey`.
//! Compute output goes to a third table under the derived `<arrayId>_result` key.

use crate::array::{SegmentData, SegmentKey, SegmentRole};
use crate::error::{ClusterError, Result};

use dashmap::DashMap;

#[derive(Default)]
pub struct SegmentStore {
    primaries: DashMap<SegmentKey, SegmentData>,
    replicas: DashMap<SegmentKey, SegmentData>,
    results: DashMap<SegmentKey, SegmentData>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` for `key` under `role`, replacing any earlier copy.
    /// Redelivery of the same segment is harmless.
    pub fn put(&self, role: SegmentRole, key: SegmentKey, data: SegmentData) {
        let len = data.len();
        match role {
            SegmentRole::Primary => {
                self.primaries.insert(key.clone(), data);
            }
            SegmentRole::Replica => {
                self.replicas.insert(key.clone(), data);
            }
        }
        tracing::info!("Stored {:?} segment {} ({} elements)", role, key, len);
    }

    /// Moves the replica copy of `key` into the primary table.
    ///
    /// A missing replica means the coordinator promoted a worker it never
    /// replicated to.
    pub fn promote(&self, key: &SegmentKey) -> Result<()> {
        let (key, data) = self.replicas.remove(key).ok_or_else(|| {
            ClusterError::ProtocolViolation(format!("no local replica of segment {}", key))
        })?;

        tracing::info!("Promoted replica {} to primary", key);
        self.primaries.insert(key, data);
        Ok(())
    }

    pub fn primary(&self, key: &SegmentKey) -> Option<SegmentData> {
        self.primaries.get(key).map(|entry| entry.value().clone())
    }

    pub fn replica(&self, key: &SegmentKey) -> Option<SegmentData> {
        self.replicas.get(key).map(|entry| entry.value().clone())
    }

    /// Primary segment keys held for `array_id`, ordered by start index.
    pub fn primary_keys_for(&self, array_id: &str) -> Vec<SegmentKey> {
        let mut keys: Vec<SegmentKey> = self
            .primaries
            .iter()
            .filter(|entry| entry.key().array_id == array_id)
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn store_result(&self, key: &SegmentKey, data: SegmentData) {
        self.results.insert(key.result_key(), data);
    }

    /// Output of the last successful compute over `key`.
    pub fn result(&self, key: &SegmentKey) -> Option<SegmentData> {
        self.results
            .get(&key.result_key())
            .map(|entry| entry.value().clone())
    }

    pub fn primary_count(&self) -> usize {
        self.primaries.len()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }
}
