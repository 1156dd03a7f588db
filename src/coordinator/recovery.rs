//! Recovery Coordinator
//!
//! Repairs placement after a worker dies. For each segment the failed worker
//! held as primary, the first live replica is promoted and a new replica is
//! pushed to restore the replication target. Segments it held only as a
//! replica get a replacement replica. The failed worker then leaves the
//! registry and the reverse index.
//!
//! Promotion and re-replication are independent: a segment that is promoted
//! stays promoted even if no new replica can be placed. Removing the worker
//! from the registry also ends its session, so a worker dropped for a stale
//! heartbeat is disconnected rather than left talking to nobody.

use super::placement::{segment_payload, to_worker};
use super::service::Coordinator;
use super::types::{DistributedArray, WorkerId};
use crate::array::SegmentKey;
use crate::protocol::{Body, ProcessSegment, RecoverData};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub promoted: Vec<(SegmentKey, WorkerId)>,
    pub unrecoverable: Vec<SegmentKey>,
    pub replicas_placed: usize,
    pub under_replicated: Vec<SegmentKey>,
}

impl Coordinator {
    /// Single entry point for both failure signals (stale heartbeat and lost
    /// connection). Only the first signal for a worker runs recovery.
    pub async fn fail_worker(&self, id: &WorkerId, reason: &str) -> Option<RecoveryReport> {
        if self.is_shutting_down() {
            tracing::debug!("Ignoring failure of {} during shutdown", id);
            return None;
        }
        if !self.registry.mark_dead(id) {
            return None;
        }
        tracing::warn!("Worker {} marked dead: {}", id, reason);

        let _guard = self.writer.lock().await;
        let report = self.recover_worker(id);

        tracing::info!(
            "Recovery of {} done: {} promoted, {} unrecoverable, {} new replicas, {} short",
            id,
            report.promoted.len(),
            report.unrecoverable.len(),
            report.replicas_placed,
            report.under_replicated.len()
        );
        Some(report)
    }

    /// Reassigns everything `failed` hosted. Caller holds the writer lock.
    fn recover_worker(&self, failed: &WorkerId) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        for key in self.index.primaries_of(failed) {
            self.index.remove_primary(failed, &key);
            self.recover_primary(failed, &key, &mut report);
        }

        for key in self.index.replicas_of(failed) {
            self.index.remove_replica(failed, &key);
            self.replace_replica(failed, &key, &mut report);
        }

        self.index.remove_worker(failed);
        self.registry.remove(failed);
        report
    }

    fn recover_primary(&self, failed: &WorkerId, key: &SegmentKey, report: &mut RecoveryReport) {
        let Some(mut array) = self.arrays.get_mut(&key.array_id) else {
            return;
        };
        let Some(pos) = array.position_of(key.start_index) else {
            return;
        };
        if !array.segments[pos].is_primary(failed) {
            return;
        }

        let candidates = array.segments[pos].replicas.clone();
        let promoted = candidates.into_iter().find(|candidate| {
            if !self.registry.is_alive(candidate) {
                return false;
            }
            let body = Body::RecoverData(RecoverData {
                array_id: key.array_id.clone(),
                segment_id: key.start_index,
                make_primary: true,
            });
            match self.registry.send(candidate, to_worker(body, candidate)) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Cannot promote {} on {}: {}", key, candidate, e);
                    false
                }
            }
        });

        let Some(new_primary) = promoted else {
            array.segments[pos].primary = None;
            self.results.mark_unavailable(&key.array_id, key.start_index);
            report.unrecoverable.push(key.clone());
            tracing::error!("Segment {} is unrecoverable: no live replica", key);
            return;
        };

        let segment = &mut array.segments[pos];
        segment.primary = Some(new_primary.clone());
        segment.replicas.retain(|replica| *replica != new_primary);
        self.index.remove_replica(&new_primary, key);
        self.index.add_primary(&new_primary, key.clone());
        tracing::info!("Promoted {} to primary of {}", new_primary, key);
        report.promoted.push((key.clone(), new_primary.clone()));

        self.restore_replicas(&mut array, pos, key, report);
        self.reissue_pending(key, &new_primary);
    }

    /// A promoted worker reported it had no replica to promote. The segment
    /// is pushed to it again from the coordinator's copy and any pending
    /// compute for it is re-issued.
    pub async fn reseed_primary(&self, worker: &WorkerId, key: &SegmentKey) {
        let _guard = self.writer.lock().await;

        let payload = {
            let Some(array) = self.arrays.get(&key.array_id) else {
                return;
            };
            let Some(pos) = array.position_of(key.start_index) else {
                return;
            };
            let segment = &array.segments[pos];
            if !segment.is_primary(worker) {
                return;
            }
            segment_payload(&array, segment, true)
        };

        // A failed send means the worker is going away; its recovery takes over.
        match self.registry.send(worker, to_worker(Body::DistributeArray(payload), worker)) {
            Ok(()) => {
                tracing::info!("Re-seeded primary {} on {}", key, worker);
                self.reissue_pending(key, worker);
            }
            Err(e) => tracing::warn!("Could not re-seed {} on {}: {}", key, worker, e),
        }
    }

    /// Sends the in-flight operation for `key` to `primary` if its result is
    /// still pending.
    fn reissue_pending(&self, key: &SegmentKey, primary: &WorkerId) {
        let Some(operation) = self.results.pending_operation(&key.array_id, key.start_index) else {
            return;
        };
        let body = Body::ProcessSegment(ProcessSegment {
            array_id: key.array_id.clone(),
            operation: operation.clone(),
            segment_id: Some(key.start_index),
        });
        match self.registry.send(primary, to_worker(body, primary)) {
            Ok(()) => tracing::info!("Re-issued '{}' for {} to {}", operation, key, primary),
            Err(e) => tracing::warn!("Could not re-issue '{}' for {}: {}", operation, key, e),
        }
    }

    fn replace_replica(&self, failed: &WorkerId, key: &SegmentKey, report: &mut RecoveryReport) {
        let Some(mut array) = self.arrays.get_mut(&key.array_id) else {
            return;
        };
        let Some(pos) = array.position_of(key.start_index) else {
            return;
        };

        array.segments[pos].replicas.retain(|replica| replica != failed);
        if array.segments[pos].primary.is_some() {
            self.restore_replicas(&mut array, pos, key, report);
        }
    }

    /// Pushes the segment to the first eligible live workers (in id order)
    /// until the replica target is met or no candidate is left.
    fn restore_replicas(
        &self,
        array: &mut DistributedArray,
        pos: usize,
        key: &SegmentKey,
        report: &mut RecoveryReport,
    ) {
        let target = self.placement.replica_target();

        for candidate in self.registry.live_workers() {
            let segment = &array.segments[pos];
            if segment.replicas.len() >= target {
                return;
            }
            if segment.is_primary(&candidate) || segment.has_replica(&candidate) {
                continue;
            }

            let payload = segment_payload(array, segment, false);
            match self
                .registry
                .send(&candidate, to_worker(Body::ReplicateData(payload), &candidate))
            {
                Ok(()) => {
                    array.segments[pos].replicas.push(candidate.clone());
                    self.index.add_replica(&candidate, key.clone());
                    report.replicas_placed += 1;
                    tracing::info!("Replicated {} to {}", key, candidate);
                }
                Err(e) => tracing::warn!("Replica of {} to {} failed: {}", key, candidate, e),
            }
        }

        if array.segments[pos].replicas.len() < target {
            tracing::warn!(
                "Segment {} under-replicated: {}/{} replicas",
                key,
                array.segments[pos].replicas.len(),
                target
            );
            report.under_replicated.push(key.clone());
        }
    }
}
