//! Placement & Replication Engine
//!
//! Round-robin placement over a sorted snapshot of live workers. Segment `k`
//! goes to `live[k % n]` as primary and to `live[(k + r) % n]` for
//! `r in 1..replication_factor` as replicas, skipping the primary itself.
//!
//! A failed send never aborts the rest of the distribution. A failed replica
//! send leaves that segment under-replicated until the next recovery event.

use super::index::ReverseIndex;
use super::registry::WorkerRegistry;
use super::types::{DistributedArray, Segment, WorkerId};
use crate::error::{ClusterError, Result};
use crate::protocol::{Body, COORDINATOR_ID, Message, SegmentPayload};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlacementReport {
    pub segments: usize,
    pub replicas: usize,
    pub failed_sends: usize,
}

pub struct PlacementEngine {
    replication_factor: usize,
}

impl PlacementEngine {
    pub fn new(replication_factor: usize) -> Self {
        Self {
            replication_factor: replication_factor.max(1),
        }
    }

    /// Replica count each segment should carry.
    pub fn replica_target(&self) -> usize {
        self.replication_factor - 1
    }

    /// Assigns a primary and replicas to every segment of `array` and pushes
    /// the data out. `live` must be sorted.
    pub fn distribute(
        &self,
        array: &mut DistributedArray,
        live: &[WorkerId],
        registry: &WorkerRegistry,
        index: &ReverseIndex,
    ) -> Result<PlacementReport> {
        if live.is_empty() {
            return Err(ClusterError::NoWorkersAvailable);
        }

        let n = live.len();
        let mut report = PlacementReport::default();

        for w in 0..array.segments.len() {
            let primary = live[w % n].clone();
            let key = array.segment_key(&array.segments[w]);
            let payload = segment_payload(array, &array.segments[w], true);

            // The primary is recorded even when the send fails: the worker is
            // on its way out and recovery will promote a replica.
            let message = to_worker(Body::DistributeArray(payload), &primary);
            if let Err(e) = registry.send(&primary, message) {
                report.failed_sends += 1;
                tracing::error!("Failed to send primary {} to {}: {}", key, primary, e);
            }
            index.add_primary(&primary, key.clone());

            let mut replicas = Vec::new();
            for r in 1..self.replication_factor {
                let candidate = &live[(w + r) % n];
                if *candidate == primary || n <= 1 || replicas.contains(candidate) {
                    continue;
                }

                let payload = segment_payload(array, &array.segments[w], false);
                let message = to_worker(Body::DistributeArray(payload), candidate);
                match registry.send(candidate, message) {
                    Ok(()) => {
                        index.add_replica(candidate, key.clone());
                        replicas.push(candidate.clone());
                    }
                    Err(e) => {
                        report.failed_sends += 1;
                        tracing::warn!(
                            "Segment {} under-replicated, send to {} failed: {}",
                            key,
                            candidate,
                            e
                        );
                    }
                }
            }

            tracing::info!("Placed {} on {} (replicas: {:?})", key, primary, replicas);
            report.replicas += replicas.len();
            report.segments += 1;

            let segment = &mut array.segments[w];
            segment.primary = Some(primary);
            segment.replicas = replicas;
        }

        Ok(report)
    }
}

/// The data of `segment` addressed to one holder.
pub fn segment_payload(
    array: &DistributedArray,
    segment: &Segment,
    is_primary: bool,
) -> SegmentPayload {
    SegmentPayload {
        array_id: array.id.clone(),
        segment_id: segment.start_index,
        start_index: segment.start_index,
        end_index: segment.end_index,
        data: array.segment_data(segment),
        is_primary,
    }
}

pub fn to_worker(body: Body, worker: &WorkerId) -> Message {
    Message::new(body, COORDINATOR_ID, worker.as_str())
}
