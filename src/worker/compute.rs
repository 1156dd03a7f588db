//! Parallel Compute Engine
//!
//! Splits a primary segment into contiguous chunks, runs the requested transform
//! on each chunk in the blocking pool, and joins the chunk outputs back in
//! order.
//!
//! ## Guarantees
//! - At most `units` chunks run at once across all concurrent calls.
//! - The joined output has the same length and order as the input.
//! - If any chunk fails (error or panic) the whole call fails and nothing is stored.

use super::store::SegmentStore;
use super::transforms::TransformRegistry;
use crate::array::{SegmentData, SegmentKey, plan_segments};
use crate::error::{ClusterError, Result};

use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct ComputeEngine {
    units: usize,
    transforms: Arc<TransformRegistry>,
    permits: Arc<Semaphore>,
}

impl ComputeEngine {
    pub fn new(units: usize, transforms: Arc<TransformRegistry>) -> Self {
        let units = units.max(1);
        Self {
            units,
            transforms,
            permits: Arc::new(Semaphore::new(units)),
        }
    }

    pub fn units(&self) -> usize {
        self.units
    }

    /// Runs `operation` over the local primaries of `array_id` (or only the one
    /// starting at `segment`) and stores each successful output.
    ///
    /// Fails with `NoLocalPrimary` when nothing matches. Otherwise every matched
    /// segment gets its own outcome.
    pub async fn apply(
        &self,
        store: &SegmentStore,
        operation: &str,
        array_id: &str,
        segment: Option<usize>,
    ) -> Result<Vec<(SegmentKey, Result<SegmentData>)>> {
        let keys: Vec<SegmentKey> = store
            .primary_keys_for(array_id)
            .into_iter()
            .filter(|key| segment.is_none_or(|start| key.start_index == start))
            .collect();

        if keys.is_empty() {
            return Err(ClusterError::NoLocalPrimary {
                array_id: array_id.to_string(),
            });
        }

        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            let outcome = self.apply_segment(store, operation, &key).await;
            outcomes.push((key, outcome));
        }
        Ok(outcomes)
    }

    /// Computes one primary segment and stores the output under its result key.
    pub async fn apply_segment(
        &self,
        store: &SegmentStore,
        operation: &str,
        key: &SegmentKey,
    ) -> Result<SegmentData> {
        let data = store
            .primary(key)
            .ok_or_else(|| ClusterError::NoLocalPrimary {
                array_id: key.array_id.clone(),
            })?;

        let output = self.run(operation, key, data).await?;

        store.store_result(key, output.clone());
        tracing::info!(
            "Completed '{}' over segment {} ({} elements)",
            operation,
            key,
            output.len()
        );
        Ok(output)
    }

    /// Runs `operation` over `data` (the contents of `key`) in
    /// `min(units, len)` parallel chunks.
    pub async fn run(
        &self,
        operation: &str,
        key: &SegmentKey,
        data: SegmentData,
    ) -> Result<SegmentData> {
        let transform = self.transforms.get(operation)?;
        let kind = transform.element_kind();
        let failed = |reason: String| ClusterError::ComputeFailed {
            array_id: key.array_id.clone(),
            reason,
        };

        if data.kind() != kind {
            return Err(failed(format!(
                "'{}' operates on {} elements, segment {} holds {}",
                operation,
                kind,
                key,
                data.kind()
            )));
        }
        if data.is_empty() {
            return Ok(SegmentData::empty(kind));
        }

        let data = Arc::new(data);
        let chunks = plan_segments(data.len(), self.units.min(data.len()))?;
        tracing::debug!("Running '{}' over {} in {} chunks", operation, key, chunks.len());

        let mut handles = Vec::with_capacity(chunks.len());
        for range in chunks {
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| failed(e.to_string()))?;
            let transform = transform.clone();
            let data = data.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                transform.apply(&data.slice(range))
            }));
        }

        // Every chunk is awaited so no blocking task outlives the call.
        let mut parts = Vec::with_capacity(handles.len());
        let mut failure = None;
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(part)) => parts.push(part),
                Ok(Err(e)) => {
                    failure.get_or_insert_with(|| format!("chunk {} failed: {}", index, e));
                }
                Err(e) => {
                    failure.get_or_insert_with(|| format!("chunk {} panicked: {}", index, e));
                }
            }
        }

        if let Some(reason) = failure {
            return Err(failed(reason));
        }
        SegmentData::concat(kind, parts)
    }
}
