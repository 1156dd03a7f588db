//! Result Tracker
//!
//! Per array, the last operation issued and each segment's progress under it.
//! Fed by `SEGMENT_RESULT` frames and read by `GET_RESULT`, which never blocks.

use crate::array::{ElementKind, SegmentData};
use crate::protocol::{SegmentResult, SegmentStatus};

use dashmap::DashMap;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentProgress {
    Pending,
    Completed(SegmentData),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct OperationProgress {
    pub operation: String,
    pub element_kind: ElementKind,
    /// Keyed by segment start index.
    pub segments: BTreeMap<usize, SegmentProgress>,
}

/// What `GET_RESULT` reports for an array.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultView {
    Idle,
    Processing {
        operation: String,
        completed: usize,
        total: usize,
    },
    Complete {
        operation: String,
        data: SegmentData,
    },
    Failed {
        operation: String,
        error: String,
    },
}

#[derive(Default)]
pub struct ResultTracker {
    progress: DashMap<String, OperationProgress>,
}

impl ResultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `operation` over the given segments, replacing any
    /// earlier operation on the array.
    pub fn begin(
        &self,
        array_id: &str,
        operation: &str,
        element_kind: ElementKind,
        starts: impl IntoIterator<Item = usize>,
    ) {
        let segments = starts
            .into_iter()
            .map(|start| (start, SegmentProgress::Pending))
            .collect();
        self.progress.insert(
            array_id.to_string(),
            OperationProgress {
                operation: operation.to_string(),
                element_kind,
                segments,
            },
        );
    }

    /// Applies a worker report. Reports for another operation or an unknown
    /// segment are ignored and `false` is returned.
    pub fn record(&self, result: &SegmentResult) -> bool {
        let Some(mut progress) = self.progress.get_mut(&result.array_id) else {
            return false;
        };
        if progress.operation != result.operation {
            return false;
        }
        let Some(slot) = progress.segments.get_mut(&result.segment_id) else {
            return false;
        };

        *slot = match (result.status, &result.data) {
            (SegmentStatus::Completed, Some(data)) => SegmentProgress::Completed(data.clone()),
            (SegmentStatus::Completed, None) => {
                SegmentProgress::Failed("completed without result data".to_string())
            }
            (SegmentStatus::Failed, _) => SegmentProgress::Failed(
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| "segment failed".to_string()),
            ),
        };
        true
    }

    /// Fails a segment whose every copy is gone.
    pub fn mark_unavailable(&self, array_id: &str, start_index: usize) {
        if let Some(mut progress) = self.progress.get_mut(array_id)
            && let Some(slot) = progress.segments.get_mut(&start_index)
            && *slot == SegmentProgress::Pending
        {
            *slot = SegmentProgress::Failed(format!(
                "segment {} of array {} is unavailable",
                start_index, array_id
            ));
        }
    }

    /// The operation still owed for a segment, if its result is pending.
    pub fn pending_operation(&self, array_id: &str, start_index: usize) -> Option<String> {
        let progress = self.progress.get(array_id)?;
        match progress.segments.get(&start_index) {
            Some(SegmentProgress::Pending) => Some(progress.operation.clone()),
            _ => None,
        }
    }

    pub fn view(&self, array_id: &str) -> ResultView {
        let Some(progress) = self.progress.get(array_id) else {
            return ResultView::Idle;
        };
        let operation = progress.operation.clone();

        let failure = progress.segments.values().find_map(|slot| match slot {
            SegmentProgress::Failed(error) => Some(error.clone()),
            _ => None,
        });
        if let Some(error) = failure {
            return ResultView::Failed { operation, error };
        }

        let total = progress.segments.len();
        let parts: Vec<SegmentData> = progress
            .segments
            .values()
            .filter_map(|slot| match slot {
                SegmentProgress::Completed(data) => Some(data.clone()),
                _ => None,
            })
            .collect();

        if parts.len() < total {
            return ResultView::Processing {
                operation,
                completed: parts.len(),
                total,
            };
        }

        match SegmentData::concat(progress.element_kind, parts) {
            Ok(data) => ResultView::Complete { operation, data },
            Err(e) => ResultView::Failed {
                operation,
                error: e.to_string(),
            },
        }
    }
}
