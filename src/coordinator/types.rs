use crate::array::{ElementKind, SegmentData, SegmentKey};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Worker identity as announced in `REGISTER_WORKER.from`.
///
/// Ordered by the id string; placement walks workers in this order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCapability {
    pub cores: usize,
    #[serde(rename = "memoryMB")]
    pub memory_mb: u64,
}

/// Placement of one contiguous range `[start_index, end_index)`.
///
/// `primary` is `None` only once every copy of the segment is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start_index: usize,
    pub end_index: usize,
    pub primary: Option<WorkerId>,
    pub replicas: Vec<WorkerId>,
}

impl Segment {
    pub fn new(range: Range<usize>) -> Self {
        Self {
            start_index: range.start,
            end_index: range.end,
            primary: None,
            replicas: Vec::new(),
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start_index..self.end_index
    }

    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_primary(&self, worker: &WorkerId) -> bool {
        self.primary.as_ref() == Some(worker)
    }

    pub fn has_replica(&self, worker: &WorkerId) -> bool {
        self.replicas.contains(worker)
    }
}

/// An array owned by the coordinator. The coordinator keeps the full values so
/// it can re-replicate any segment after a failure.
#[derive(Debug, Clone)]
pub struct DistributedArray {
    pub id: String,
    pub element_kind: ElementKind,
    pub total_size: usize,
    pub values: SegmentData,
    pub segments: Vec<Segment>,
}

impl DistributedArray {
    pub fn new(id: impl Into<String>, values: SegmentData, ranges: &[Range<usize>]) -> Self {
        Self {
            id: id.into(),
            element_kind: values.kind(),
            total_size: values.len(),
            values,
            segments: ranges.iter().cloned().map(Segment::new).collect(),
        }
    }

    pub fn segment_key(&self, segment: &Segment) -> SegmentKey {
        SegmentKey::new(self.id.clone(), segment.start_index)
    }

    pub fn segment_data(&self, segment: &Segment) -> SegmentData {
        self.values.slice(segment.range())
    }

    pub fn position_of(&self, start_index: usize) -> Option<usize> {
        self.segments
            .binary_search_by_key(&start_index, |segment| segment.start_index)
            .ok()
    }

    /// First segment with no surviving copy, if any.
    pub fn unavailable_segment(&self) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.primary.is_none())
    }

    pub fn placement(&self) -> ArrayPlacement {
        ArrayPlacement {
            id: self.id.clone(),
            element_kind: self.element_kind,
            total_size: self.total_size,
            segments: self.segments.clone(),
        }
    }
}

// --- admin views ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub alive: bool,
    pub cores: usize,
    #[serde(rename = "memoryMB")]
    pub memory_mb: u64,
    pub primaries: usize,
    pub replicas: usize,
    pub last_heartbeat_ms_ago: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayPlacement {
    pub id: String,
    pub element_kind: ElementKind,
    pub total_size: usize,
    pub segments: Vec<Segment>,
}
