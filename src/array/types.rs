use crate::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Int,
    Double,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Int => write!(f, "int"),
            ElementKind::Double => write!(f, "double"),
        }
    }
}

/// A run of array elements of one numeric kind.
///
/// On the wire this is two sibling fields: `elementKind` and `data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "elementKind", content = "data", rename_all = "lowercase")]
pub enum SegmentData {
    Int(Vec<i64>),
    Double(Vec<f64>),
}

impl SegmentData {
    pub fn empty(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Int => SegmentData::Int(Vec::new()),
            ElementKind::Double => SegmentData::Double(Vec::new()),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            SegmentData::Int(_) => ElementKind::Int,
            SegmentData::Double(_) => ElementKind::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SegmentData::Int(values) => values.len(),
            SegmentData::Double(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out `range`. Panics if the range is out of bounds, like slicing.
    pub fn slice(&self, range: Range<usize>) -> SegmentData {
        match self {
            SegmentData::Int(values) => SegmentData::Int(values[range].to_vec()),
            SegmentData::Double(values) => SegmentData::Double(values[range].to_vec()),
        }
    }

    /// Joins parts in order. All parts must share `kind`.
    pub fn concat(kind: ElementKind, parts: Vec<SegmentData>) -> Result<SegmentData> {
        let mut joined = SegmentData::empty(kind);
        for part in parts {
            match (&mut joined, part) {
                (SegmentData::Int(acc), SegmentData::Int(values)) => acc.extend(values),
                (SegmentData::Double(acc), SegmentData::Double(values)) => acc.extend(values),
                (_, other) => {
                    return Err(ClusterError::InvalidInput(format!(
                        "cannot join {} data into {} data",
                        other.kind(),
                        kind
                    )));
                }
            }
        }
        Ok(joined)
    }
}

/// Identity of a segment: the owning array plus the segment's start index.
///
/// The start index doubles as the `segmentId` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct SegmentKey {
    pub array_id: String,
    pub start_index: usize,
}

impl SegmentKey {
    pub fn new(array_id: impl Into<String>, start_index: usize) -> Self {
        Self {
            array_id: array_id.into(),
            start_index,
        }
    }

    /// Key under which the compute engine stores this segment's output.
    pub fn result_key(&self) -> SegmentKey {
        SegmentKey {
            array_id: format!("{}_result", self.array_id),
            start_index: self.start_index,
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.array_id, self.start_index)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SegmentRole {
    Primary,
    Replica,
}

impl SegmentRole {
    pub fn from_is_primary(is_primary: bool) -> Self {
        if is_primary {
            SegmentRole::Primary
        } else {
            SegmentRole::Replica
        }
    }
}
