//! Cluster Error Taxonomy
//!
//! Every failure that crosses a module boundary is one of these variants.
//! Connection-level errors are translated into worker failures by the
//! coordinator; compute errors are reported back as failed segment results.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// Distribution attempted with an empty live worker set.
    #[error("no workers available for distribution")]
    NoWorkersAvailable,

    /// Every copy of a segment is gone.
    #[error("segment {start_index} of array {array_id} is unavailable")]
    SegmentUnavailable { array_id: String, start_index: usize },

    #[error("no local primary segment for array {array_id}")]
    NoLocalPrimary { array_id: String },

    #[error("compute failed for array {array_id}: {reason}")]
    ComputeFailed { array_id: String, reason: String },

    #[error("connection lost to {peer}: {reason}")]
    ConnectionLost { peer: String, reason: String },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unknown array: {0}")]
    UnknownArray(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("frame error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// Stable machine-readable code sent to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            ClusterError::NoWorkersAvailable => "NO_WORKERS_AVAILABLE",
            ClusterError::SegmentUnavailable { .. } => "SEGMENT_UNAVAILABLE",
            ClusterError::NoLocalPrimary { .. } => "NO_LOCAL_PRIMARY",
            ClusterError::ComputeFailed { .. } => "COMPUTE_FAILED",
            ClusterError::ConnectionLost { .. } => "CONNECTION_LOST",
            ClusterError::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            ClusterError::UnknownArray(_) => "UNKNOWN_ARRAY",
            ClusterError::UnknownOperation(_) => "UNKNOWN_OPERATION",
            ClusterError::InvalidInput(_) => "INVALID_INPUT",
            ClusterError::Codec(_) | ClusterError::Json(_) | ClusterError::Io(_) => "IO_ERROR",
        }
    }

    pub fn connection_lost(peer: impl Into<String>, reason: impl ToString) -> Self {
        ClusterError::ConnectionLost {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }
}
