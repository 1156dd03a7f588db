use crate::array::{SegmentData, SegmentKey};
use crate::error::ClusterError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sender/recipient name used by the coordinator.
pub const COORDINATOR_ID: &str = "coordinator";

/// A self-describing record: `{type, payload, from, to, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(flatten)]
    pub body: Body,
    pub from: String,
    pub to: String,
    /// Unix time in milliseconds at creation.
    pub timestamp: i64,
}

impl Message {
    pub fn new(body: Body, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            body,
            from: from.into(),
            to: to.into(),
            timestamp: now_ms(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.body.type_name()
    }
}

/// The typed payload of a message. `type` on the wire is the
/// SCREAMING_SNAKE_CASE variant name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Body {
    // --- to coordinator ---
    RegisterWorker(RegisterWorker),
    Heartbeat,
    CreateArray(CreateArray),
    ApplyOperation(ApplyOperation),
    GetResult(GetResult),
    SegmentResult(SegmentResult),
    RecoveryComplete(RecoveryComplete),

    // --- to worker ---
    DistributeArray(SegmentPayload),
    ReplicateData(SegmentPayload),
    RecoverData(RecoverData),
    ProcessSegment(ProcessSegment),
    Shutdown,

    // --- to client ---
    OperationComplete(OperationComplete),
}

impl Body {
    pub fn type_name(&self) -> &'static str {
        match self {
            Body::RegisterWorker(_) => "REGISTER_WORKER",
            Body::Heartbeat => "HEARTBEAT",
            Body::CreateArray(_) => "CREATE_ARRAY",
            Body::ApplyOperation(_) => "APPLY_OPERATION",
            Body::GetResult(_) => "GET_RESULT",
            Body::SegmentResult(_) => "SEGMENT_RESULT",
            Body::RecoveryComplete(_) => "RECOVERY_COMPLETE",
            Body::DistributeArray(_) => "DISTRIBUTE_ARRAY",
            Body::ReplicateData(_) => "REPLICATE_DATA",
            Body::RecoverData(_) => "RECOVER_DATA",
            Body::ProcessSegment(_) => "PROCESS_SEGMENT",
            Body::Shutdown => "SHUTDOWN",
            Body::OperationComplete(_) => "OPERATION_COMPLETE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterWorker {
    pub cores: usize,
    #[serde(rename = "memoryMB")]
    pub memory_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateArray {
    pub array_id: String,
    #[serde(flatten)]
    pub values: SegmentData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOperation {
    pub array_id: String,
    pub operation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GetResult {
    pub array_id: String,
}

/// Segment contents pushed to a worker, as primary or replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentPayload {
    pub array_id: String,
    pub segment_id: usize,
    pub start_index: usize,
    pub end_index: usize,
    #[serde(flatten)]
    pub data: SegmentData,
    pub is_primary: bool,
}

impl SegmentPayload {
    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.array_id.clone(), self.segment_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecoverData {
    pub array_id: String,
    pub segment_id: usize,
    pub make_primary: bool,
}

/// Run `operation` over the worker's primary segments of `array_id`.
/// With `segment_id` set, only that segment is computed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSegment {
    pub array_id: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentResult {
    pub array_id: String,
    pub segment_id: usize,
    pub operation: String,
    pub status: SegmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SegmentData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SegmentResult {
    pub fn completed(key: &SegmentKey, operation: &str, data: SegmentData) -> Self {
        Self {
            array_id: key.array_id.clone(),
            segment_id: key.start_index,
            operation: operation.to_string(),
            status: SegmentStatus::Completed,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(key: &SegmentKey, operation: &str, error: &ClusterError) -> Self {
        Self {
            array_id: key.array_id.clone(),
            segment_id: key.start_index,
            operation: operation.to_string(),
            status: SegmentStatus::Failed,
            data: None,
            error: Some(error.to_string()),
        }
    }

    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.array_id.clone(), self.segment_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStatus {
    Recovered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryComplete {
    pub array_id: String,
    pub segment_id: usize,
    pub status: RecoveryStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Created,
    Processing,
    Complete,
    Failed,
    Idle,
    Error,
}

/// The single response a client gets per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationComplete {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SegmentData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl OperationComplete {
    pub fn new(status: ResponseStatus, array_id: impl Into<String>) -> Self {
        Self {
            status,
            array_id: Some(array_id.into()),
            operation: None,
            completed: None,
            total: None,
            result: None,
            error: None,
            code: None,
        }
    }

    pub fn error(err: &ClusterError) -> Self {
        Self {
            status: ResponseStatus::Error,
            array_id: None,
            operation: None,
            completed: None,
            total: None,
            result: None,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
        }
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
