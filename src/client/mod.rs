//! Request/Response Client
//!
//! Each call opens its own connection to the coordinator, sends one request
//! and reads the single `OPERATION_COMPLETE` answer.

pub mod command;

pub use command::Command;

use crate::array::SegmentData;
use crate::error::{ClusterError, Result};
use crate::protocol::{
    ApplyOperation, Body, COORDINATOR_ID, Connection, CreateArray, GetResult, Message,
    OperationComplete,
};

use rand::Rng;

pub struct ArrayClient {
    coordinator: String,
    client_id: String,
}

impl ArrayClient {
    pub fn new(coordinator: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.into(),
            client_id: format!("client-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }

    /// Sends `body` on a fresh connection and waits for the answer.
    pub async fn request(&self, body: Body) -> Result<OperationComplete> {
        let mut conn = Connection::connect(&self.coordinator).await?;
        conn.send(&Message::new(body, self.client_id.as_str(), COORDINATOR_ID))
            .await?;

        let reply = conn.recv().await?.ok_or_else(|| {
            ClusterError::connection_lost(&self.coordinator, "closed before answering")
        })?;

        match reply.body {
            Body::OperationComplete(response) => Ok(response),
            other => Err(ClusterError::ProtocolViolation(format!(
                "expected OPERATION_COMPLETE, got {}",
                other.type_name()
            ))),
        }
    }

    pub async fn create_array(
        &self,
        array_id: &str,
        values: SegmentData,
    ) -> Result<OperationComplete> {
        self.request(Body::CreateArray(CreateArray {
            array_id: array_id.to_string(),
            values,
        }))
        .await
    }

    /// Creates an array of `size` random integers in `[1, 1000]`.
    pub async fn create_int(&self, array_id: &str, size: usize) -> Result<OperationComplete> {
        self.create_array(array_id, random_ints(size)).await
    }

    /// Creates an array of `size` random doubles in `[1.0, 100.0)`.
    pub async fn create_double(&self, array_id: &str, size: usize) -> Result<OperationComplete> {
        self.create_array(array_id, random_doubles(size)).await
    }

    pub async fn apply(&self, array_id: &str, operation: &str) -> Result<OperationComplete> {
        self.request(Body::ApplyOperation(ApplyOperation {
            array_id: array_id.to_string(),
            operation: operation.to_string(),
        }))
        .await
    }

    pub async fn get(&self, array_id: &str) -> Result<OperationComplete> {
        self.request(Body::GetResult(GetResult {
            array_id: array_id.to_string(),
        }))
        .await
    }

    /// Runs one parsed command. `Help` and `Exit` are handled by the caller.
    pub async fn execute(&self, command: &Command) -> Result<Option<OperationComplete>> {
        let response = match command {
            Command::CreateInt { array_id, size } => self.create_int(array_id, *size).await?,
            Command::CreateDouble { array_id, size } => {
                self.create_double(array_id, *size).await?
            }
            Command::Apply {
                array_id,
                operation,
            } => self.apply(array_id, operation).await?,
            Command::Get { array_id } => self.get(array_id).await?,
            Command::Help | Command::Exit => return Ok(None),
        };
        Ok(Some(response))
    }
}

pub fn random_ints(size: usize) -> SegmentData {
    let mut rng = rand::thread_rng();
    SegmentData::Int((0..size).map(|_| rng.gen_range(1..=1000)).collect())
}

pub fn random_doubles(size: usize) -> SegmentData {
    let mut rng = rand::thread_rng();
    SegmentData::Double((0..size).map(|_| rng.gen_range(1.0..100.0)).collect())
}
