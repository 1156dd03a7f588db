use super::index::ReverseIndex;
use super::placement::{PlacementEngine, to_worker};
use super::registry::WorkerRegistry;
use super::results::{ResultTracker, ResultView};
use super::types::{ArrayPlacement, DistributedArray, WorkerCapability, WorkerId, WorkerSummary};
use crate::array::{SegmentKey, plan_segments};
use crate::config::CoordinatorConfig;
use crate::error::{ClusterError, Result};
use crate::protocol::{
    ApplyOperation, Body, CreateArray, Message, OperationComplete, ProcessSegment, RecoveryStatus,
    RegisterWorker, ResponseStatus, SegmentStatus,
};
use crate::worker::TransformRegistry;

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Coordinator state shared by every connection task and the health monitor.
///
/// Reads go straight to the maps. Every mutation of placement (creating an
/// array, applying an operation, recovering a worker) runs under `writer`, so
/// array segment lists and the reverse index change in one place at a time.
pub struct Coordinator {
    pub(super) config: CoordinatorConfig,
    pub(super) registry: WorkerRegistry,
    pub(super) arrays: DashMap<String, DistributedArray>,
    pub(super) index: ReverseIndex,
    pub(super) results: ResultTracker,
    pub(super) placement: PlacementEngine,
    pub(super) transforms: Arc<TransformRegistry>,
    pub(super) writer: Mutex<()>,
    pub(super) shutdown: CancellationToken,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Arc<Self> {
        let placement = PlacementEngine::new(config.replication_factor);
        Arc::new(Self {
            config,
            registry: WorkerRegistry::new(),
            arrays: DashMap::new(),
            index: ReverseIndex::new(),
            results: ResultTracker::new(),
            placement,
            transforms: TransformRegistry::with_builtins(),
            writer: Mutex::new(()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn index(&self) -> &ReverseIndex {
        &self.index
    }

    pub fn results(&self) -> &ResultTracker {
        &self.results
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn array(&self, array_id: &str) -> Option<DistributedArray> {
        self.arrays.get(array_id).map(|entry| entry.value().clone())
    }

    // ============================================================
    // WORKER SESSIONS
    // ============================================================

    /// Adds a worker session. The returned token is cancelled when the worker
    /// is failed and removed, or when the coordinator shuts down.
    pub fn register_worker(
        &self,
        id: WorkerId,
        registration: RegisterWorker,
        transport: UnboundedSender<Message>,
    ) -> Result<CancellationToken> {
        if self.is_shutting_down() {
            return Err(ClusterError::ProtocolViolation(format!(
                "coordinator is shutting down, cannot register {}",
                id
            )));
        }

        let capability = WorkerCapability {
            cores: registration.cores,
            memory_mb: registration.memory_mb,
        };
        let session = self.shutdown.child_token();
        self.registry.register(id, capability, transport, session.clone())?;
        Ok(session)
    }

    /// Handles one frame from a registered worker. Any frame counts as a
    /// heartbeat.
    pub async fn handle_worker_message(&self, id: &WorkerId, msg: Message) {
        self.registry.touch(id);

        match msg.body {
            Body::Heartbeat => {
                tracing::debug!("Heartbeat from {}", id);
            }

            Body::SegmentResult(result) => {
                match result.status {
                    SegmentStatus::Completed => tracing::info!(
                        "Worker {} completed '{}' on {}",
                        id,
                        result.operation,
                        result.key()
                    ),
                    SegmentStatus::Failed => tracing::warn!(
                        "Worker {} failed '{}' on {}: {}",
                        id,
                        result.operation,
                        result.key(),
                        result.error.as_deref().unwrap_or("unknown error")
                    ),
                }
                if !self.results.record(&result) {
                    tracing::debug!("Ignoring stale result for {} from {}", result.key(), id);
                }
            }

            Body::RecoveryComplete(done) => match done.status {
                RecoveryStatus::Recovered => tracing::info!(
                    "Worker {} now serves {}_{} as primary",
                    id,
                    done.array_id,
                    done.segment_id
                ),
                RecoveryStatus::Failed => {
                    tracing::error!(
                        "Worker {} could not promote {}_{}: no local replica",
                        id,
                        done.array_id,
                        done.segment_id
                    );
                    let key = SegmentKey::new(done.array_id, done.segment_id);
                    self.reseed_primary(id, &key).await;
                }
            },

            other => {
                let err = ClusterError::ProtocolViolation(format!(
                    "unexpected {} from worker {}",
                    other.type_name(),
                    id
                ));
                tracing::warn!("{}", err);
            }
        }
    }

    // ============================================================
    // CLIENT REQUESTS
    // ============================================================

    /// Answers one client request. Errors become an `error` response.
    pub async fn handle_client_request(&self, msg: Message) -> OperationComplete {
        let from = msg.from.clone();
        let outcome = match msg.body {
            Body::CreateArray(request) => self.create_array(request).await,
            Body::ApplyOperation(request) => self.apply_operation(request).await,
            Body::GetResult(request) => self.get_result(&request.array_id),
            other => Err(ClusterError::ProtocolViolation(format!(
                "{} is not a client request",
                other.type_name()
            ))),
        };

        outcome.unwrap_or_else(|e| {
            tracing::warn!("Request from {} failed: {}", from, e);
            OperationComplete::error(&e)
        })
    }

    pub async fn create_array(&self, request: CreateArray) -> Result<OperationComplete> {
        let CreateArray { array_id, values } = request;
        if array_id.trim().is_empty() {
            return Err(ClusterError::InvalidInput("array id must not be empty".to_string()));
        }

        let _guard = self.writer.lock().await;

        if self.arrays.contains_key(&array_id) {
            return Err(ClusterError::InvalidInput(format!(
                "array {} already exists",
                array_id
            )));
        }

        let live = self.registry.live_workers();
        if live.is_empty() {
            return Err(ClusterError::NoWorkersAvailable);
        }

        let ranges = plan_segments(values.len(), live.len())?;
        let mut array = DistributedArray::new(array_id.clone(), values, &ranges);
        let report = self
            .placement
            .distribute(&mut array, &live, &self.registry, &self.index)?;

        tracing::info!(
            "Created array {} ({} {} elements) in {} segments over {} workers, {} replicas",
            array_id,
            array.total_size,
            array.element_kind,
            report.segments,
            live.len(),
            report.replicas
        );

        let mut response = OperationComplete::new(ResponseStatus::Created, array_id.clone());
        response.total = Some(array.segments.len());
        self.arrays.insert(array_id, array);
        Ok(response)
    }

    /// Broadcasts `operation` to every primary holder of the array and
    /// answers `processing` without waiting for results.
    pub async fn apply_operation(&self, request: ApplyOperation) -> Result<OperationComplete> {
        let ApplyOperation {
            array_id,
            operation,
        } = request;
        self.transforms.get(&operation)?;

        let _guard = self.writer.lock().await;

        let (element_kind, starts, primaries) = {
            let array = self
                .arrays
                .get(&array_id)
                .ok_or_else(|| ClusterError::UnknownArray(array_id.clone()))?;

            if let Some(segment) = array.unavailable_segment() {
                return Err(ClusterError::SegmentUnavailable {
                    array_id: array_id.clone(),
                    start_index: segment.start_index,
                });
            }

            let starts: Vec<usize> = array.segments.iter().map(|s| s.start_index).collect();
            let primaries: BTreeSet<WorkerId> = array
                .segments
                .iter()
                .filter_map(|s| s.primary.clone())
                .collect();
            (array.element_kind, starts, primaries)
        };

        let total = starts.len();
        self.results
            .begin(&array_id, &operation, element_kind, starts);

        for worker in &primaries {
            let body = Body::ProcessSegment(ProcessSegment {
                array_id: array_id.clone(),
                operation: operation.clone(),
                segment_id: None,
            });
            // A lost primary is picked up by recovery, which re-issues the
            // pending segments to the promoted replica.
            if let Err(e) = self.registry.send(worker, to_worker(body, worker)) {
                tracing::warn!("Could not send '{}' to {}: {}", operation, worker, e);
            }
        }

        tracing::info!(
            "Applying '{}' to {} on {} workers",
            operation,
            array_id,
            primaries.len()
        );

        let mut response = OperationComplete::new(ResponseStatus::Processing, array_id);
        response.operation = Some(operation);
        response.completed = Some(0);
        response.total = Some(total);
        Ok(response)
    }

    /// Last-known status of the array's most recent operation.
    pub fn get_result(&self, array_id: &str) -> Result<OperationComplete> {
        if !self.arrays.contains_key(array_id) {
            return Err(ClusterError::UnknownArray(array_id.to_string()));
        }

        let response = match self.results.view(array_id) {
            ResultView::Idle => OperationComplete::new(ResponseStatus::Idle, array_id),
            ResultView::Processing {
                operation,
                completed,
                total,
            } => {
                let mut response = OperationComplete::new(ResponseStatus::Processing, array_id);
                response.operation = Some(operation);
                response.completed = Some(completed);
                response.total = Some(total);
                response
            }
            ResultView::Complete { operation, data } => {
                let mut response = OperationComplete::new(ResponseStatus::Complete, array_id);
                response.operation = Some(operation);
                response.result = Some(data);
                response
            }
            ResultView::Failed { operation, error } => {
                let mut response = OperationComplete::new(ResponseStatus::Failed, array_id);
                response.operation = Some(operation);
                response.error = Some(error);
                response
            }
        };
        Ok(response)
    }

    // ============================================================
    // LIFECYCLE AND ADMIN
    // ============================================================

    /// Tells every live worker to stop, then stops the listener and the
    /// health monitor.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let live = self.registry.live_workers();
        for worker in &live {
            if let Err(e) = self.registry.send(worker, to_worker(Body::Shutdown, worker)) {
                tracing::warn!("Could not send shutdown to {}: {}", worker, e);
            }
        }
        tracing::info!("Coordinator shutting down ({} workers notified)", live.len());
        self.shutdown.cancel();
    }

    pub fn worker_summaries(&self) -> Vec<WorkerSummary> {
        let now = Instant::now();
        self.registry
            .snapshot()
            .into_iter()
            .map(|(id, capability, alive, last_heartbeat)| WorkerSummary {
                primaries: self.index.primary_count(&id),
                replicas: self.index.replica_count(&id),
                alive,
                cores: capability.cores,
                memory_mb: capability.memory_mb,
                last_heartbeat_ms_ago: now.saturating_duration_since(last_heartbeat).as_millis()
                    as u64,
                id,
            })
            .collect()
    }

    pub fn placement(&self, array_id: &str) -> Option<ArrayPlacement> {
        self.arrays.get(array_id).map(|array| array.placement())
    }
}
