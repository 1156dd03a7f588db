use super::compute::ComputeEngine;
use super::store::SegmentStore;
use super::transforms::TransformRegistry;
use crate::array::{SegmentKey, SegmentRole};
use crate::config::WorkerConfig;
use crate::error::{ClusterError, Result};
use crate::protocol::{
    Body, COORDINATOR_ID, Connection, Message, ProcessSegment, RecoverData, RecoveryComplete,
    RecoveryStatus, RegisterWorker, SegmentResult, spawn_writer,
};

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

pub struct WorkerNode {
    config: WorkerConfig,
    store: Arc<SegmentStore>,
    engine: Arc<ComputeEngine>,
    shutdown: CancellationToken,
}

impl WorkerNode {
    pub fn new(config: WorkerConfig) -> Arc<Self> {
        let engine = ComputeEngine::new(config.compute_units, TransformRegistry::with_builtins());
        Arc::new(Self {
            config,
            store: Arc::new(SegmentStore::new()),
            engine: Arc::new(engine),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.worker_id
    }

    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<ComputeEngine> {
        &self.engine
    }

    /// Ends `run`, which then closes the coordinator connection.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Connects to the coordinator, registers, and serves its instructions
    /// until the connection drops, a `SHUTDOWN` arrives, or `stop` is called.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let conn = Connection::connect(&self.config.coordinator_addr).await?;
        let (writer, mut reader) = conn.split();
        let (outbound, rx) = mpsc::unbounded_channel();
        let writer_handle = spawn_writer(writer, rx);

        let register = Body::RegisterWorker(RegisterWorker {
            cores: self.engine.units(),
            memory_mb: self.config.memory_mb,
        });
        outbound
            .send(self.message(register))
            .map_err(|e| ClusterError::connection_lost(reader.peer(), e))?;
        tracing::info!(
            "Worker {} registered with {} ({} compute units)",
            self.id(),
            reader.peer(),
            self.engine.units()
        );

        let heartbeat_handle = {
            let node = self.clone();
            let outbound = outbound.clone();
            tokio::spawn(async move {
                node.heartbeat_loop(outbound).await;
            })
        };

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Worker {} stopping", self.id());
                    break;
                }
                frame = reader.recv() => match frame {
                    Ok(Some(msg)) => self.handle_message(msg, &outbound),
                    Ok(None) => {
                        tracing::warn!("Coordinator closed the connection");
                        break;
                    }
                    Err(ClusterError::Json(e)) => {
                        tracing::warn!("Dropping malformed frame from coordinator: {}", e);
                    }
                    Err(e) => {
                        tracing::error!("Connection to coordinator failed: {}", e);
                        break;
                    }
                },
            }
        }

        self.shutdown.cancel();
        let _ = heartbeat_handle.await;
        drop(outbound);
        let _ = writer_handle.await;
        drop(reader);
        Ok(())
    }

    async fn heartbeat_loop(&self, outbound: UnboundedSender<Message>) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        // The first tick fires immediately and registration already counts.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if outbound.send(self.message(Body::Heartbeat)).is_err() {
                        break;
                    }
                    tracing::debug!("Sent heartbeat from {}", self.id());
                }
            }
        }
    }

    /// Applies one coordinator instruction. Compute runs on its own task and
    /// reports through `outbound` when done.
    pub fn handle_message(self: &Arc<Self>, msg: Message, outbound: &UnboundedSender<Message>) {
        tracing::debug!("Worker {} received {}", self.id(), msg.type_name());

        match msg.body {
            Body::DistributeArray(payload) => {
                let key = payload.key();
                let role = SegmentRole::from_is_primary(payload.is_primary);
                self.store.put(role, key, payload.data);
            }

            Body::ReplicateData(payload) => {
                let key = payload.key();
                self.store.put(SegmentRole::Replica, key, payload.data);
            }

            Body::RecoverData(request) => {
                let status = self.recover(&request);
                self.reply(
                    outbound,
                    Body::RecoveryComplete(RecoveryComplete {
                        array_id: request.array_id,
                        segment_id: request.segment_id,
                        status,
                    }),
                );
            }

            Body::ProcessSegment(request) => {
                let node = self.clone();
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    node.process(request, outbound).await;
                });
            }

            Body::Shutdown => {
                tracing::info!("Shutdown requested by {}", msg.from);
                self.stop();
            }

            other => {
                let err = ClusterError::ProtocolViolation(format!(
                    "worker cannot handle {}",
                    other.type_name()
                ));
                tracing::warn!("{}", err);
            }
        }
    }

    fn recover(&self, request: &RecoverData) -> RecoveryStatus {
        let key = SegmentKey::new(request.array_id.clone(), request.segment_id);

        if !request.make_primary {
            return match self.store.replica(&key) {
                Some(_) => RecoveryStatus::Recovered,
                None => RecoveryStatus::Failed,
            };
        }

        match self.store.promote(&key) {
            Ok(()) => RecoveryStatus::Recovered,
            Err(e) => {
                tracing::warn!("Cannot promote {}: {}", key, e);
                RecoveryStatus::Failed
            }
        }
    }

    async fn process(&self, request: ProcessSegment, outbound: UnboundedSender<Message>) {
        let ProcessSegment {
            array_id,
            operation,
            segment_id,
        } = request;

        let outcomes = match self
            .engine
            .apply(&self.store, &operation, &array_id, segment_id)
            .await
        {
            Ok(outcomes) => outcomes,
            Err(e) => {
                // An untargeted request only reaches workers holding primaries,
                // so there is no particular segment to report against.
                match segment_id {
                    Some(start) => {
                        let key = SegmentKey::new(array_id, start);
                        self.reply(
                            &outbound,
                            Body::SegmentResult(SegmentResult::failed(&key, &operation, &e)),
                        );
                    }
                    None => tracing::warn!("Nothing to compute on {}: {}", self.id(), e),
                }
                return;
            }
        };

        for (key, outcome) in outcomes {
            let result = match outcome {
                Ok(data) => SegmentResult::completed(&key, &operation, data),
                Err(e) => {
                    tracing::error!("'{}' failed on segment {}: {}", operation, key, e);
                    SegmentResult::failed(&key, &operation, &e)
                }
            };
            self.reply(&outbound, Body::SegmentResult(result));
        }
    }

    fn message(&self, body: Body) -> Message {
        Message::new(body, self.id(), COORDINATOR_ID)
    }

    fn reply(&self, outbound: &UnboundedSender<Message>, body: Body) {
        let msg = self.message(body);
        let kind = msg.type_name();
        if outbound.send(msg).is_err() {
            tracing::debug!("Dropped {}: connection is closing", kind);
        }
    }
}
