//! Worker Registry
//!
//! Connected workers with their outbound transport, capability and liveness.
//! Entries are inserted by the accept path and flipped dead by the health
//! monitor or a dropped connection; recovery removes them, which also ends
//! the worker's session.

use super::types::{WorkerCapability, WorkerId};
use crate::error::{ClusterError, Result};
use crate::protocol::Message;

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

pub struct WorkerEntry {
    pub transport: UnboundedSender<Message>,
    pub capability: WorkerCapability,
    pub last_heartbeat: Instant,
    pub alive: bool,
    /// Cancelled when the entry leaves the registry.
    pub session: CancellationToken,
}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: DashMap<WorkerId, WorkerEntry>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a live worker. An id that is still present (alive, or dead and
    /// awaiting recovery) is rejected.
    pub fn register(
        &self,
        id: WorkerId,
        capability: WorkerCapability,
        transport: UnboundedSender<Message>,
        session: CancellationToken,
    ) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.workers.entry(id) {
            Entry::Occupied(existing) => Err(ClusterError::ProtocolViolation(format!(
                "worker {} is already registered",
                existing.key()
            ))),
            Entry::Vacant(slot) => {
                tracing::info!(
                    "Registered worker {} ({} cores, {} MB)",
                    slot.key(),
                    capability.cores,
                    capability.memory_mb
                );
                slot.insert(WorkerEntry {
                    transport,
                    capability,
                    last_heartbeat: Instant::now(),
                    alive: true,
                    session,
                });
                Ok(())
            }
        }
    }

    /// Refreshes the heartbeat of a live worker.
    pub fn touch(&self, id: &WorkerId) -> bool {
        match self.workers.get_mut(id) {
            Some(mut entry) if entry.alive => {
                entry.last_heartbeat = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Flips a worker to dead. Returns `true` only for the call that made the
    /// transition, so recovery runs once per failure.
    pub fn mark_dead(&self, id: &WorkerId) -> bool {
        match self.workers.get_mut(id) {
            Some(mut entry) if entry.alive => {
                entry.alive = false;
                true
            }
            _ => false,
        }
    }

    pub fn is_alive(&self, id: &WorkerId) -> bool {
        self.workers.get(id).is_some_and(|entry| entry.alive)
    }

    pub fn contains(&self, id: &WorkerId) -> bool {
        self.workers.contains_key(id)
    }

    /// Live worker ids in ascending id order.
    pub fn live_workers(&self) -> Vec<WorkerId> {
        let mut live: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|entry| entry.value().alive)
            .map(|entry| entry.key().clone())
            .collect();
        live.sort();
        live
    }

    /// Live workers whose last heartbeat is older than `timeout` at `now`.
    pub fn stale_workers(&self, now: Instant, timeout: Duration) -> Vec<WorkerId> {
        let mut stale: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|entry| {
                entry.value().alive
                    && now.saturating_duration_since(entry.value().last_heartbeat) > timeout
            })
            .map(|entry| entry.key().clone())
            .collect();
        stale.sort();
        stale
    }

    /// Queues `message` for a live worker. Never waits on the socket.
    pub fn send(&self, id: &WorkerId, message: Message) -> Result<()> {
        let entry = self
            .workers
            .get(id)
            .ok_or_else(|| ClusterError::connection_lost(id.as_str(), "not registered"))?;

        if !entry.alive {
            return Err(ClusterError::connection_lost(id.as_str(), "marked dead"));
        }

        entry
            .transport
            .send(message)
            .map_err(|_| ClusterError::connection_lost(id.as_str(), "session closed"))
    }

    /// Whether `transport` is the session currently registered under `id`.
    pub fn owns_session(&self, id: &WorkerId, transport: &UnboundedSender<Message>) -> bool {
        self.workers
            .get(id)
            .is_some_and(|entry| entry.transport.same_channel(transport))
    }

    /// Drops the entry and cancels its session.
    pub fn remove(&self, id: &WorkerId) -> bool {
        match self.workers.remove(id) {
            Some((_, entry)) => {
                entry.session.cancel();
                true
            }
            None => false,
        }
    }

    /// Removes `id` only if `transport` is still its session. Used when a
    /// session ends without recovery (coordinator shutdown), so the registry
    /// stops holding the session's sender.
    pub fn release(&self, id: &WorkerId, transport: &UnboundedSender<Message>) -> bool {
        self.workers
            .remove_if(id, |_, entry| entry.transport.same_channel(transport))
            .is_some()
    }

    /// `(id, capability, alive, last heartbeat)` for every entry, sorted by id.
    pub fn snapshot(&self) -> Vec<(WorkerId, WorkerCapability, bool, Instant)> {
        let mut all: Vec<_> = self
            .workers
            .iter()
            .map(|entry| {
                let worker = entry.value();
                (
                    entry.key().clone(),
                    worker.capability,
                    worker.alive,
                    worker.last_heartbeat,
                )
            })
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
