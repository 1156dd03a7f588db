use super::service::Coordinator;
use super::types::WorkerId;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Periodic heartbeat check. Stops when the coordinator shuts down.
pub struct HealthMonitor {
    coordinator: Arc<Coordinator>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let interval = coordinator.config().health_check_interval;
        Self {
            coordinator,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    pub async fn run(self) {
        let shutdown = self.coordinator.shutdown_token();
        let mut interval = tokio::time::interval(self.interval);
        tracing::info!("Health monitor started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let failed = self.coordinator.check_worker_health(Instant::now()).await;
                    if !failed.is_empty() {
                        tracing::warn!("Health check failed workers: {:?}", failed);
                    }
                }
            }
        }

        tracing::info!("Health monitor stopped");
    }
}

impl Coordinator {
    /// Fails every live worker whose heartbeat is older than the timeout at
    /// `now`. Returns the workers this call transitioned to dead.
    pub async fn check_worker_health(&self, now: Instant) -> Vec<WorkerId> {
        let timeout = self.config.heartbeat_timeout;
        let mut failed = Vec::new();

        for id in self.registry.stale_workers(now, timeout) {
            let reason = format!("no heartbeat for more than {:?}", timeout);
            if self.fail_worker(&id, &reason).await.is_some() {
                failed.push(id);
            }
        }
        failed
    }
}
