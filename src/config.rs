//! Process-start configuration.
//!
//! Nothing here is persisted; the binaries fill these structs from command-line
//! flags (with environment fallbacks) and hand them to the coordinator or worker.

use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_COORDINATOR_PORT: u16 = 5000;
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_REPLICATION_FACTOR: usize = 2;

/// The admin HTTP port sits this far above the coordinator port.
pub const HTTP_PORT_OFFSET: u16 = 1000;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub bind_addr: SocketAddr,
    /// `None` disables the admin HTTP surface.
    pub http_addr: Option<SocketAddr>,
    pub health_check_interval: Duration,
    pub heartbeat_timeout: Duration,
    /// Total copies per segment, primary included.
    pub replication_factor: usize,
}

impl CoordinatorConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        let http_addr = SocketAddr::new(
            bind_addr.ip(),
            bind_addr.port().saturating_add(HTTP_PORT_OFFSET),
        );
        Self {
            bind_addr,
            http_addr: Some(http_addr),
            ..Self::default()
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_COORDINATOR_PORT)),
            http_addr: None,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// `host:port` of the coordinator.
    pub coordinator_addr: String,
    pub heartbeat_interval: Duration,
    /// Size of the compute pool; defaults to the number of cores.
    pub compute_units: usize,
    pub memory_mb: u64,
}

impl WorkerConfig {
    pub fn new(worker_id: impl Into<String>, coordinator_addr: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            coordinator_addr: coordinator_addr.into(),
            ..Self::default()
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            coordinator_addr: format!("127.0.0.1:{}", DEFAULT_COORDINATOR_PORT),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            compute_units: num_cpus::get().max(1),
            memory_mb: total_memory_mb(),
        }
    }
}

/// Physical memory of the host in MiB, reported at registration.
pub fn total_memory_mb() -> u64 {
    use sysinfo::{System, SystemExt};

    let mut system = System::new();
    system.refresh_memory();
    system.total_memory() / (1024 * 1024)
}
