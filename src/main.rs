use clap::{Args, Parser, Subcommand};
use distributed_array::config::{
    CoordinatorConfig, DEFAULT_COORDINATOR_PORT, DEFAULT_REPLICATION_FACTOR, HTTP_PORT_OFFSET,
    WorkerConfig,
};
use distributed_array::coordinator::{Coordinator, CoordinatorServer, HealthMonitor, handlers};
use distributed_array::worker::WorkerNode;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "darray-node", version, about = "Distributed array coordinator and worker")]
struct Cli {
    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "DARRAY_LOG", default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Run the coordinator
    Coordinator(CoordinatorArgs),
    /// Run a worker and register it with a coordinator
    Worker(WorkerArgs),
}

#[derive(Args)]
struct CoordinatorArgs {
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(long, env = "DARRAY_PORT", default_value_t = DEFAULT_COORDINATOR_PORT)]
    port: u16,

    /// Admin HTTP port (defaults to port + 1000)
    #[arg(long)]
    http_port: Option<u16>,

    /// Disable the admin HTTP surface
    #[arg(long)]
    no_http: bool,

    #[arg(long, default_value_t = 5000)]
    health_interval_ms: u64,

    #[arg(long, default_value_t = 10000)]
    heartbeat_timeout_ms: u64,

    /// Total copies per segment, primary included
    #[arg(long, default_value_t = DEFAULT_REPLICATION_FACTOR)]
    replication_factor: usize,
}

#[derive(Args)]
struct WorkerArgs {
    /// Worker id (defaults to a random UUID)
    #[arg(long, env = "DARRAY_WORKER_ID")]
    id: Option<String>,

    /// Coordinator address as host:port
    #[arg(long, env = "DARRAY_COORDINATOR", default_value = "127.0.0.1:5000")]
    coordinator: String,

    #[arg(long, default_value_t = 3000)]
    heartbeat_interval_ms: u64,

    /// Parallel compute chunks (defaults to the number of cores)
    #[arg(long)]
    compute_units: Option<usize>,
}

impl CoordinatorArgs {
    fn into_config(self) -> CoordinatorConfig {
        let bind_addr = SocketAddr::new(self.host, self.port);
        let http_port = self
            .http_port
            .unwrap_or_else(|| self.port.saturating_add(HTTP_PORT_OFFSET));

        CoordinatorConfig {
            bind_addr,
            http_addr: (!self.no_http).then(|| SocketAddr::new(self.host, http_port)),
            health_check_interval: Duration::from_millis(self.health_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            replication_factor: self.replication_factor,
        }
    }
}

impl WorkerArgs {
    fn into_config(self) -> WorkerConfig {
        let mut config = WorkerConfig {
            coordinator_addr: self.coordinator,
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            ..WorkerConfig::default()
        };
        if let Some(id) = self.id {
            config.worker_id = id;
        }
        if let Some(units) = self.compute_units {
            config.compute_units = units.max(1);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    match cli.role {
        Role::Coordinator(args) => run_coordinator(args.into_config()).await,
        Role::Worker(args) => run_worker(args.into_config()).await,
    }
}

async fn run_coordinator(config: CoordinatorConfig) -> anyhow::Result<()> {
    tracing::info!(
        "Starting coordinator on {} (replication factor {})",
        config.bind_addr,
        config.replication_factor
    );

    let coordinator = Coordinator::new(config.clone());
    let server = CoordinatorServer::bind(coordinator.clone()).await?;

    // 1. Health monitor:
    let health = HealthMonitor::new(coordinator.clone()).spawn();

    // 2. Admin HTTP:
    if let Some(http_addr) = config.http_addr {
        let listener = tokio::net::TcpListener::bind(http_addr).await?;
        let app = handlers::router(coordinator.clone());
        let shutdown = coordinator.shutdown_token();
        tracing::info!("HTTP server listening on {}", http_addr);

        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!("HTTP server failed: {}", e);
            }
        });
    }

    // 3. Ctrl+C:
    let signal_target = coordinator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_target.shutdown();
        }
    });
    tracing::info!("Press Ctrl+C to shutdown");

    // 4. Protocol listener:
    server.run().await?;
    let _ = health.await;

    Ok(())
}

async fn run_worker(config: WorkerConfig) -> anyhow::Result<()> {
    tracing::info!(
        "Starting worker {} for coordinator {} ({} compute units, {} MB)",
        config.worker_id,
        config.coordinator_addr,
        config.compute_units,
        config.memory_mb
    );

    let node = WorkerNode::new(config);

    let signal_target = node.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_target.stop();
        }
    });

    node.run().await?;
    tracing::info!("Worker exited");

    Ok(())
}
