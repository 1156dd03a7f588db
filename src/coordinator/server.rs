use super::service::Coordinator;
use super::types::WorkerId;
use crate::error::{ClusterError, Result};
use crate::protocol::{
    Body, COORDINATOR_ID, Connection, Message, OperationComplete, RegisterWorker, spawn_writer,
};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

/// TCP front door. The first frame on a connection decides what it is:
/// `REGISTER_WORKER` opens a worker session, anything else is a single client
/// request.
pub struct CoordinatorServer {
    coordinator: Arc<Coordinator>,
    listener: TcpListener,
    connections: TaskTracker,
}

impl CoordinatorServer {
    pub async fn bind(coordinator: Arc<Coordinator>) -> Result<Self> {
        let listener = TcpListener::bind(coordinator.config().bind_addr).await?;
        Ok(Self {
            coordinator,
            listener,
            connections: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts until the coordinator shuts down, then waits for every
    /// connection task. Worker sessions finish once their queued frames
    /// (including `SHUTDOWN`) are written.
    pub async fn run(self) -> Result<()> {
        let shutdown = self.coordinator.shutdown_token();
        tracing::info!("Coordinator listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("Accepted connection from {}", peer);
                        let coordinator = self.coordinator.clone();
                        self.connections.spawn(async move {
                            handle_connection(coordinator, stream).await;
                        });
                    }
                    Err(e) => tracing::error!("Accept failed: {}", e),
                },
            }
        }

        self.connections.close();
        tracing::info!(
            "Coordinator listener closed, draining {} connections",
            self.connections.len()
        );
        self.connections.wait().await;
        tracing::info!("Coordinator stopped");
        Ok(())
    }
}

async fn handle_connection(coordinator: Arc<Coordinator>, stream: TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Could not set TCP_NODELAY: {}", e);
    }
    let mut conn = Connection::new(stream);
    let shutdown = coordinator.shutdown_token();

    let first = tokio::select! {
        _ = shutdown.cancelled() => return,
        frame = conn.recv() => frame,
    };
    let first = match first {
        Ok(Some(msg)) => msg,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("Bad first frame from {}: {}", conn.peer(), e);
            let response = OperationComplete::error(&e);
            let _ = conn
                .send(&Message::new(Body::OperationComplete(response), COORDINATOR_ID, "unknown"))
                .await;
            return;
        }
    };

    match first.body {
        Body::RegisterWorker(registration) => {
            worker_session(coordinator, conn, WorkerId::new(first.from), registration).await;
        }
        _ => client_request(coordinator, conn, first).await,
    }
}

async fn client_request(coordinator: Arc<Coordinator>, mut conn: Connection, msg: Message) {
    let client = msg.from.clone();
    let kind = msg.type_name();
    let response = coordinator.handle_client_request(msg).await;
    tracing::debug!("{} from {} answered {:?}", kind, client, response.status);

    let reply = Message::new(Body::OperationComplete(response), COORDINATOR_ID, client);
    if let Err(e) = conn.send(&reply).await {
        tracing::warn!("Could not answer {}: {}", conn.peer(), e);
    }
}

async fn worker_session(
    coordinator: Arc<Coordinator>,
    conn: Connection,
    id: WorkerId,
    registration: RegisterWorker,
) {
    let (writer, mut reader) = conn.split();
    let (transport, outbound) = mpsc::unbounded_channel();
    let writer_handle = spawn_writer(writer, outbound);

    let session = match coordinator.register_worker(id.clone(), registration, transport.clone()) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Rejected registration from {}: {}", reader.peer(), e);
            drop(transport);
            let _ = writer_handle.await;
            return;
        }
    };

    // The session ends on coordinator shutdown or once recovery removes the
    // worker from the registry.
    let lost = loop {
        tokio::select! {
            _ = session.cancelled() => break None,
            frame = reader.recv() => match frame {
                Ok(Some(msg)) => coordinator.handle_worker_message(&id, msg).await,
                Ok(None) => break Some("connection closed".to_string()),
                Err(ClusterError::Json(e)) => {
                    tracing::warn!("Dropping malformed frame from {}: {}", id, e);
                }
                Err(e) => break Some(e.to_string()),
            },
        }
    };

    // A newer session may have taken over the id after this one was removed.
    if let Some(reason) = lost
        && coordinator.registry().owns_session(&id, &transport)
    {
        tracing::error!("Lost connection to worker {}: {}", id, reason);
        coordinator.fail_worker(&id, &reason).await;
    }

    // Recovery is skipped during shutdown, so the entry is still here.
    if coordinator.is_shutting_down() {
        coordinator.registry().release(&id, &transport);
    }

    // With the registry's sender gone the writer flushes what is queued and
    // closes the socket.
    drop(transport);
    let _ = writer_handle.await;
    tracing::debug!("Session of worker {} closed", id);
}
