//! Coordinator
//!
//! Owns every array's placement and the set of connected workers.
//!
//! ## Responsibilities
//! - **Registry**: workers, their transports and heartbeats.
//! - **Placement**: deterministic round-robin of primaries and replicas over
//!   the live workers sorted by id.
//! - **Health & Recovery**: stale heartbeats and dropped connections both end in
//!   `Coordinator::fail_worker`, which promotes replicas and re-replicates.
//! - **Results**: per-segment progress of the last operation on each array.
//!
//! All placement mutations are serialized by one writer lock; reads of the
//! registry, the arrays and the reverse index go through `DashMap`s.

pub mod handlers;
pub mod health;
pub mod index;
pub mod placement;
pub mod recovery;
pub mod registry;
pub mod results;
pub mod server;
pub mod service;
pub mod types;

pub use health::HealthMonitor;
pub use recovery::RecoveryReport;
pub use server::CoordinatorServer;
pub use service::Coordinator;
pub use types::{DistributedArray, Segment, WorkerId};
