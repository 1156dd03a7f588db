//! Worker Node
//!
//! A worker keeps one long-lived session with the coordinator. It stores the
//! segments it is sent, promotes replicas when told to, and runs transforms
//! over its primary segments.
//!
//! ## Components
//! - **`SegmentStore`**: primary, replica and result tables keyed by `SegmentKey`.
//! - **`ComputeEngine`**: chunked, semaphore-bounded execution over the blocking pool.
//! - **`TransformRegistry`**: operation name to `Transform` lookup (`smooth`, `classify`).
//! - **`WorkerNode`**: the session loop, heartbeats and message dispatch.

pub mod compute;
pub mod node;
pub mod store;
pub mod transforms;

pub use compute::ComputeEngine;
pub use node::WorkerNode;
pub use store::SegmentStore;
pub use transforms::{Transform, TransformRegistry};

#[cfg(test)]
mod tests;
