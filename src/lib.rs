//! Distributed Array Cluster Library
//!
//! Partitions numeric arrays across a pool of worker processes, replicates every
//! partition, and runs element-wise transforms over the partitions in parallel.
//! The binaries (`darray-node` in `main.rs` and `darray-client`) are thin shells
//! around the modules below.
//!
//! ## Architecture Modules
//! - **`array`**: element kinds, the `SegmentData` container, segment keys and the
//!   segment planner.
//! - **`protocol`**: the `{type, from, to, timestamp, payload}` envelope and its
//!   line-delimited JSON framing over TCP.
//! - **`coordinator`**: worker registry, round-robin placement with replication,
//!   health monitoring, failure recovery and result aggregation.
//! - **`worker`**: the per-worker segment store, transforms and the chunked
//!   compute engine.
//! - **`client`**: one-request-per-connection client used by the CLI.
//! - **`config`** and **`error`**: process-start settings and the error taxonomy.

pub mod array;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod worker;

pub use error::{ClusterError, Result};
