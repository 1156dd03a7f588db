//! Wire Protocol
//!
//! Defines the message envelope exchanged between clients, the coordinator and
//! workers, and the framing used to carry it over TCP.
//!
//! ## Message flow
//! - **Client → Coordinator**: `CREATE_ARRAY`, `APPLY_OPERATION`, `GET_RESULT`
//!   (one connection per request, answered by one `OPERATION_COMPLETE`).
//! - **Worker → Coordinator**: `REGISTER_WORKER` opens a long-lived session, followed
//!   by `HEARTBEAT`, `SEGMENT_RESULT` and `RECOVERY_COMPLETE`.
//! - **Coordinator → Worker**: `DISTRIBUTE_ARRAY`, `REPLICATE_DATA`, `RECOVER_DATA`,
//!   `PROCESS_SEGMENT`, `SHUTDOWN`.

pub mod codec;
pub mod types;

pub use codec::{Connection, MessageReader, MessageWriter, spawn_writer};
pub use types::*;
