//! Array Data Model
//!
//! The numeric building blocks shared by the coordinator and the workers.
//!
//! - **`SegmentData`**: a discriminated container over the two supported element
//!   kinds (`Int` as `i64`, `Double` as `f64`).
//! - **`SegmentKey`**: `(array_id, start_index)`, the identity of a segment everywhere.
//! - **`planner`**: the balanced range splitter used for both segment placement and
//!   compute chunking.

pub mod planner;
pub mod types;

pub use planner::plan_segments;
pub use types::{ElementKind, SegmentData, SegmentKey, SegmentRole};

#[cfg(test)]
mod tests;
