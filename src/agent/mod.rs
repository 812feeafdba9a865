//! Agent side: computes tasks pulled from a scheduler.
//!
//! - `compute`: evaluate one task
//! - `client`: the [`TaskSource`] seam, over HTTP or in-process
//! - `pool`: fixed-concurrency worker pool

pub mod client;
pub mod compute;
pub mod pool;

pub use client::{HttpTaskSource, LocalTaskSource, TaskSource};
pub use compute::compute;
pub use pool::{PoolConfig, PoolMetrics, WorkerPool};
