//! Task scheduler: expression registry, ready FIFO, and lease tracking.
//!
//! - `store`: expression records and the task → buffer position index
//! - `queue`: FIFO of dispatchable tasks
//! - `lease`: leased tasks and their deadlines
//! - `service`: the [`Scheduler`] tying them together under one lock

pub mod lease;
pub mod queue;
pub mod service;
pub mod store;

pub use lease::{Lease, LeaseTable};
pub use queue::ReadyQueue;
pub use service::{Scheduler, spawn_lease_watcher};
pub use store::{Expression, ExpressionState, ExpressionStore, ResolveOutcome};
