//! Concurrent execution of download jobs
//!
//! - [`pool`] - bounded pool that throttles submission to its capacity

pub mod pool;

pub use pool::{BoundedWorkerPool, PoolReport, TaskHandle};
