// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-task: the scoped task-acquisition primitive (spec §4.2) and the
//! bounded worker pool continuations run on.

pub mod pool;
pub mod task;

pub use pool::{BoundedWorkerPool, BoxFuture, PoolPermit, WorkerPool};
pub use task::{Task, TaskManager};
