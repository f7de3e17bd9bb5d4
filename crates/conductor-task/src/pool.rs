// SPDX-License-Identifier: MIT

//! The bounded worker pool `SpawnAfter` hands continuations off to (spec
//! §4.2, §5). On saturation, scheduling fails synchronously with
//! `ConcurrencyError::NoFreeConductorWorker` rather than blocking — "on
//! saturation public ops fail rather than block" (spec §5).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use conductor_core::error::ConcurrencyError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A permit held for the lifetime of one spawned continuation; the pool slot
/// frees when this drops.
pub struct PoolPermit {
    _permit: OwnedSemaphorePermit,
}

/// A FIFO-bounded pool of worker slots. The conductor service runs two of
/// these — a primary pool and a small one reserved for heartbeat-reply paths
/// (spec §4.3) — so the primary can never starve keepalives.
pub trait WorkerPool: Send + Sync {
    /// Reserve one slot without blocking. `Err` means the pool is saturated;
    /// the caller must not have moved any state it can't undo yet.
    fn try_acquire(&self) -> Result<PoolPermit, ConcurrencyError>;

    /// Spawn `future` onto the runtime holding `permit` for its duration.
    fn spawn(&self, permit: PoolPermit, future: BoxFuture) {
        tokio::spawn(async move {
            let _permit = permit;
            future.await;
        });
    }
}

pub struct BoundedWorkerPool {
    semaphore: Arc<Semaphore>,
}

impl BoundedWorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(capacity.max(1))) }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl WorkerPool for BoundedWorkerPool {
    fn try_acquire(&self) -> Result<PoolPermit, ConcurrencyError> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .map(|permit| PoolPermit { _permit: permit })
            .map_err(|_| ConcurrencyError::NoFreeConductorWorker)
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
