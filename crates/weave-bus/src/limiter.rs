// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Worker pool shared by all ports, and per-port limits on top of it.
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::error;

use crate::bus::BusError;

/// Bounded pool of blocking workers.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Pool of `size` workers (at least one) on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`BusError::NoRuntime`] outside a tokio runtime.
    pub fn new(size: usize) -> Result<Self, BusError> {
        let handle = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        Ok(Self::with_handle(size, handle))
    }

    /// Pool of `size` workers (at least one) on `handle`.
    pub fn with_handle(size: usize, handle: Handle) -> Self {
        let size = size.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Worker count.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently idle.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runtime the pool schedules on.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Runs jobs on a [`WorkerPool`] with at most `max` in flight.
#[derive(Clone, Debug)]
pub struct ExecutorLimiter {
    pool: WorkerPool,
    slots: Arc<Semaphore>,
    max: usize,
}

impl ExecutorLimiter {
    /// Limiter admitting `max` (at least one) concurrent jobs.
    pub fn new(pool: WorkerPool, max: usize) -> Self {
        let max = max.max(1);
        Self {
            pool,
            slots: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Concurrency ceiling.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Pool the jobs run on.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Queues `job`; it starts once both a slot of this limiter and a pool
    /// worker are free. Slots are granted first come, first served.
    ///
    /// A panic inside `job` is logged and swallowed.
    pub fn spawn<F>(&self, label: String, job: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let permits = Arc::clone(&self.pool.permits);
        self.pool.handle.spawn(async move {
            let Ok(_slot) = slots.acquire_owned().await else {
                return;
            };
            let Ok(_worker) = permits.acquire_owned().await else {
                return;
            };
            if let Err(err) = tokio::task::spawn_blocking(job).await {
                error!(job = %label, %err, "job panicked");
            }
        })
    }
}
