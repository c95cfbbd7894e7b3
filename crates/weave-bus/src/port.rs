// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Modification ports.
//!
//! A [`ProcessorPort`] moves through these states:
//!
//! - idle: nothing pending, nothing running;
//! - pending: input merged into the accumulator, one flush enqueued;
//! - running: the processor works on a swapped-out batch while new input
//!   merges into the next accumulator.
//!
//! Only the merge and the decision to enqueue happen under the port lock.
//! A flush clears the enqueued flag and swaps the accumulator in one critical
//! section, so input arriving while the processor runs always schedules the
//! next flush and nothing is lost.
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, trace, warn};
use weave_core::{ElementType, TimedDiffCollection};

use crate::limiter::{ExecutorLimiter, WorkerPool};
use crate::processor::Processor;
use crate::stream::{Broadcaster, DiffStream};

/// Attachment point of the bus.
pub trait ModificationPort: Send + Sync {
    /// Stable id.
    fn id(&self) -> &str;

    /// Types this port receives (OR, subtype-aware).
    fn consumes(&self) -> Vec<ElementType>;

    /// Starts consuming `input`.
    fn connect_input_to(&self, input: DiffStream);

    /// Opens a stream of everything this port emits from now on.
    fn output(&self) -> DiffStream;
}

#[derive(Debug, Default)]
struct Accumulator {
    pending: TimedDiffCollection,
    enqueued: bool,
}

struct PortInner<P> {
    processor: P,
    id: String,
    consumes: Vec<ElementType>,
    state: Mutex<Accumulator>,
    output: Broadcaster,
    limiter: ExecutorLimiter,
}

/// Port running a [`Processor`] with input coalescing.
pub struct ProcessorPort<P> {
    inner: Arc<PortInner<P>>,
}

impl<P> Clone for ProcessorPort<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Processor> ProcessorPort<P> {
    /// Wraps `processor`, running it on `pool`.
    pub fn new(processor: P, pool: &WorkerPool) -> Self {
        let limiter = ExecutorLimiter::new(pool.clone(), processor.max_thread_number());
        Self {
            inner: Arc::new(PortInner {
                id: processor.id().to_owned(),
                consumes: processor.consumes(),
                processor,
                state: Mutex::new(Accumulator::default()),
                output: Broadcaster::new(),
                limiter,
            }),
        }
    }

    /// The wrapped processor.
    pub fn processor(&self) -> &P {
        &self.inner.processor
    }

    /// Merges `diffs` into the accumulator and enqueues a flush unless one
    /// is enqueued already.
    pub fn receive(&self, diffs: &TimedDiffCollection) {
        if diffs.is_empty() {
            return;
        }
        let schedule = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.pending.merge_newer_from(diffs);
            !mem::replace(&mut state.enqueued, true)
        };
        if schedule {
            let inner = Arc::clone(&self.inner);
            self.inner
                .limiter
                .spawn(self.inner.id.clone(), move || inner.flush());
        }
    }

    /// Diffs merged but not yet handed to the processor.
    pub fn pending_len(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}

impl<P: Processor> PortInner<P> {
    fn take_batch(&self) -> TimedDiffCollection {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.enqueued = false;
        mem::take(&mut state.pending)
    }

    fn flush(&self) {
        let batch = self.take_batch();
        if batch.is_empty() {
            trace!(port = %self.id, "empty flush");
            return;
        }
        let size = batch.len();
        let started = Instant::now();
        let result = self.processor.process(batch);
        debug!(
            port = %self.id,
            batch = size,
            elapsed_ms = started.elapsed().as_millis(),
            "flush took"
        );
        match result {
            Ok(out) if out.is_empty() => {}
            Ok(out) => {
                self.output.publish(&Arc::new(out));
            }
            Err(err) => warn!(port = %self.id, error = %err, "processor failed, batch dropped"),
        }
    }
}

impl<P: Processor> ModificationPort for ProcessorPort<P> {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn consumes(&self) -> Vec<ElementType> {
        self.inner.consumes.clone()
    }

    fn connect_input_to(&self, mut input: DiffStream) {
        let port = self.clone();
        self.inner.limiter.pool().handle().spawn(async move {
            while let Some(diffs) = input.recv().await {
                port.receive(&diffs);
            }
        });
    }

    fn output(&self) -> DiffStream {
        self.inner.output.subscribe()
    }
}
