// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Processor doubles.
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use weave_bus::Processor;
use weave_core::{ElementType, TimedDiffCollection};

/// Blocking latch shared between a test and a processor.
///
/// `wait` blocks the calling thread until `open` is called. Clones share
/// the latch.
#[derive(Clone, Debug, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    /// Closed gate.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Releases every current and future waiter.
    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// True once opened.
    pub fn is_open(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the gate opens.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut open = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = cvar.wait(open).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Scripted result of one `process` call.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Return these diffs.
    Emit(TimedDiffCollection),
    /// Return an error with this message.
    Fail(String),
    /// Panic with this message.
    Panic(String),
}

#[derive(Debug, Default)]
struct Recording {
    calls: Vec<TimedDiffCollection>,
    script: VecDeque<Outcome>,
    running: usize,
    max_running: usize,
}

/// Processor recording every batch it is handed.
///
/// Clones share the recording, so a test keeps one clone while the bus owns
/// the other. Without a script every call returns an empty collection.
#[derive(Clone, Debug)]
pub struct RecordingProcessor {
    id: String,
    consumes: Vec<ElementType>,
    max_threads: usize,
    gate: Option<Gate>,
    recording: Arc<Mutex<Recording>>,
}

impl RecordingProcessor {
    /// Processor `id` woken for `consumes`.
    pub fn new(id: impl Into<String>, consumes: impl IntoIterator<Item = ElementType>) -> Self {
        Self {
            id: id.into(),
            consumes: consumes.into_iter().collect(),
            max_threads: 1,
            gate: None,
            recording: Arc::new(Mutex::new(Recording::default())),
        }
    }

    /// Every call blocks on `gate` after recording its batch.
    #[must_use]
    pub fn blocked_by(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Reports `max` as [`Processor::max_thread_number`].
    #[must_use]
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the outcome of a future call.
    pub fn push(&self, outcome: Outcome) {
        self.lock().script.push_back(outcome);
    }

    /// Batches received so far, in call order.
    pub fn calls(&self) -> Vec<TimedDiffCollection> {
        self.lock().calls.clone()
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Highest number of overlapping calls observed.
    pub fn max_concurrency(&self) -> usize {
        self.lock().max_running
    }

    /// Ids seen across all batches.
    pub fn seen_ids(&self) -> std::collections::BTreeSet<String> {
        self.lock()
            .calls
            .iter()
            .flat_map(|c| c.ids().map(str::to_owned).collect::<Vec<_>>())
            .collect()
    }

    /// Polls until at least `n` calls were made or `within` elapsed.
    /// Returns whether the count was reached.
    pub async fn wait_for_calls(&self, n: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if self.call_count() >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Processor for RecordingProcessor {
    fn id(&self) -> &str {
        &self.id
    }

    fn consumes(&self) -> Vec<ElementType> {
        self.consumes.clone()
    }

    #[allow(clippy::panic)]
    fn process(&self, diffs: TimedDiffCollection) -> anyhow::Result<TimedDiffCollection> {
        let outcome = {
            let mut recording = self.lock();
            recording.calls.push(diffs);
            recording.running += 1;
            recording.max_running = recording.max_running.max(recording.running);
            recording.script.pop_front()
        };
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        self.lock().running -= 1;
        match outcome {
            None => Ok(TimedDiffCollection::new()),
            Some(Outcome::Emit(out)) => Ok(out),
            Some(Outcome::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(Outcome::Panic(message)) => panic!("{message}"),
        }
    }

    fn max_thread_number(&self) -> usize {
        self.max_threads
    }
}
