// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bare port double.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use weave_bus::{Broadcaster, DiffStream, ModificationPort};
use weave_core::{ElementType, TimedDiffCollection};

/// Port recording its input and emitting whatever the test hands it.
///
/// Stands in for the outer surfaces (UI, export) attached to the bus.
/// Clones share state.
#[derive(Clone, Debug)]
pub struct RecordingPort {
    id: String,
    consumes: Vec<ElementType>,
    received: Arc<Mutex<Vec<Arc<TimedDiffCollection>>>>,
    output: Arc<Broadcaster>,
}

impl RecordingPort {
    /// Port `id` receiving `consumes`.
    pub fn new(id: impl Into<String>, consumes: impl IntoIterator<Item = ElementType>) -> Self {
        Self {
            id: id.into(),
            consumes: consumes.into_iter().collect(),
            received: Arc::default(),
            output: Arc::new(Broadcaster::new()),
        }
    }

    /// Emits `diffs` on the output stream.
    pub fn emit(&self, diffs: TimedDiffCollection) {
        self.output.publish(&Arc::new(diffs));
    }

    /// Collections received so far.
    pub fn received(&self) -> Vec<Arc<TimedDiffCollection>> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Polls until `predicate` holds for the received collections or
    /// `within` elapsed.
    pub async fn wait_until(
        &self,
        within: Duration,
        predicate: impl Fn(&[Arc<TimedDiffCollection>]) -> bool,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if predicate(&self.received()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl ModificationPort for RecordingPort {
    fn id(&self) -> &str {
        &self.id
    }

    fn consumes(&self) -> Vec<ElementType> {
        self.consumes.clone()
    }

    fn connect_input_to(&self, mut input: DiffStream) {
        let received = Arc::clone(&self.received);
        tokio::spawn(async move {
            while let Some(diffs) = input.recv().await {
                received
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(diffs);
            }
        });
    }

    fn output(&self) -> DiffStream {
        self.output.subscribe()
    }
}
