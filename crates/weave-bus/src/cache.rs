// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Snapshot of the current bus state.
use std::sync::Arc;

use weave_core::{
    Applicator, ElementType, ModelRepository, ParallelStrategy, RepositoryError,
    TimedDiffCollection,
};

use crate::stream::DiffSink;

/// Repository mirroring every collection that passed the bus.
#[derive(Debug)]
pub struct BusStateCache {
    repository: ModelRepository,
    applicator: Applicator,
}

impl BusStateCache {
    /// Empty cache resolving parallel writes with `strategy`.
    pub fn new(strategy: ParallelStrategy) -> Self {
        Self {
            repository: ModelRepository::new(),
            applicator: Applicator::new(strategy),
        }
    }

    /// Applies `diffs` and returns the effective changes.
    ///
    /// # Errors
    /// Propagates repository rejections.
    pub fn apply(
        &mut self,
        diffs: &TimedDiffCollection,
    ) -> Result<TimedDiffCollection, RepositoryError> {
        self.applicator.apply(&mut self.repository, diffs)
    }

    /// Every cached element as an Add diff at its version.
    pub fn dump(&self) -> TimedDiffCollection {
        self.repository.dump()
    }

    /// Cached elements of any of `consumes` as Add diffs.
    pub fn dump_for(&self, consumes: &[ElementType]) -> TimedDiffCollection {
        self.dump().filter_by_element_types(consumes)
    }

    /// Sends the state relevant to `consumes` into `sink`. Returns `false`
    /// if the receiver is gone.
    pub fn attach(&self, consumes: &[ElementType], sink: &DiffSink) -> bool {
        let snapshot = self.dump_for(consumes);
        snapshot.is_empty() || sink.send(Arc::new(snapshot)).is_ok()
    }

    /// Backing repository.
    pub fn repository(&self) -> &ModelRepository {
        &self.repository
    }
}
