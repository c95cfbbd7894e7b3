// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Applies timed diffs to a repository, resolving concurrent writes.
//!
//! Per incoming diff the timestamp is compared with the version the
//! repository holds for the element:
//!
//! | incoming vs stored | action                              |
//! |--------------------|-------------------------------------|
//! | no stored version  | apply                               |
//! | after / equal      | apply (equal is a no-op)            |
//! | before             | drop as stale                       |
//! | parallel           | ask the [`ParallelStrategy`]        |
//!
//! Dropped diffs that carry [`Probability::Explicit`] still promote the
//! stored element to explicit.
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::collection::{DiffCollection, TimedDiffCollection};
use crate::diff::ModelDiff;
use crate::element::{Probability, SharedElement};
use crate::repository::{ModelRead, ModelRepository, RepositoryError};
use crate::time::{CausalRelation, VectorTimestamp};

/// Decides parallel conflicts for [`ParallelStrategy::Custom`].
pub trait ParallelPolicy: Send + Sync + fmt::Debug {
    /// Returns `true` to apply `incoming` over the stored state.
    fn overwrite(
        &self,
        current: Option<&SharedElement>,
        incoming: &ModelDiff,
        current_version: &VectorTimestamp,
        incoming_version: &VectorTimestamp,
    ) -> bool;
}

/// Resolution of writes whose timestamps are parallel to the stored version.
#[derive(Clone, Debug, Default)]
pub enum ParallelStrategy {
    /// Keep the stored state.
    #[default]
    Ignore,
    /// Apply the incoming diff; the element version becomes the join.
    Overwrite,
    /// Delegate to a policy.
    Custom(Arc<dyn ParallelPolicy>),
}

/// Applies diff collections with a fixed [`ParallelStrategy`].
#[derive(Clone, Debug, Default)]
pub struct Applicator {
    strategy: ParallelStrategy,
}

impl Applicator {
    /// Applicator resolving parallel writes with `strategy`.
    pub fn new(strategy: ParallelStrategy) -> Self {
        Self { strategy }
    }

    /// Conflict strategy in use.
    pub fn strategy(&self) -> &ParallelStrategy {
        &self.strategy
    }

    /// Applies `diffs` to `repo` and returns the effective changes, each
    /// stamped with the resulting element version.
    ///
    /// Entries without a timestamp are applied as local events. Refresh
    /// markers carry over to every id that changed.
    ///
    /// # Errors
    /// Stops at the first write `repo` rejects; earlier entries stay applied.
    pub fn apply(
        &self,
        repo: &mut ModelRepository,
        diffs: &TimedDiffCollection,
    ) -> Result<TimedDiffCollection, RepositoryError> {
        let mut out = TimedDiffCollection::new();
        for (id, diff, version) in diffs.iter() {
            let accepted = match version {
                None => true,
                Some(incoming) => self.accepts(repo, diff, incoming),
            };
            if !accepted {
                out.merge_collection(promote_if_explicit(repo, diff));
                continue;
            }
            let applied = write(repo, diff, version.cloned())?;
            if diffs.is_refresh(id) && applied.get(id).is_some() {
                out.mark_refresh(id);
            }
            out.merge_collection(applied);
        }
        Ok(out)
    }

    /// Applies untimed `diffs` as local events.
    ///
    /// # Errors
    /// Stops at the first write `repo` rejects; earlier entries stay applied.
    pub fn apply_local(
        &self,
        repo: &mut ModelRepository,
        diffs: &DiffCollection,
    ) -> Result<TimedDiffCollection, RepositoryError> {
        let mut out = TimedDiffCollection::new();
        for (id, diff) in diffs.iter() {
            let applied = write(repo, diff, None)?;
            if diffs.is_refresh(id) && applied.get(id).is_some() {
                out.mark_refresh(id.clone());
            }
            out.merge_collection(applied);
        }
        Ok(out)
    }

    fn accepts(&self, repo: &ModelRepository, diff: &ModelDiff, incoming: &VectorTimestamp) -> bool {
        let id = diff.id();
        let Some(stored) = repo.version(id) else {
            return true;
        };
        match incoming.relation_to(&stored) {
            CausalRelation::StrictlyAfter | CausalRelation::Equal => true,
            CausalRelation::StrictlyBefore => {
                trace!(id, %incoming, %stored, "dropping stale diff");
                false
            }
            CausalRelation::Parallel => {
                let overwrite = match &self.strategy {
                    ParallelStrategy::Ignore => false,
                    ParallelStrategy::Overwrite => true,
                    ParallelStrategy::Custom(policy) => {
                        policy.overwrite(repo.get(id).as_ref(), diff, &stored, incoming)
                    }
                };
                debug!(id, %incoming, %stored, overwrite, "parallel write");
                overwrite
            }
        }
    }
}

fn write(
    repo: &mut ModelRepository,
    diff: &ModelDiff,
    version: Option<VectorTimestamp>,
) -> Result<TimedDiffCollection, RepositoryError> {
    match diff {
        ModelDiff::Remove(_) => repo.remove_with(diff.id(), version),
        ModelDiff::Add(element) | ModelDiff::Modify { after: element, .. } => {
            repo.store_with(Arc::clone(element), version)
        }
    }
}

fn promote_if_explicit(repo: &mut ModelRepository, diff: &ModelDiff) -> TimedDiffCollection {
    if diff.is_remove() || !diff.affected().probability().is_some_and(Probability::is_explicit) {
        return TimedDiffCollection::new();
    }
    repo.promote_to_explicit(diff.id())
}
