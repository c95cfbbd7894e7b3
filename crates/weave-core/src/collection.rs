// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Diff collections keyed by element id.
//!
//! A collection holds at most one diff per element id (last diff wins) plus a
//! set of *refresh* ids: elements whose consumers must re-read the complete
//! state instead of trusting earlier deltas. A refresh marker is set whenever a
//! Remove is superseded by an Add or Modify during merging.
use std::collections::{btree_map, BTreeMap, BTreeSet};

use crate::diff::{DiffError, ModelDiff};
use crate::ident::{ElementRef, ElementType};
use crate::time::{CausalRelation, VectorTimestamp};

/// Untimed diff collection, typically prepared by local code before applying.
#[derive(Clone, Debug, Default)]
pub struct DiffCollection {
    diffs: BTreeMap<String, ModelDiff>,
    refresh: BTreeSet<String>,
}

impl DiffCollection {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `diff`, replacing any diff for the same id.
    pub fn put_diff(&mut self, diff: ModelDiff) -> Option<ModelDiff> {
        self.diffs.insert(diff.id().to_owned(), diff)
    }

    /// Removes the diff for `id`.
    pub fn remove_diff(&mut self, id: &str) -> Option<ModelDiff> {
        self.refresh.remove(id);
        self.diffs.remove(id)
    }

    /// Diff for `id`.
    pub fn get(&self, id: &str) -> Option<&ModelDiff> {
        self.diffs.get(id)
    }

    /// Diff for `reference`, type-checked.
    ///
    /// # Errors
    /// Returns [`DiffError::TypeMismatch`] if a diff exists for the id but its
    /// element is not of the referenced type.
    pub fn get_diff_for_element(
        &self,
        reference: &ElementRef,
    ) -> Result<Option<&ModelDiff>, DiffError> {
        typed_get(&self.diffs, reference)
    }

    /// Marks `id` for a complete re-read downstream.
    pub fn mark_refresh(&mut self, id: impl Into<String>) {
        self.refresh.insert(id.into());
    }

    /// True if `id` carries a refresh marker.
    pub fn is_refresh(&self, id: &str) -> bool {
        self.refresh.contains(id)
    }

    /// Ids carrying a refresh marker.
    pub fn refresh_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.refresh.iter().map(String::as_str)
    }

    /// Ids with a diff, in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.diffs.keys().map(String::as_str)
    }

    /// `(id, diff)` pairs in ascending id order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, ModelDiff> {
        self.diffs.iter()
    }

    /// Number of diffs.
    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    /// True when there are no diffs.
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    /// Merges `other` into `self`, overwriting per id.
    pub fn merge_collection(&mut self, other: DiffCollection) {
        for (id, diff) in other.diffs {
            let supersedes_remove =
                self.diffs.get(&id).is_some_and(ModelDiff::is_remove) && !diff.is_remove();
            if supersedes_remove {
                self.refresh.insert(id.clone());
            }
            self.diffs.insert(id, diff);
        }
        self.refresh.extend(other.refresh);
    }

    /// Sub-collection of diffs matching `predicate`.
    pub fn filter(&self, mut predicate: impl FnMut(&ModelDiff) -> bool) -> DiffCollection {
        let diffs: BTreeMap<_, _> = self
            .diffs
            .iter()
            .filter(|(_, d)| predicate(d))
            .map(|(id, d)| (id.clone(), d.clone()))
            .collect();
        let refresh = self
            .refresh
            .iter()
            .filter(|id| diffs.contains_key(*id))
            .cloned()
            .collect();
        DiffCollection { diffs, refresh }
    }

    /// Sub-collection of diffs whose element type matches any of `types`
    /// (subtype-aware).
    pub fn filter_by_element_types(&self, types: &[ElementType]) -> DiffCollection {
        self.filter(|d| d.element_type().matches_any(types))
    }

    /// Converts into a timed collection with no versions (local changes).
    pub fn into_timed(self) -> TimedDiffCollection {
        TimedDiffCollection {
            inner: self,
            versions: BTreeMap::new(),
        }
    }
}

impl IntoIterator for DiffCollection {
    type Item = (String, ModelDiff);
    type IntoIter = btree_map::IntoIter<String, ModelDiff>;

    fn into_iter(self) -> Self::IntoIter {
        self.diffs.into_iter()
    }
}

impl FromIterator<ModelDiff> for DiffCollection {
    fn from_iter<I: IntoIterator<Item = ModelDiff>>(iter: I) -> Self {
        let mut out = Self::new();
        for diff in iter {
            out.put_diff(diff);
        }
        out
    }
}

/// Diff collection with the vector timestamp at which each diff was produced.
///
/// Entries without a timestamp are local changes; applying them registers a
/// local event on the target repository.
#[derive(Clone, Debug, Default)]
pub struct TimedDiffCollection {
    inner: DiffCollection,
    versions: BTreeMap<String, VectorTimestamp>,
}

impl TimedDiffCollection {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `diff` produced at `version`, replacing any entry for the id.
    pub fn put_diff(&mut self, diff: ModelDiff, version: VectorTimestamp) {
        self.versions.insert(diff.id().to_owned(), version);
        self.inner.put_diff(diff);
    }

    /// Inserts an untimed `diff`, replacing any entry for the id.
    pub fn put_local_diff(&mut self, diff: ModelDiff) {
        self.versions.remove(diff.id());
        self.inner.put_diff(diff);
    }

    /// Removes the entry for `id`.
    pub fn remove_diff(&mut self, id: &str) -> Option<ModelDiff> {
        self.versions.remove(id);
        self.inner.remove_diff(id)
    }

    /// Diff for `id`.
    pub fn get(&self, id: &str) -> Option<&ModelDiff> {
        self.inner.get(id)
    }

    /// Diff for `reference`, type-checked.
    ///
    /// # Errors
    /// Returns [`DiffError::TypeMismatch`] on a type mismatch.
    pub fn get_diff_for_element(
        &self,
        reference: &ElementRef,
    ) -> Result<Option<&ModelDiff>, DiffError> {
        self.inner.get_diff_for_element(reference)
    }

    /// Timestamp at which the diff for `id` was produced.
    pub fn version_for(&self, id: &str) -> Option<&VectorTimestamp> {
        self.versions.get(id)
    }

    /// Marks `id` for a complete re-read downstream.
    pub fn mark_refresh(&mut self, id: impl Into<String>) {
        self.inner.mark_refresh(id);
    }

    /// True if `id` carries a refresh marker.
    pub fn is_refresh(&self, id: &str) -> bool {
        self.inner.is_refresh(id)
    }

    /// Ids carrying a refresh marker.
    pub fn refresh_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.refresh_ids()
    }

    /// Ids with a diff, in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.ids()
    }

    /// `(id, diff, version)` triples in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelDiff, Option<&VectorTimestamp>)> + '_ {
        self.inner
            .iter()
            .map(|(id, d)| (id.as_str(), d, self.versions.get(id)))
    }

    /// The untimed view of this collection.
    pub fn diffs(&self) -> &DiffCollection {
        &self.inner
    }

    /// Number of diffs.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when there are no diffs.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Merges `other` into `self`, overwriting entries and versions per id.
    pub fn merge_collection(&mut self, other: TimedDiffCollection) {
        for id in other.inner.ids() {
            match other.versions.get(id) {
                Some(v) => self.versions.insert(id.to_owned(), v.clone()),
                None => self.versions.remove(id),
            };
        }
        self.inner.merge_collection(other.inner);
    }

    /// Merges the entries of `other` that are not older than the current ones.
    ///
    /// An entry of `other` is skipped only when the entry already held for the
    /// same id is strictly after it; an untimed entry counts as the empty
    /// timestamp. Parallel and equal entries take the incoming diff. Refresh
    /// markers follow [`DiffCollection::merge_collection`].
    pub fn merge_newer_from(&mut self, other: &TimedDiffCollection) {
        let untimed = VectorTimestamp::default();
        for (id, diff, version) in other.iter() {
            if let Some(mine) = self.versions.get(id) {
                let theirs = version.unwrap_or(&untimed);
                if mine.relation_to(theirs) == CausalRelation::StrictlyAfter {
                    continue;
                }
            }
            let supersedes_remove =
                self.inner.get(id).is_some_and(ModelDiff::is_remove) && !diff.is_remove();
            if supersedes_remove || other.is_refresh(id) {
                self.inner.mark_refresh(id);
            }
            match version {
                Some(v) => self.put_diff(diff.clone(), v.clone()),
                None => self.put_local_diff(diff.clone()),
            }
        }
    }

    /// Sub-collection of entries matching `predicate`.
    pub fn filter(&self, predicate: impl FnMut(&ModelDiff) -> bool) -> TimedDiffCollection {
        let inner = self.inner.filter(predicate);
        let versions = inner
            .ids()
            .filter_map(|id| self.versions.get(id).map(|v| (id.to_owned(), v.clone())))
            .collect();
        TimedDiffCollection { inner, versions }
    }

    /// Sub-collection of entries whose element type matches any of `types`
    /// (subtype-aware).
    pub fn filter_by_element_types(&self, types: &[ElementType]) -> TimedDiffCollection {
        self.filter(|d| d.element_type().matches_any(types))
    }
}

impl From<DiffCollection> for TimedDiffCollection {
    fn from(diffs: DiffCollection) -> Self {
        diffs.into_timed()
    }
}

fn typed_get<'a>(
    diffs: &'a BTreeMap<String, ModelDiff>,
    reference: &ElementRef,
) -> Result<Option<&'a ModelDiff>, DiffError> {
    match diffs.get(reference.id()) {
        None => Ok(None),
        Some(diff) if diff.element_type().is_subtype_of(reference.ty()) => Ok(Some(diff)),
        Some(diff) => Err(DiffError::TypeMismatch {
            id: reference.id().to_owned(),
            expected: reference.ty(),
            actual: diff.element_type(),
        }),
    }
}
