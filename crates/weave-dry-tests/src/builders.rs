// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Builders for timed diff collections.

use weave_core::{DiffError, ModelDiff, SharedElement, TimedDiffCollection, VectorTimestamp};

/// Timestamp from `(source, counter)` pairs.
pub fn vt(entries: &[(&str, u64)]) -> VectorTimestamp {
    entries.iter().map(|(s, n)| (*s, *n)).collect()
}

/// Builder for [`TimedDiffCollection`].
///
/// # Example
///
/// ```
/// use weave_dry_tests::{vt, SimpleTestElement, TimedDiffBuilder};
///
/// let diffs = TimedDiffBuilder::new()
///     .add(SimpleTestElement::new("a", 1).shared(), &[("up", 1)])
///     .refresh("a")
///     .build();
/// assert_eq!(diffs.version_for("a"), Some(&vt(&[("up", 1)])));
/// assert!(diffs.is_refresh("a"));
/// ```
#[derive(Debug, Default)]
pub struct TimedDiffBuilder {
    diffs: TimedDiffCollection,
}

impl TimedDiffBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `element` at `version`.
    #[must_use]
    pub fn add(mut self, element: SharedElement, version: &[(&str, u64)]) -> Self {
        self.diffs.put_diff(ModelDiff::add(element), vt(version));
        self
    }

    /// Adds `element` without a timestamp.
    #[must_use]
    pub fn local_add(mut self, element: SharedElement) -> Self {
        self.diffs.put_local_diff(ModelDiff::add(element));
        self
    }

    /// Replaces `before` by `after` at `version`.
    ///
    /// # Errors
    /// Returns [`DiffError::ModifyMismatch`] if the two differ in id or type.
    pub fn modify(
        mut self,
        before: SharedElement,
        after: SharedElement,
        version: &[(&str, u64)],
    ) -> Result<Self, DiffError> {
        self.diffs
            .put_diff(ModelDiff::modify(before, after)?, vt(version));
        Ok(self)
    }

    /// Removes `element` at `version`.
    #[must_use]
    pub fn remove(mut self, element: SharedElement, version: &[(&str, u64)]) -> Self {
        self.diffs.put_diff(ModelDiff::remove(element), vt(version));
        self
    }

    /// Marks `id` for refresh.
    #[must_use]
    pub fn refresh(mut self, id: &str) -> Self {
        self.diffs.mark_refresh(id);
        self
    }

    /// Finished collection.
    pub fn build(self) -> TimedDiffCollection {
        self.diffs
    }
}
