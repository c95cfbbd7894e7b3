// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Read-only filtered projections of a [`ModelRepository`].
//!
//! A [`ChildRepository`] derives the set of visible ids from its backing
//! repository by running the filters of its [`ChildRepoSpec`] in order. After
//! every filter, relations with an invisible endpoint are dropped as well, so
//! a view never exposes a dangling relation. The derived set is cached per
//! backing revision and recomputed in full on the next read after a change.
use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::element::SharedElement;
use crate::ident::{ElementType, ELEMENT};
use crate::repository::{ElementQueryResult, ModelRead, ModelRepository, RelationFilter};
use crate::time::VectorTimestamp;

mod filter;
mod reduction;

pub use filter::{Filter, FilterMode};

/// Errors raised while deriving a child view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Transitive reduction requested over a cyclic relation graph.
    #[error("relations of type {relation_type} form a cycle through {element}")]
    Cycle {
        /// Reduced relation type.
        relation_type: ElementType,
        /// An element on the cycle.
        element: String,
    },
}

/// Ordered filter list of a child repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChildRepoSpec {
    filters: Vec<Filter>,
}

impl ChildRepoSpec {
    /// Spec without filters; its view equals the backing repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an arbitrary filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Drops elements of any of `types`.
    #[must_use]
    pub fn exclude_types(self, types: impl IntoIterator<Item = ElementType>) -> Self {
        self.with_filter(Filter::ElementType {
            mode: FilterMode::Exclude,
            types: types.into_iter().collect(),
        })
    }

    /// Keeps only elements of any of `types`.
    #[must_use]
    pub fn include_only_types(self, types: impl IntoIterator<Item = ElementType>) -> Self {
        self.with_filter(Filter::ElementType {
            mode: FilterMode::IncludeOnly,
            types: types.into_iter().collect(),
        })
    }

    /// Includes or excludes relations of `relation_type` by endpoint types.
    #[must_use]
    pub fn relations_with_endpoints(
        self,
        mode: FilterMode,
        relation_type: ElementType,
        a_types: Option<Vec<ElementType>>,
        b_types: Option<Vec<ElementType>>,
    ) -> Self {
        self.with_filter(Filter::RelationsWithEndpoints {
            mode,
            relation_type,
            a_types,
            b_types,
        })
    }

    /// Transitively reduces relations of `relation_type`.
    #[must_use]
    pub fn transitive_reduction(self, relation_type: ElementType) -> Self {
        self.with_filter(Filter::TransitiveReduction { relation_type })
    }

    /// Filters in application order.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Ids visible under this spec.
    ///
    /// # Errors
    /// Returns [`FilterError::Cycle`] when a reduced relation type is cyclic.
    pub fn derive<R: ModelRead + ?Sized>(&self, repo: &R) -> Result<BTreeSet<String>, FilterError> {
        let mut included: filter::Included = repo
            .get_all_including_subtypes(ELEMENT)
            .into_iter()
            .collect();
        filter::close_over_endpoints(&mut included);
        for f in &self.filters {
            f.retain(&mut included)?;
            filter::close_over_endpoints(&mut included);
        }
        Ok(included.into_keys().collect())
    }
}

#[derive(Debug)]
struct Snapshot {
    source_id: String,
    revision: u64,
    included: Arc<BTreeSet<String>>,
}

/// Lazily recomputed child of a repository.
#[derive(Debug)]
pub struct ChildRepository {
    spec: ChildRepoSpec,
    cached: Option<Snapshot>,
}

impl ChildRepository {
    /// Child derived through `spec`.
    pub fn new(spec: ChildRepoSpec) -> Self {
        Self { spec, cached: None }
    }

    /// Filters of this child.
    pub fn spec(&self) -> &ChildRepoSpec {
        &self.spec
    }

    /// Drops the cached derivation.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// View over `repo`, recomputing the visible set if `repo` changed since
    /// the last call.
    ///
    /// # Errors
    /// Returns [`FilterError::Cycle`] when a reduced relation type is cyclic.
    pub fn view<'r>(&mut self, repo: &'r ModelRepository) -> Result<ChildView<'r>, FilterError> {
        if let Some(snapshot) = self
            .cached
            .as_ref()
            .filter(|s| s.revision == repo.revision() && s.source_id == repo.source_id())
        {
            return Ok(ChildView {
                repo,
                included: Arc::clone(&snapshot.included),
            });
        }
        let included = Arc::new(self.spec.derive(repo)?);
        debug!(
            revision = repo.revision(),
            visible = included.len(),
            "child view recomputed"
        );
        self.cached = Some(Snapshot {
            source_id: repo.source_id().to_owned(),
            revision: repo.revision(),
            included: Arc::clone(&included),
        });
        Ok(ChildView { repo, included })
    }
}

/// Read-only view of a repository through a derived visible set.
#[derive(Clone, Debug)]
pub struct ChildView<'r> {
    repo: &'r ModelRepository,
    included: Arc<BTreeSet<String>>,
}

impl ChildView<'_> {
    /// Number of visible elements.
    pub fn len(&self) -> usize {
        self.included.len()
    }

    /// True when nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    /// Visible ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.included.iter().map(String::as_str)
    }

    fn visible(&self, result: ElementQueryResult) -> ElementQueryResult {
        result.filter_ids(|id| self.included.contains(id))
    }
}

impl ModelRead for ChildView<'_> {
    fn get(&self, id: &str) -> Option<SharedElement> {
        if self.included.contains(id) {
            self.repo.get(id)
        } else {
            None
        }
    }

    fn elements_of_type(&self, ty: ElementType, include_subtypes: bool) -> ElementQueryResult {
        self.visible(self.repo.elements_of_type(ty, include_subtypes))
    }

    fn relations_from_element(&self, id: &str, filter: RelationFilter) -> ElementQueryResult {
        self.visible(self.repo.relations_from_element(id, filter))
    }

    fn relations_to_element(&self, id: &str, filter: RelationFilter) -> ElementQueryResult {
        self.visible(self.repo.relations_to_element(id, filter))
    }

    fn version(&self, id: &str) -> Option<VectorTimestamp> {
        if self.included.contains(id) {
            self.repo.version(id)
        } else {
            None
        }
    }
}
