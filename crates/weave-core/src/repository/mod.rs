// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Versioned element and relation store.
//!
//! Relations are stored as ordinary elements and additionally indexed by
//! their endpoints: `relations_from[x]` holds every relation with `x` on its
//! "from" side, `relations_to[x]` every relation with `x` on its "to" side.
//! Undirected relations are indexed under both sides in both maps.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::collection::TimedDiffCollection;
use crate::diff::{DiffError, ModelDiff};
use crate::element::{Probability, RelationEndpoints, SharedElement};
use crate::ident::{ElementType, ModelError};
use crate::time::VectorTimestamp;
use crate::version::{VersionError, VersionManager};

mod pending;
pub mod queries;
mod read;

pub use read::{ElementQueryResult, ModelRead, RelationFilter};

use pending::PendingRelations;

/// Errors returned by repository writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// An element was stored under an id already used by another type.
    #[error("element {id} is stored as {stored}, cannot replace it with a {incoming}")]
    TypeChanged {
        /// Element id.
        id: String,
        /// Type currently stored.
        stored: ElementType,
        /// Type of the rejected element.
        incoming: ElementType,
    },
    /// A relation tried to change its endpoints or directedness.
    #[error("relation {0} cannot change its endpoints or directedness")]
    EndpointsChanged(String),
    /// A versioned write was older than the stored version.
    #[error("stored version of {id} is newer than {timestamp}")]
    StaleVersion {
        /// Element id.
        id: String,
        /// Rejected timestamp.
        timestamp: VectorTimestamp,
    },
    /// Clock violation.
    #[error(transparent)]
    Version(#[from] VersionError),
    /// Diff construction failure.
    #[error(transparent)]
    Diff(#[from] DiffError),
    /// Type or relation contract violation.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Root repository owned by one component.
///
/// Mutated only through [`store`](Self::store) and [`remove`](Self::remove)
/// (and their versioned variants); every write returns the diffs it caused.
#[derive(Debug)]
pub struct ModelRepository {
    elements: BTreeMap<String, SharedElement>,
    by_type: BTreeMap<ElementType, BTreeSet<String>>,
    relations_from: BTreeMap<String, BTreeSet<String>>,
    relations_to: BTreeMap<String, BTreeSet<String>>,
    pending: PendingRelations,
    versions: VersionManager,
    revision: u64,
}

impl Default for ModelRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRepository {
    /// Empty repository with a random source id.
    pub fn new() -> Self {
        Self::with_versions(VersionManager::with_random_source())
    }

    /// Empty repository issuing local timestamps under `source_id`.
    pub fn with_source_id(source_id: impl Into<String>) -> Self {
        Self::with_versions(VersionManager::new(source_id))
    }

    fn with_versions(versions: VersionManager) -> Self {
        Self {
            elements: BTreeMap::new(),
            by_type: BTreeMap::new(),
            relations_from: BTreeMap::new(),
            relations_to: BTreeMap::new(),
            pending: PendingRelations::default(),
            versions,
            revision: 0,
        }
    }

    /// Source id used for local writes.
    pub fn source_id(&self) -> &str {
        self.versions.source_id()
    }

    /// Clock and version table.
    pub fn version_manager(&self) -> &VersionManager {
        &self.versions
    }

    /// Counter bumped by every effective mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of stored elements (relations included, pending excluded).
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of relations waiting for endpoints.
    pub fn pending_relation_count(&self) -> usize {
        self.pending.len()
    }

    /// True when relation `id` waits for endpoints.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    /// Stores `element` as a local change.
    ///
    /// Returns an empty collection if an equivalent element is already
    /// stored. Relations with missing endpoints are parked and inserted once
    /// their endpoints arrive.
    ///
    /// # Errors
    /// See [`RepositoryError`].
    pub fn store(&mut self, element: SharedElement) -> Result<TimedDiffCollection, RepositoryError> {
        self.store_with(element, None)
    }

    /// Stores `element` as written at `version`.
    ///
    /// # Errors
    /// Fails with [`RepositoryError::StaleVersion`] if the stored version is
    /// strictly after `version`.
    pub fn store_at(
        &mut self,
        element: SharedElement,
        version: VectorTimestamp,
    ) -> Result<TimedDiffCollection, RepositoryError> {
        self.store_with(element, Some(version))
    }

    /// Stores `element` at `version`, or as a local change when `None`.
    ///
    /// # Errors
    /// See [`RepositoryError`].
    pub fn store_with(
        &mut self,
        element: SharedElement,
        version: Option<VectorTimestamp>,
    ) -> Result<TimedDiffCollection, RepositoryError> {
        let mut out = TimedDiffCollection::new();
        self.store_inner(element, version, &mut out)?;
        Ok(out)
    }

    /// Removes `id` and, transitively, every relation referencing it.
    ///
    /// # Errors
    /// See [`RepositoryError`].
    pub fn remove(&mut self, id: &str) -> Result<TimedDiffCollection, RepositoryError> {
        self.remove_with(id, None)
    }

    /// Removes `id` as written at `version`.
    ///
    /// # Errors
    /// Fails with [`RepositoryError::StaleVersion`] if the stored version is
    /// strictly after `version`.
    pub fn remove_at(
        &mut self,
        id: &str,
        version: VectorTimestamp,
    ) -> Result<TimedDiffCollection, RepositoryError> {
        self.remove_with(id, Some(version))
    }

    /// Removes `id` at `version`, or as a local change when `None`.
    ///
    /// Cascaded relation removals carry the relation's own version.
    ///
    /// # Errors
    /// See [`RepositoryError`].
    pub fn remove_with(
        &mut self,
        id: &str,
        version: Option<VectorTimestamp>,
    ) -> Result<TimedDiffCollection, RepositoryError> {
        let mut out = TimedDiffCollection::new();
        self.remove_inner(id, version, true, &mut out)?;
        if out.len() > 1 {
            debug!(id, removed = out.len(), "cascading removal");
        }
        Ok(out)
    }

    /// Current state of `id` and its adjacent relations as Add diffs, each
    /// marked for refresh.
    pub fn refresh(&self, id: &str) -> TimedDiffCollection {
        let mut out = TimedDiffCollection::new();
        let Some(element) = self.elements.get(id) else {
            return out;
        };
        let mut ids: BTreeSet<&str> = self.adjacent_relation_ids(id).collect();
        ids.insert(element.id());
        for rid in ids {
            if let Some(e) = self.elements.get(rid) {
                out.put_diff(ModelDiff::add(Arc::clone(e)), self.version_or_empty(rid));
                out.mark_refresh(rid);
            }
        }
        out
    }

    /// Tags the stored element `id` as [`Probability::Explicit`] without
    /// touching its version. Empty when absent or already explicit.
    pub fn promote_to_explicit(&mut self, id: &str) -> TimedDiffCollection {
        let mut out = TimedDiffCollection::new();
        let Some(old) = self.elements.get(id).cloned() else {
            return out;
        };
        if old.probability().is_some_and(Probability::is_explicit) {
            return out;
        }
        let promoted = old.with_probability(Some(Probability::Explicit));
        self.elements.insert(id.to_owned(), Arc::clone(&promoted));
        self.revision += 1;
        if let Ok(diff) = ModelDiff::modify(old, promoted) {
            out.put_diff(diff, self.version_or_empty(id));
        }
        out
    }

    /// Every stored element as an Add diff at its version.
    pub fn dump(&self) -> TimedDiffCollection {
        let mut out = TimedDiffCollection::new();
        for (id, element) in &self.elements {
            out.put_diff(ModelDiff::add(Arc::clone(element)), self.version_or_empty(id));
        }
        out
    }

    /// Removes everything as local changes and drops pending relations.
    ///
    /// # Errors
    /// See [`RepositoryError`].
    pub fn clear(&mut self) -> Result<TimedDiffCollection, RepositoryError> {
        let mut out = TimedDiffCollection::new();
        let ids: Vec<String> = self.elements.keys().cloned().collect();
        for id in ids {
            if self.elements.contains_key(&id) {
                self.remove_inner(&id, None, true, &mut out)?;
            }
        }
        self.pending.clear();
        Ok(out)
    }

    fn store_inner(
        &mut self,
        element: SharedElement,
        version: Option<VectorTimestamp>,
        out: &mut TimedDiffCollection,
    ) -> Result<(), RepositoryError> {
        if element.element_type().is_relation() != element.relation().is_some() {
            return Err(ModelError::MalformedRelation {
                id: element.id().to_owned(),
                reason: "relation types must expose endpoints and only they may",
            }
            .into());
        }
        let missing = match element.relation() {
            Some(endpoints) => self.missing_endpoints(element.id(), endpoints)?,
            None => BTreeSet::new(),
        };
        if !missing.is_empty() {
            let id = element.id().to_owned();
            trace!(relation = %id, missing = missing.len(), "parking relation");
            if !self.pending.park(element, version.clone(), missing) {
                return Err(RepositoryError::StaleVersion {
                    id,
                    timestamp: version.unwrap_or_default(),
                });
            }
            return Ok(());
        }
        self.write_element(element, version, out)
    }

    /// Endpoint ids not stored yet; empty for relations already stored.
    fn missing_endpoints(
        &self,
        id: &str,
        endpoints: &RelationEndpoints,
    ) -> Result<BTreeSet<String>, RepositoryError> {
        if let Some(old) = self.elements.get(id) {
            if let Some(old_endpoints) = old.relation() {
                if !old_endpoints.is_compatible_with(endpoints) {
                    return Err(RepositoryError::EndpointsChanged(id.to_owned()));
                }
            }
            return Ok(BTreeSet::new());
        }
        let mut missing = BTreeSet::new();
        for reference in endpoints.all_refs() {
            match self.elements.get(reference.id()) {
                Some(stored) => {
                    stored.narrow(reference.ty())?;
                }
                None => {
                    missing.insert(reference.id().to_owned());
                }
            }
        }
        Ok(missing)
    }

    fn write_element(
        &mut self,
        element: SharedElement,
        version: Option<VectorTimestamp>,
        out: &mut TimedDiffCollection,
    ) -> Result<(), RepositoryError> {
        let id = element.id().to_owned();
        let ty = element.element_type();
        let previous = self.elements.get(&id).cloned();
        let is_new = previous.is_none();

        let (diff, element) = match previous {
            Some(old) => {
                if old.element_type() != ty {
                    return Err(RepositoryError::TypeChanged {
                        id,
                        stored: old.element_type(),
                        incoming: ty,
                    });
                }
                let keeps_explicit = old.probability().is_some_and(Probability::is_explicit)
                    && !element.probability().is_some_and(Probability::is_explicit);
                let element = if keeps_explicit {
                    element.with_probability(Some(Probability::Explicit))
                } else {
                    element
                };
                if old.equivalent(&*element) {
                    return Ok(());
                }
                (ModelDiff::modify(old, Arc::clone(&element))?, element)
            }
            None => (ModelDiff::add(Arc::clone(&element)), element),
        };

        let stamp = self.stamp(&id, version)?;
        out.put_diff(diff, stamp);

        if is_new {
            self.by_type.entry(ty).or_default().insert(id.clone());
            if let Some(endpoints) = element.relation() {
                self.index_relation(&id, endpoints);
            }
        }
        self.elements.insert(id.clone(), element);
        self.revision += 1;

        if is_new {
            self.pending.discard(&id);
            for (relation, parked_version) in self.pending.on_element_insert(&id) {
                self.store_inner(relation, parked_version, out)?;
            }
        }
        Ok(())
    }

    fn remove_inner(
        &mut self,
        id: &str,
        version: Option<VectorTimestamp>,
        restamp: bool,
        out: &mut TimedDiffCollection,
    ) -> Result<(), RepositoryError> {
        let Some(element) = self.elements.get(id).cloned() else {
            self.pending.on_element_remove(id);
            return Ok(());
        };

        let stamp = if restamp {
            self.stamp(id, version)?
        } else {
            self.version_or_empty(id)
        };

        let adjacent: Vec<String> = self.adjacent_relation_ids(id).map(str::to_owned).collect();
        for relation_id in adjacent {
            if self.elements.contains_key(&relation_id) {
                self.remove_inner(&relation_id, None, false, out)?;
            }
        }

        if let Some(endpoints) = element.relation() {
            self.unindex_relation(id, endpoints);
        }
        self.relations_from.remove(id);
        self.relations_to.remove(id);
        self.elements.remove(id);
        let ty = element.element_type();
        if let Some(ids) = self.by_type.get_mut(&ty) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_type.remove(&ty);
            }
        }
        self.pending.on_element_remove(id);
        self.revision += 1;

        out.put_diff(ModelDiff::remove(element), stamp);
        Ok(())
    }

    /// New version of `id` after a write.
    fn stamp(
        &mut self,
        id: &str,
        version: Option<VectorTimestamp>,
    ) -> Result<VectorTimestamp, RepositoryError> {
        match version {
            Some(timestamp) => {
                if !self.versions.update_version(id, &timestamp)? {
                    return Err(RepositoryError::StaleVersion {
                        id: id.to_owned(),
                        timestamp,
                    });
                }
                Ok(self.versions.version_of(id).cloned().unwrap_or(timestamp))
            }
            None => {
                self.versions.register_local_event();
                Ok(self.versions.mark_element_updated(id))
            }
        }
    }

    fn version_or_empty(&self, id: &str) -> VectorTimestamp {
        self.versions.version_of(id).cloned().unwrap_or_default()
    }

    fn adjacent_relation_ids<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let from = self.relations_from.get(id).into_iter().flatten();
        let to = self.relations_to.get(id).into_iter().flatten();
        from.chain(to)
            .map(String::as_str)
            .filter(move |rid| *rid != id)
            .collect::<BTreeSet<_>>()
            .into_iter()
    }

    fn index_relation(&mut self, id: &str, endpoints: &RelationEndpoints) {
        let directed = endpoints.is_directed();
        for a in endpoints.a_set() {
            insert_index(&mut self.relations_from, a.id(), id);
            if !directed {
                insert_index(&mut self.relations_to, a.id(), id);
            }
        }
        for b in endpoints.b_set() {
            insert_index(&mut self.relations_to, b.id(), id);
            if !directed {
                insert_index(&mut self.relations_from, b.id(), id);
            }
        }
    }

    fn unindex_relation(&mut self, id: &str, endpoints: &RelationEndpoints) {
        for endpoint in endpoints.all_refs() {
            remove_index(&mut self.relations_from, endpoint.id(), id);
            remove_index(&mut self.relations_to, endpoint.id(), id);
        }
    }

    fn collect_relations(
        &self,
        index: &BTreeMap<String, BTreeSet<String>>,
        id: &str,
        filter: RelationFilter,
    ) -> ElementQueryResult {
        index
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.elements.get(rid))
            .filter(|r| filter.matches(r.element_type()))
            .cloned()
            .collect()
    }
}

fn insert_index(index: &mut BTreeMap<String, BTreeSet<String>>, key: &str, relation_id: &str) {
    index
        .entry(key.to_owned())
        .or_default()
        .insert(relation_id.to_owned());
}

fn remove_index(index: &mut BTreeMap<String, BTreeSet<String>>, key: &str, relation_id: &str) {
    if let Some(set) = index.get_mut(key) {
        set.remove(relation_id);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

impl ModelRead for ModelRepository {
    fn get(&self, id: &str) -> Option<SharedElement> {
        self.elements.get(id).cloned()
    }

    fn elements_of_type(&self, ty: ElementType, include_subtypes: bool) -> ElementQueryResult {
        self.by_type
            .iter()
            .filter(|(stored, _)| {
                if include_subtypes {
                    stored.is_subtype_of(ty)
                } else {
                    **stored == ty
                }
            })
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| self.elements.get(id).cloned())
            .collect()
    }

    fn relations_from_element(&self, id: &str, filter: RelationFilter) -> ElementQueryResult {
        self.collect_relations(&self.relations_from, id, filter)
    }

    fn relations_to_element(&self, id: &str, filter: RelationFilter) -> ElementQueryResult {
        self.collect_relations(&self.relations_to, id, filter)
    }

    fn version(&self, id: &str) -> Option<VectorTimestamp> {
        self.versions
            .version_of(id)
            .or_else(|| self.pending.version_of(id))
            .cloned()
    }
}
