// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Read contract shared by root repositories and child views.
use std::collections::{btree_map, BTreeMap, BTreeSet};

use crate::element::SharedElement;
use crate::ident::{ElementRef, ElementType, ModelError};
use crate::time::VectorTimestamp;

/// Relation type constraint for relation queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelationFilter {
    ty: Option<ElementType>,
    include_subtypes: bool,
}

impl RelationFilter {
    /// Matches every relation.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches relations of exactly `ty`.
    pub fn of(ty: ElementType) -> Self {
        Self {
            ty: Some(ty),
            include_subtypes: false,
        }
    }

    /// Matches relations of `ty` or any subtype.
    pub fn including_subtypes(ty: ElementType) -> Self {
        Self {
            ty: Some(ty),
            include_subtypes: true,
        }
    }

    /// True when a relation of type `ty` passes.
    pub fn matches(self, ty: ElementType) -> bool {
        match self.ty {
            None => true,
            Some(wanted) if self.include_subtypes => ty.is_subtype_of(wanted),
            Some(wanted) => ty == wanted,
        }
    }
}

/// Map of query results keyed by element id.
#[derive(Clone, Debug, Default)]
pub struct ElementQueryResult {
    elements: BTreeMap<String, SharedElement>,
}

impl ElementQueryResult {
    /// Empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Element with `id`.
    pub fn get(&self, id: &str) -> Option<&SharedElement> {
        self.elements.get(id)
    }

    /// Element for `reference` if present with a compatible type.
    pub fn get_ref(&self, reference: &ElementRef) -> Option<&SharedElement> {
        self.elements
            .get(reference.id())
            .filter(|e| e.element_type().is_subtype_of(reference.ty()))
    }

    /// True when `reference` resolves in this result.
    pub fn contains_ref(&self, reference: &ElementRef) -> bool {
        self.get_ref(reference).is_some()
    }

    /// True when `id` is present.
    pub fn contains_id(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.elements.keys().map(String::as_str)
    }

    /// `(id, element)` pairs in ascending id order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, SharedElement> {
        self.elements.iter()
    }

    /// Inserts an element under its id.
    pub fn insert(&mut self, element: SharedElement) {
        self.elements.insert(element.id().to_owned(), element);
    }

    /// Elements passing `predicate`.
    pub fn filter_values(self, mut predicate: impl FnMut(&SharedElement) -> bool) -> Self {
        Self {
            elements: self
                .elements
                .into_iter()
                .filter(|(_, e)| predicate(e))
                .collect(),
        }
    }

    /// Elements whose ids pass `predicate`.
    pub fn filter_ids(self, mut predicate: impl FnMut(&str) -> bool) -> Self {
        Self {
            elements: self
                .elements
                .into_iter()
                .filter(|(id, _)| predicate(id))
                .collect(),
        }
    }
}

impl IntoIterator for ElementQueryResult {
    type Item = (String, SharedElement);
    type IntoIter = btree_map::IntoIter<String, SharedElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl FromIterator<SharedElement> for ElementQueryResult {
    fn from_iter<I: IntoIterator<Item = SharedElement>>(iter: I) -> Self {
        let mut out = Self::new();
        for e in iter {
            out.insert(e);
        }
        out
    }
}

/// Side-effect-free queries over a set of elements and relations.
///
/// Relation lookups are index-backed in every implementation: their cost is
/// proportional to the relations touching the queried element.
pub trait ModelRead {
    /// Element with `id`.
    fn get(&self, id: &str) -> Option<SharedElement>;

    /// All elements of exactly `ty`, or of `ty` and its subtypes.
    fn elements_of_type(&self, ty: ElementType, include_subtypes: bool) -> ElementQueryResult;

    /// Relations having `id` on their "from" side (either side if undirected).
    fn relations_from_element(&self, id: &str, filter: RelationFilter) -> ElementQueryResult;

    /// Relations having `id` on their "to" side (either side if undirected).
    fn relations_to_element(&self, id: &str, filter: RelationFilter) -> ElementQueryResult;

    /// Last known version of `id`.
    fn version(&self, id: &str) -> Option<VectorTimestamp>;

    /// Element for `reference`; `None` on absence or type mismatch.
    fn get_ref(&self, reference: &ElementRef) -> Option<SharedElement> {
        self.get(reference.id())
            .filter(|e| e.element_type().is_subtype_of(reference.ty()))
    }

    /// Element for `reference`, failing on type mismatch.
    ///
    /// # Errors
    /// Returns [`ModelError::TypeMismatch`] if the stored element is not of the
    /// referenced type.
    fn get_checked(&self, reference: &ElementRef) -> Result<Option<SharedElement>, ModelError> {
        match self.get(reference.id()) {
            None => Ok(None),
            Some(e) => {
                e.narrow(reference.ty())?;
                Ok(Some(e))
            }
        }
    }

    /// True when `id` is stored.
    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// All elements of exactly `ty`.
    fn get_all(&self, ty: ElementType) -> ElementQueryResult {
        self.elements_of_type(ty, false)
    }

    /// All elements of `ty` and its subtypes.
    fn get_all_including_subtypes(&self, ty: ElementType) -> ElementQueryResult {
        self.elements_of_type(ty, true)
    }

    /// Relations touching `id` on either side.
    fn relations_adjacent_to_element(&self, id: &str, filter: RelationFilter) -> ElementQueryResult {
        let mut out = self.relations_from_element(id, filter);
        for (_, r) in self.relations_to_element(id, filter) {
            out.insert(r);
        }
        out
    }

    /// Relations leading from `from` to `to`.
    fn relations_between_elements(
        &self,
        from: &str,
        to: &str,
        filter: RelationFilter,
    ) -> ElementQueryResult {
        let incoming: BTreeSet<String> = self
            .relations_to_element(to, filter)
            .ids()
            .map(str::to_owned)
            .collect();
        self.relations_from_element(from, filter)
            .filter_ids(|id| incoming.contains(id))
    }

    /// The element plus everything reachable through relation endpoints.
    fn element_and_related(&self, reference: &ElementRef) -> ElementQueryResult {
        let mut out = ElementQueryResult::new();
        let mut stack = vec![reference.clone()];
        while let Some(next) = stack.pop() {
            if out.contains_id(next.id()) {
                continue;
            }
            let Some(element) = self.get_ref(&next) else {
                continue;
            };
            if let Some(endpoints) = element.relation() {
                stack.extend(endpoints.all_refs().cloned());
            }
            out.insert(element);
        }
        out
    }
}
