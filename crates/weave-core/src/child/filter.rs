// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filters composing a child repository.
use std::collections::BTreeMap;

use crate::element::SharedElement;
use crate::ident::{ElementRef, ElementType};

use super::reduction;
use super::FilterError;

/// Working set of a derivation: visible elements keyed by id.
pub(crate) type Included = BTreeMap<String, SharedElement>;

/// Whether matching elements are kept or dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    /// Keep matching elements, drop the rest.
    IncludeOnly,
    /// Drop matching elements.
    Exclude,
}

/// One step of a [`ChildRepoSpec`](super::ChildRepoSpec).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Elements whose type matches any of `types` (subtype-aware).
    ElementType {
        /// Include or exclude matches.
        mode: FilterMode,
        /// Matched types.
        types: Vec<ElementType>,
    },
    /// Relations of `relation_type` judged by the types of their endpoints.
    ///
    /// `IncludeOnly` keeps a relation when every endpoint on a constrained
    /// side has an allowed type. `Exclude` drops it as soon as one endpoint
    /// on a constrained side has one. `None` leaves a side unconstrained.
    RelationsWithEndpoints {
        /// Include or exclude conforming relations.
        mode: FilterMode,
        /// Relation type the filter applies to (subtype-aware).
        relation_type: ElementType,
        /// Allowed types of the "from" side.
        a_types: Option<Vec<ElementType>>,
        /// Allowed types of the "to" side.
        b_types: Option<Vec<ElementType>>,
    },
    /// Drops relations of `relation_type` implied by the others.
    TransitiveReduction {
        /// One-to-one relation type forming a DAG.
        relation_type: ElementType,
    },
}

impl Filter {
    /// Removes from `included` what this filter rejects.
    pub(crate) fn retain(&self, included: &mut Included) -> Result<(), FilterError> {
        match self {
            Self::ElementType { mode, types } => {
                let keep_matches = *mode == FilterMode::IncludeOnly;
                included.retain(|_, e| e.element_type().matches_any(types) == keep_matches);
            }
            Self::RelationsWithEndpoints {
                mode,
                relation_type,
                a_types,
                b_types,
            } => {
                let reject_matches = *mode == FilterMode::Exclude;
                let rejected: Vec<String> = included
                    .values()
                    .filter(|e| e.element_type().is_subtype_of(*relation_type))
                    .filter(|e| {
                        e.relation().is_some_and(|ep| {
                            side_rejects(included, ep.a_set(), a_types.as_deref(), reject_matches)
                                || side_rejects(
                                    included,
                                    ep.b_set(),
                                    b_types.as_deref(),
                                    reject_matches,
                                )
                        })
                    })
                    .map(|e| e.id().to_owned())
                    .collect();
                for id in rejected {
                    included.remove(&id);
                }
            }
            Self::TransitiveReduction { relation_type } => {
                for id in reduction::redundant_relations(included, *relation_type)? {
                    included.remove(&id);
                }
            }
        }
        Ok(())
    }
}

/// True when some endpoint on a constrained side decides rejection.
///
/// Exclude mode rejects on the first endpoint of an allowed type, include
/// mode on the first endpoint outside them. An unconstrained side never
/// rejects. Stored endpoints are judged by their runtime type, missing ones
/// by the declared reference type.
fn side_rejects<'a>(
    included: &Included,
    side: impl IntoIterator<Item = &'a ElementRef>,
    allowed: Option<&[ElementType]>,
    reject_matches: bool,
) -> bool {
    let Some(allowed) = allowed else {
        return false;
    };
    side.into_iter().any(|r| {
        included
            .get(r.id())
            .map_or(r.ty(), |e| e.element_type())
            .matches_any(allowed)
            == reject_matches
    })
}

/// Drops relations with an endpoint outside `included`, until stable.
pub(crate) fn close_over_endpoints(included: &mut Included) {
    loop {
        let dangling: Vec<String> = included
            .values()
            .filter(|e| {
                e.relation()
                    .is_some_and(|ep| ep.all_refs().any(|r| !included.contains_key(r.id())))
            })
            .map(|e| e.id().to_owned())
            .collect();
        if dangling.is_empty() {
            return;
        }
        for id in dangling {
            included.remove(&id);
        }
    }
}
