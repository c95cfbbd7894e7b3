// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Neighbour lookups through directed relations.
use thiserror::Error;

use crate::element::SharedElement;
use crate::ident::ElementType;

use super::read::{ElementQueryResult, ModelRead, RelationFilter};

/// Errors raised by single-neighbour lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// More than one neighbour matched.
    #[error("{id} has {count} neighbours through {relation_type}, expected at most one")]
    Ambiguous {
        /// Queried element.
        id: String,
        /// Relation type followed.
        relation_type: ElementType,
        /// Number of matches.
        count: usize,
    },
    /// An undirected relation has no "from" or "to" side.
    #[error("relation {0} is undirected")]
    Undirected(String),
}

#[derive(Clone, Copy)]
enum Side {
    From,
    To,
}

/// Elements reached from `id` by following matching relations forwards.
///
/// # Errors
/// Returns [`QueryError::Undirected`] if a matching relation is undirected.
pub fn elements_related_from<R: ModelRead + ?Sized>(
    repo: &R,
    id: &str,
    relation_type: ElementType,
    include_subtypes: bool,
) -> Result<ElementQueryResult, QueryError> {
    neighbours(repo, id, relation_type, include_subtypes, Side::From)
}

/// Elements reaching `id` through matching relations.
///
/// # Errors
/// Returns [`QueryError::Undirected`] if a matching relation is undirected.
pub fn elements_related_to<R: ModelRead + ?Sized>(
    repo: &R,
    id: &str,
    relation_type: ElementType,
    include_subtypes: bool,
) -> Result<ElementQueryResult, QueryError> {
    neighbours(repo, id, relation_type, include_subtypes, Side::To)
}

/// The single element reached from `id`, if any.
///
/// # Errors
/// Returns [`QueryError::Ambiguous`] on more than one match and
/// [`QueryError::Undirected`] if a matching relation is undirected.
pub fn element_related_from<R: ModelRead + ?Sized>(
    repo: &R,
    id: &str,
    relation_type: ElementType,
    include_subtypes: bool,
) -> Result<Option<SharedElement>, QueryError> {
    let found = elements_related_from(repo, id, relation_type, include_subtypes)?;
    at_most_one(id, relation_type, found)
}

/// The single element reaching `id`, if any.
///
/// # Errors
/// Returns [`QueryError::Ambiguous`] on more than one match and
/// [`QueryError::Undirected`] if a matching relation is undirected.
pub fn element_related_to<R: ModelRead + ?Sized>(
    repo: &R,
    id: &str,
    relation_type: ElementType,
    include_subtypes: bool,
) -> Result<Option<SharedElement>, QueryError> {
    let found = elements_related_to(repo, id, relation_type, include_subtypes)?;
    at_most_one(id, relation_type, found)
}

fn neighbours<R: ModelRead + ?Sized>(
    repo: &R,
    id: &str,
    relation_type: ElementType,
    include_subtypes: bool,
    side: Side,
) -> Result<ElementQueryResult, QueryError> {
    let filter = if include_subtypes {
        RelationFilter::including_subtypes(relation_type)
    } else {
        RelationFilter::of(relation_type)
    };
    let relations = match side {
        Side::From => repo.relations_from_element(id, filter),
        Side::To => repo.relations_to_element(id, filter),
    };
    let mut out = ElementQueryResult::new();
    for (relation_id, relation) in relations {
        let Some(endpoints) = relation.relation() else {
            continue;
        };
        if !endpoints.is_directed() {
            return Err(QueryError::Undirected(relation_id));
        }
        let far_side = match side {
            Side::From => endpoints.b_set(),
            Side::To => endpoints.a_set(),
        };
        for reference in far_side {
            if let Some(element) = repo.get_ref(reference) {
                out.insert(element);
            }
        }
    }
    Ok(out)
}

fn at_most_one(
    id: &str,
    relation_type: ElementType,
    found: ElementQueryResult,
) -> Result<Option<SharedElement>, QueryError> {
    if found.len() > 1 {
        return Err(QueryError::Ambiguous {
            id: id.to_owned(),
            relation_type,
            count: found.len(),
        });
    }
    Ok(found.into_iter().next().map(|(_, e)| e))
}
