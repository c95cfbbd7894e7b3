// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The element contract shared by every stored fact.
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::ident::{ElementRef, ElementType, ModelError};

/// Provenance tag of an element.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Probability {
    /// Asserted by a user; never downgraded by derived updates.
    Explicit,
    /// Derived with the given confidence in `[0, 1]`.
    Generated(f64),
}

impl Probability {
    /// Generated probability clamped into `[0, 1]`. `NaN` maps to `0`.
    pub fn generated(p: f64) -> Self {
        if p.is_nan() {
            Self::Generated(0.0)
        } else {
            Self::Generated(p.clamp(0.0, 1.0))
        }
    }

    /// True for [`Probability::Explicit`].
    pub fn is_explicit(self) -> bool {
        matches!(self, Self::Explicit)
    }
}

/// Shared, immutable handle to a stored element.
pub type SharedElement = Arc<dyn Element>;

/// Contract implemented by every element and relation kind.
///
/// Elements are immutable once shared; mutation goes through [`Element::copy`]
/// followed by [`Element::set_probability`] or a kind-specific setter.
/// Identity is `(element_type, id)`; structural comparison is
/// [`Element::content_equivalent`].
pub trait Element: fmt::Debug + Send + Sync + 'static {
    /// Unique id within a repository.
    fn id(&self) -> &str;

    /// Runtime type descriptor.
    fn element_type(&self) -> ElementType;

    /// Provenance tag, if any.
    fn probability(&self) -> Option<Probability>;

    /// Replaces the provenance tag.
    fn set_probability(&mut self, probability: Option<Probability>);

    /// Deep, independent clone.
    fn copy(&self) -> Box<dyn Element>;

    /// True iff all fields except id and probability match.
    fn content_equivalent(&self, other: &dyn Element) -> bool;

    /// Endpoints when this element is a relation.
    fn relation(&self) -> Option<&RelationEndpoints> {
        None
    }

    /// Downcasting hook.
    fn as_any(&self) -> &dyn Any;

    /// Content equivalence plus equal probability.
    fn equivalent(&self, other: &dyn Element) -> bool {
        self.probability() == other.probability() && self.content_equivalent(other)
    }

    /// Typed handle to this element.
    fn reference(&self) -> ElementRef {
        ElementRef::new(self.id(), self.element_type())
    }
}

impl dyn Element {
    /// Downcasts to a concrete element kind.
    pub fn downcast_ref<T: Element>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns a shared copy carrying `probability`.
    pub fn with_probability(&self, probability: Option<Probability>) -> SharedElement {
        let mut copy = self.copy();
        copy.set_probability(probability);
        Arc::from(copy)
    }

    /// Checked narrowing of an element to `ty`.
    ///
    /// # Errors
    /// Returns [`ModelError::TypeMismatch`] if the runtime type is not a
    /// subtype of `ty`.
    pub fn narrow(&self, ty: ElementType) -> Result<&Self, ModelError> {
        if self.element_type().is_subtype_of(ty) {
            Ok(self)
        } else {
            Err(ModelError::TypeMismatch {
                id: self.id().to_owned(),
                expected: ty,
                actual: self.element_type(),
            })
        }
    }
}

/// Wraps a concrete element into a [`SharedElement`].
pub fn shared<E: Element>(element: E) -> SharedElement {
    Arc::new(element)
}

/// Endpoint sets of a relation.
///
/// Relations refer to their endpoints by [`ElementRef`] only. For undirected
/// relations `a_set` and `b_set` are interchangeable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationEndpoints {
    a_set: BTreeSet<ElementRef>,
    b_set: BTreeSet<ElementRef>,
    directed: bool,
}

impl RelationEndpoints {
    /// Builds endpoints from explicit sets.
    ///
    /// # Errors
    /// Returns [`ModelError::MalformedRelation`] if either side is empty.
    pub fn new(
        id: &str,
        a_set: BTreeSet<ElementRef>,
        b_set: BTreeSet<ElementRef>,
        directed: bool,
    ) -> Result<Self, ModelError> {
        if a_set.is_empty() || b_set.is_empty() {
            return Err(ModelError::MalformedRelation {
                id: id.to_owned(),
                reason: "relation sides must not be empty",
            });
        }
        Ok(Self {
            a_set,
            b_set,
            directed,
        })
    }

    /// Endpoints of a one-to-one relation.
    pub fn one_to_one(a: ElementRef, b: ElementRef, directed: bool) -> Self {
        Self {
            a_set: BTreeSet::from([a]),
            b_set: BTreeSet::from([b]),
            directed,
        }
    }

    /// "From" side.
    pub fn a_set(&self) -> &BTreeSet<ElementRef> {
        &self.a_set
    }

    /// "To" side.
    pub fn b_set(&self) -> &BTreeSet<ElementRef> {
        &self.b_set
    }

    /// Whether `(a, b)` differs from `(b, a)`.
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// The single `a` endpoint of a one-to-one relation.
    pub fn a(&self) -> Option<&ElementRef> {
        single(&self.a_set)
    }

    /// The single `b` endpoint of a one-to-one relation.
    pub fn b(&self) -> Option<&ElementRef> {
        single(&self.b_set)
    }

    /// Both sides, `a_set` first. An id may appear twice.
    pub fn all_refs(&self) -> impl Iterator<Item = &ElementRef> + '_ {
        self.a_set.iter().chain(self.b_set.iter())
    }

    /// True when `id` is an endpoint on either side.
    pub fn contains(&self, id: &str) -> bool {
        self.all_refs().any(|r| r.id() == id)
    }

    /// True when `other` may replace `self` under the same relation id:
    /// identical sides and directedness, or an undirected side swap.
    pub fn is_compatible_with(&self, other: &RelationEndpoints) -> bool {
        if self.directed != other.directed {
            return false;
        }
        if self.a_set == other.a_set && self.b_set == other.b_set {
            return true;
        }
        !self.directed && self.a_set == other.b_set && self.b_set == other.a_set
    }
}

fn single(set: &BTreeSet<ElementRef>) -> Option<&ElementRef> {
    if set.len() == 1 {
        set.iter().next()
    } else {
        None
    }
}
