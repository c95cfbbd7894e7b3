// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Single-element changes.
use thiserror::Error;

use crate::element::SharedElement;
use crate::ident::{ElementRef, ElementType};

/// Errors raised while building or reading diffs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    /// A Modify diff was built from two different elements.
    #[error("modify diff mismatch: before {before}, after {after}")]
    ModifyMismatch {
        /// State before the change.
        before: ElementRef,
        /// State after the change.
        after: ElementRef,
    },
    /// A typed lookup found a diff for an element of another type.
    #[error("diff for {id} affects a {actual}, expected {expected}")]
    TypeMismatch {
        /// Element id.
        id: String,
        /// Requested type.
        expected: ElementType,
        /// Type of the affected element.
        actual: ElementType,
    },
}

/// Discriminant of a [`ModelDiff`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiffKind {
    /// Element was inserted.
    Add,
    /// Element was replaced.
    Modify,
    /// Element was removed.
    Remove,
}

/// One change to one element.
#[derive(Clone, Debug)]
pub enum ModelDiff {
    /// Element was inserted.
    Add(SharedElement),
    /// Element was replaced; `before` and `after` share id and type.
    Modify {
        /// Previous state.
        before: SharedElement,
        /// New state.
        after: SharedElement,
    },
    /// Element was removed; carries the removed state.
    Remove(SharedElement),
}

impl ModelDiff {
    /// Add diff.
    pub fn add(element: SharedElement) -> Self {
        Self::Add(element)
    }

    /// Modify diff.
    ///
    /// # Errors
    /// Returns [`DiffError::ModifyMismatch`] if `before` and `after` differ in
    /// id or runtime type.
    pub fn modify(before: SharedElement, after: SharedElement) -> Result<Self, DiffError> {
        if before.id() != after.id() || before.element_type() != after.element_type() {
            return Err(DiffError::ModifyMismatch {
                before: before.reference(),
                after: after.reference(),
            });
        }
        Ok(Self::Modify { before, after })
    }

    /// Remove diff.
    pub fn remove(element: SharedElement) -> Self {
        Self::Remove(element)
    }

    /// Post-operation state (the removed state for Remove).
    pub fn affected(&self) -> &SharedElement {
        match self {
            Self::Add(e) | Self::Remove(e) => e,
            Self::Modify { after, .. } => after,
        }
    }

    /// Id of the affected element.
    pub fn id(&self) -> &str {
        self.affected().id()
    }

    /// Runtime type of the affected element.
    pub fn element_type(&self) -> ElementType {
        self.affected().element_type()
    }

    /// Typed handle to the affected element.
    pub fn reference(&self) -> ElementRef {
        self.affected().reference()
    }

    /// Variant discriminant.
    pub fn kind(&self) -> DiffKind {
        match self {
            Self::Add(_) => DiffKind::Add,
            Self::Modify { .. } => DiffKind::Modify,
            Self::Remove(_) => DiffKind::Remove,
        }
    }

    /// True for Remove diffs.
    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove(_))
    }
}
