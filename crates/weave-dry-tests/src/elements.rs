// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Simple element and relation kinds for tests.
//!
//! Every kind comes with a subtype and an unrelated sibling so tests can
//! exercise subtype-aware filters and queries.
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use weave_core::{
    relation_id, Element, ElementRef, ElementType, ModelError, Probability, RelationEndpoints,
    SharedElement, ELEMENT, ONE_TO_ONE_RELATION, RELATION,
};

/// Type of [`SimpleTestElement::new`].
pub const SIMPLE_TEST_ELEMENT: ElementType = ElementType::new("SimpleTestElement", &[ELEMENT]);
/// Subtype of [`SIMPLE_TEST_ELEMENT`].
pub const SIMPLE_SUBCLASS_TEST_ELEMENT: ElementType =
    ElementType::new("SimpleSubclassTestElement", &[SIMPLE_TEST_ELEMENT]);
/// Sibling of [`SIMPLE_TEST_ELEMENT`].
pub const OTHER_SIMPLE_TEST_ELEMENT: ElementType =
    ElementType::new("OtherSimpleTestElement", &[ELEMENT]);

/// Type of [`SimpleTestOneToOneRelation::new`].
pub const SIMPLE_TEST_ONE_TO_ONE_RELATION: ElementType =
    ElementType::new("SimpleTestOneToOneRelation", &[ONE_TO_ONE_RELATION]);
/// Subtype of [`SIMPLE_TEST_ONE_TO_ONE_RELATION`].
pub const SIMPLE_SUBCLASS_TEST_ONE_TO_ONE_RELATION: ElementType = ElementType::new(
    "SimpleSubclassTestOneToOneRelation",
    &[SIMPLE_TEST_ONE_TO_ONE_RELATION],
);
/// Sibling of [`SIMPLE_TEST_ONE_TO_ONE_RELATION`].
pub const OTHER_SIMPLE_TEST_ONE_TO_ONE_RELATION: ElementType =
    ElementType::new("OtherSimpleTestOneToOneRelation", &[ONE_TO_ONE_RELATION]);

/// Type of [`SimpleTestRelation`].
pub const SIMPLE_TEST_RELATION: ElementType = ElementType::new("SimpleTestRelation", &[RELATION]);

/// Reference to a [`SIMPLE_TEST_ELEMENT`] with `id`.
pub fn simple_ref(id: &str) -> ElementRef {
    ElementRef::new(id, SIMPLE_TEST_ELEMENT)
}

/// Element carrying one integer.
#[derive(Clone, Debug)]
pub struct SimpleTestElement {
    id: String,
    ty: ElementType,
    x: i64,
    probability: Option<Probability>,
}

impl SimpleTestElement {
    /// Element of [`SIMPLE_TEST_ELEMENT`].
    pub fn new(id: impl Into<String>, x: i64) -> Self {
        Self::of_type(SIMPLE_TEST_ELEMENT, id, x)
    }

    /// Element of [`SIMPLE_SUBCLASS_TEST_ELEMENT`].
    pub fn subclass(id: impl Into<String>, x: i64) -> Self {
        Self::of_type(SIMPLE_SUBCLASS_TEST_ELEMENT, id, x)
    }

    /// Element of [`OTHER_SIMPLE_TEST_ELEMENT`].
    pub fn other(id: impl Into<String>, x: i64) -> Self {
        Self::of_type(OTHER_SIMPLE_TEST_ELEMENT, id, x)
    }

    fn of_type(ty: ElementType, id: impl Into<String>, x: i64) -> Self {
        Self {
            id: id.into(),
            ty,
            x,
            probability: None,
        }
    }

    /// Payload.
    pub fn x(&self) -> i64 {
        self.x
    }

    /// Copy with a different payload.
    #[must_use]
    pub fn with_x(&self, x: i64) -> Self {
        Self { x, ..self.clone() }
    }

    /// Copy tagged [`Probability::Explicit`].
    #[must_use]
    pub fn explicit(mut self) -> Self {
        self.probability = Some(Probability::Explicit);
        self
    }

    /// Copy tagged [`Probability::Generated`].
    #[must_use]
    pub fn generated(mut self, p: f64) -> Self {
        self.probability = Some(Probability::generated(p));
        self
    }

    /// Shared handle.
    pub fn shared(self) -> SharedElement {
        Arc::new(self)
    }
}

impl Element for SimpleTestElement {
    fn id(&self) -> &str {
        &self.id
    }

    fn element_type(&self) -> ElementType {
        self.ty
    }

    fn probability(&self) -> Option<Probability> {
        self.probability
    }

    fn set_probability(&mut self, probability: Option<Probability>) {
        self.probability = probability;
    }

    fn copy(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }

    fn content_equivalent(&self, other: &dyn Element) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.ty == self.ty && o.x == self.x)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One-to-one relation without payload. Its id derives from its endpoints.
#[derive(Clone, Debug)]
pub struct SimpleTestOneToOneRelation {
    id: String,
    ty: ElementType,
    endpoints: RelationEndpoints,
    probability: Option<Probability>,
}

impl SimpleTestOneToOneRelation {
    /// Relation of [`SIMPLE_TEST_ONE_TO_ONE_RELATION`] between two
    /// [`SIMPLE_TEST_ELEMENT`]s.
    pub fn new(a: &str, b: &str, directed: bool) -> Self {
        Self::between(simple_ref(a), simple_ref(b), directed)
    }

    /// Relation of [`SIMPLE_TEST_ONE_TO_ONE_RELATION`] between typed endpoints.
    pub fn between(a: ElementRef, b: ElementRef, directed: bool) -> Self {
        Self::of_type(SIMPLE_TEST_ONE_TO_ONE_RELATION, a, b, directed)
    }

    /// Relation of [`SIMPLE_SUBCLASS_TEST_ONE_TO_ONE_RELATION`].
    pub fn subclass(a: ElementRef, b: ElementRef, directed: bool) -> Self {
        Self::of_type(SIMPLE_SUBCLASS_TEST_ONE_TO_ONE_RELATION, a, b, directed)
    }

    /// Relation of [`OTHER_SIMPLE_TEST_ONE_TO_ONE_RELATION`].
    pub fn other(a: ElementRef, b: ElementRef, directed: bool) -> Self {
        Self::of_type(OTHER_SIMPLE_TEST_ONE_TO_ONE_RELATION, a, b, directed)
    }

    /// Relation of an arbitrary one-to-one type.
    pub fn of_type(ty: ElementType, a: ElementRef, b: ElementRef, directed: bool) -> Self {
        Self {
            id: relation_id(ty, a.id(), b.id(), directed),
            ty,
            endpoints: RelationEndpoints::one_to_one(a, b, directed),
            probability: None,
        }
    }

    /// Copy tagged [`Probability::Explicit`].
    #[must_use]
    pub fn explicit(mut self) -> Self {
        self.probability = Some(Probability::Explicit);
        self
    }

    /// Shared handle.
    pub fn shared(self) -> SharedElement {
        Arc::new(self)
    }
}

impl Element for SimpleTestOneToOneRelation {
    fn id(&self) -> &str {
        &self.id
    }

    fn element_type(&self) -> ElementType {
        self.ty
    }

    fn probability(&self) -> Option<Probability> {
        self.probability
    }

    fn set_probability(&mut self, probability: Option<Probability>) {
        self.probability = probability;
    }

    fn copy(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }

    fn content_equivalent(&self, other: &dyn Element) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.ty == self.ty && o.endpoints.is_compatible_with(&self.endpoints))
    }

    fn relation(&self) -> Option<&RelationEndpoints> {
        Some(&self.endpoints)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Many-to-many relation with an explicit id and an integer payload.
#[derive(Clone, Debug)]
pub struct SimpleTestRelation {
    id: String,
    x: i64,
    endpoints: RelationEndpoints,
    probability: Option<Probability>,
}

impl SimpleTestRelation {
    /// Relation from every element of `a` to every element of `b`.
    ///
    /// # Errors
    /// Returns [`ModelError::MalformedRelation`] if a side is empty.
    pub fn new(
        id: impl Into<String>,
        x: i64,
        a: impl IntoIterator<Item = ElementRef>,
        b: impl IntoIterator<Item = ElementRef>,
        directed: bool,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        let a: BTreeSet<ElementRef> = a.into_iter().collect();
        let b: BTreeSet<ElementRef> = b.into_iter().collect();
        let endpoints = RelationEndpoints::new(&id, a, b, directed)?;
        Ok(Self {
            id,
            x,
            endpoints,
            probability: None,
        })
    }

    /// Payload.
    pub fn x(&self) -> i64 {
        self.x
    }

    /// Copy with a different payload.
    #[must_use]
    pub fn with_x(&self, x: i64) -> Self {
        Self { x, ..self.clone() }
    }

    /// Shared handle.
    pub fn shared(self) -> SharedElement {
        Arc::new(self)
    }
}

impl Element for SimpleTestRelation {
    fn id(&self) -> &str {
        &self.id
    }

    fn element_type(&self) -> ElementType {
        SIMPLE_TEST_RELATION
    }

    fn probability(&self) -> Option<Probability> {
        self.probability
    }

    fn set_probability(&mut self, probability: Option<Probability>) {
        self.probability = probability;
    }

    fn copy(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }

    fn content_equivalent(&self, other: &dyn Element) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.x == self.x && o.endpoints.is_compatible_with(&self.endpoints))
    }

    fn relation(&self) -> Option<&RelationEndpoints> {
        Some(&self.endpoints)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
