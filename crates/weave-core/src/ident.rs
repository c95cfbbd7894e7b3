// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Element type descriptors, typed references and deterministic relation ids.
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash as StdHash, Hasher as StdHasher};
use std::sync::Mutex;

use blake3::Hasher;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Canonical 256-bit hash used for type keys.
pub type Hash = [u8; 32];

/// Static descriptor of an element kind.
///
/// Types form a DAG through their declared supertypes. Equality, ordering and
/// hashing use the name only, so names must be unique within a process (the
/// [`TypeRegistry`] enforces this for registered types).
///
/// Declare concrete kinds as constants:
///
/// ```
/// use weave_core::{ElementType, ELEMENT};
///
/// const NOTE: ElementType = ElementType::new("Note", &[ELEMENT]);
/// assert!(NOTE.is_subtype_of(ELEMENT));
/// ```
#[derive(Clone, Copy)]
pub struct ElementType {
    name: &'static str,
    supertypes: &'static [ElementType],
}

/// Root of the type hierarchy; every element kind is a subtype.
pub const ELEMENT: ElementType = ElementType::new("Element", &[]);
/// Root of all relation kinds.
pub const RELATION: ElementType = ElementType::new("Relation", &[ELEMENT]);
/// Relations with exactly one `a` and one `b` endpoint.
pub const ONE_TO_ONE_RELATION: ElementType = ElementType::new("OneToOneRelation", &[RELATION]);

impl ElementType {
    /// Declares a type with the given direct supertypes.
    pub const fn new(name: &'static str, supertypes: &'static [ElementType]) -> Self {
        Self { name, supertypes }
    }

    /// Unique type name.
    pub fn name(self) -> &'static str {
        self.name
    }

    /// Direct supertypes as declared.
    pub fn supertypes(self) -> &'static [ElementType] {
        self.supertypes
    }

    /// Reflexive, transitive subtype check.
    pub fn is_subtype_of(self, other: ElementType) -> bool {
        self == other || self.supertypes.iter().any(|s| s.is_subtype_of(other))
    }

    /// True when this type is a subtype of any of `candidates`.
    pub fn matches_any(self, candidates: &[ElementType]) -> bool {
        candidates.iter().any(|c| self.is_subtype_of(*c))
    }

    /// True for [`RELATION`] and all of its subtypes.
    pub fn is_relation(self) -> bool {
        self.is_subtype_of(RELATION)
    }

    /// Domain-separated key for this type (`blake3("type:" || name)`).
    pub fn key(self) -> TypeKey {
        make_type_key(self.name)
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ElementType {}

impl PartialOrd for ElementType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ElementType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name)
    }
}

impl StdHash for ElementType {
    fn hash<H: StdHasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ElementType").field(&self.name).finish()
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Strongly typed key for an [`ElementType`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TypeKey(pub Hash);

/// Produces a stable, domain-separated type key (prefix `b"type:"`) using BLAKE3.
pub fn make_type_key(name: &str) -> TypeKey {
    let mut hasher = Hasher::new();
    hasher.update(b"type:");
    hasher.update(name.as_bytes());
    TypeKey(hasher.finalize().into())
}

/// Errors raised by reference narrowing and relation construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A reference or element was narrowed to a type it does not have.
    #[error("element {id} is a {actual}, expected {expected}")]
    TypeMismatch {
        /// Id of the offending element.
        id: String,
        /// Type requested by the caller.
        expected: ElementType,
        /// Runtime type of the element.
        actual: ElementType,
    },
    /// Relation endpoints were malformed (e.g. an empty side).
    #[error("malformed relation {id}: {reason}")]
    MalformedRelation {
        /// Relation id.
        id: String,
        /// Human-readable reason.
        reason: &'static str,
    },
    /// A type name was registered twice with different descriptors.
    #[error("type name {0} is already registered")]
    DuplicateType(&'static str),
}

/// Typed handle to an element: `(id, type)`.
///
/// References never hold the referent, so they stay valid across diff
/// boundaries and threads.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementRef {
    id: String,
    ty: ElementType,
}

impl ElementRef {
    /// Creates a reference to `id` typed as `ty`.
    pub fn new(id: impl Into<String>, ty: ElementType) -> Self {
        Self { id: id.into(), ty }
    }

    /// Referenced element id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runtime type recorded in this reference.
    pub fn ty(&self) -> ElementType {
        self.ty
    }

    /// True when the referenced type is `ty` or one of its subtypes.
    pub fn references_type(&self, ty: ElementType) -> bool {
        self.ty.is_subtype_of(ty)
    }

    /// Narrows this reference to `ty`.
    ///
    /// # Errors
    /// Returns [`ModelError::TypeMismatch`] if the referenced type is not a
    /// subtype of `ty`.
    pub fn narrow(&self, ty: ElementType) -> Result<ElementRef, ModelError> {
        if self.references_type(ty) {
            Ok(self.clone())
        } else {
            Err(ModelError::TypeMismatch {
                id: self.id.clone(),
                expected: ty,
                actual: self.ty,
            })
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.ty, self.id)
    }
}

/// Derives the structural id of a one-to-one relation.
///
/// Directed relations yield `<Type>_<a>_<b>`; undirected relations sort the
/// endpoint ids first so `(a, b)` and `(b, a)` produce the same id.
pub fn relation_id(ty: ElementType, a: &str, b: &str, directed: bool) -> String {
    let (first, second) = if directed || a <= b { (a, b) } else { (b, a) };
    format!("{}_{first}_{second}", ty.name())
}

/// Explicit type-keyed handler table.
///
/// Lookup resolves the exact type first, then the most specific registered
/// supertype (breadth-first over declared supertypes). Resolutions are
/// memoized per queried type.
pub struct TypeRegistry<H> {
    handlers: FxHashMap<TypeKey, (ElementType, H)>,
    resolved: Mutex<FxHashMap<TypeKey, Option<TypeKey>>>,
}

impl<H> Default for TypeRegistry<H> {
    fn default() -> Self {
        Self {
            handlers: FxHashMap::default(),
            resolved: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<H> TypeRegistry<H> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `ty`, replacing any previous handler.
    ///
    /// # Errors
    /// Returns [`ModelError::DuplicateType`] if a different descriptor with the
    /// same name is already registered.
    pub fn register(&mut self, ty: ElementType, handler: H) -> Result<Option<H>, ModelError> {
        let key = ty.key();
        if let Some((existing, _)) = self.handlers.get(&key) {
            if existing.supertypes.len() != ty.supertypes.len()
                || existing.supertypes.iter().zip(ty.supertypes).any(|(a, b)| a != b)
            {
                return Err(ModelError::DuplicateType(ty.name()));
            }
        }
        self.resolved
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        Ok(self.handlers.insert(key, (ty, handler)).map(|(_, h)| h))
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns the handler registered for `ty` or its nearest supertype.
    pub fn resolve(&self, ty: ElementType) -> Option<&H> {
        let key = ty.key();
        let cached = {
            let memo = self
                .resolved
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            memo.get(&key).copied()
        };
        let target = match cached {
            Some(target) => target,
            None => {
                let target = self.search(ty);
                self.resolved
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .insert(key, target);
                target
            }
        };
        target.and_then(|k| self.handlers.get(&k)).map(|(_, h)| h)
    }

    fn search(&self, ty: ElementType) -> Option<TypeKey> {
        let mut frontier = vec![ty];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for candidate in frontier {
                let key = candidate.key();
                if self.handlers.contains_key(&key) {
                    return Some(key);
                }
                next.extend_from_slice(candidate.supertypes());
            }
            frontier = next;
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SHAPE: ElementType = ElementType::new("Shape", &[ELEMENT]);
    const RECT: ElementType = ElementType::new("Rect", &[SHAPE]);
    const LABEL: ElementType = ElementType::new("Label", &[ELEMENT]);

    #[test]
    fn subtype_is_reflexive_and_transitive() {
        assert!(RECT.is_subtype_of(RECT));
        assert!(RECT.is_subtype_of(SHAPE));
        assert!(RECT.is_subtype_of(ELEMENT));
        assert!(!SHAPE.is_subtype_of(RECT));
        assert!(!LABEL.is_subtype_of(SHAPE));
        assert!(ONE_TO_ONE_RELATION.is_relation());
        assert!(!RECT.is_relation());
    }

    #[test]
    fn narrow_fails_fast_on_mismatch() {
        let r = ElementRef::new("r1", RECT);
        assert!(r.narrow(SHAPE).is_ok());
        let err = r.narrow(LABEL).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { expected, .. } if expected == LABEL));
    }

    #[test]
    fn relation_id_sorts_only_undirected() {
        assert_eq!(relation_id(RELATION, "b", "a", true), "Relation_b_a");
        assert_eq!(relation_id(RELATION, "b", "a", false), "Relation_a_b");
        assert_eq!(
            relation_id(RELATION, "a", "b", false),
            relation_id(RELATION, "b", "a", false)
        );
    }

    #[test]
    fn registry_prefers_most_specific_supertype() {
        let mut registry = TypeRegistry::new();
        registry.register(ELEMENT, "element").unwrap();
        registry.register(SHAPE, "shape").unwrap();

        assert_eq!(registry.resolve(RECT), Some(&"shape"));
        assert_eq!(registry.resolve(LABEL), Some(&"element"));
        // memoized path
        assert_eq!(registry.resolve(RECT), Some(&"shape"));

        registry.register(RECT, "rect").unwrap();
        assert_eq!(registry.resolve(RECT), Some(&"rect"));
    }

    #[test]
    fn registry_rejects_conflicting_descriptor() {
        const FAKE_SHAPE: ElementType = ElementType::new("Shape", &[LABEL]);
        let mut registry = TypeRegistry::new();
        registry.register(SHAPE, 1).unwrap();
        assert!(matches!(
            registry.register(FAKE_SHAPE, 2),
            Err(ModelError::DuplicateType("Shape"))
        ));
    }
}
