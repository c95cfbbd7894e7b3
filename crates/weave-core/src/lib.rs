// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! weave-core: versioned element graph with causal diff application.
//!
//! Elements and relations live in a [`ModelRepository`]; every write returns
//! the [`TimedDiffCollection`] it caused. Collections travel between
//! repositories and are merged back through the [`Applicator`], which uses
//! per-element [`VectorTimestamp`]s to drop stale writes and to resolve
//! concurrent ones. [`ChildRepository`] derives filtered read-only views.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod applicator;
mod child;
mod collection;
mod diff;
mod element;
mod id_gen;
mod ident;
pub mod repository;
mod time;
mod version;

pub use applicator::{Applicator, ParallelPolicy, ParallelStrategy};
pub use child::{ChildRepoSpec, ChildRepository, ChildView, Filter, FilterError, FilterMode};
pub use collection::{DiffCollection, TimedDiffCollection};
pub use diff::{DiffError, DiffKind, ModelDiff};
pub use element::{shared, Element, Probability, RelationEndpoints, SharedElement};
pub use id_gen::{IdGenerator, LinearIdGenerator, PrefixedIdGenerator};
pub use ident::{
    make_type_key, relation_id, ElementRef, ElementType, Hash, ModelError, TypeKey, TypeRegistry,
    ELEMENT, ONE_TO_ONE_RELATION, RELATION,
};
pub use repository::queries::{
    element_related_from, element_related_to, elements_related_from, elements_related_to,
    QueryError,
};
pub use repository::{
    ElementQueryResult, ModelRead, ModelRepository, RelationFilter, RepositoryError,
};
pub use time::{CausalRelation, VectorTimestamp};
pub use version::{VersionError, VersionManager};
