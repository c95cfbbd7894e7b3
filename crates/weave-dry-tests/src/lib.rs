// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for Weave crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`builders`] - Timed diff collection builder and timestamp helper
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`elements`] - Simple elements and relations with subtype variants
//! - [`ports`] - Recording port standing in for outer surfaces
//! - [`processors`] - Recording processor with gate and scripted outcomes

pub mod builders;
pub mod config;
pub mod elements;
pub mod ports;
pub mod processors;

// Re-export commonly used items at crate root for convenience
pub use builders::{vt, TimedDiffBuilder};
pub use config::InMemoryConfigStore;
pub use elements::{
    simple_ref, SimpleTestElement, SimpleTestOneToOneRelation, SimpleTestRelation,
    OTHER_SIMPLE_TEST_ELEMENT, OTHER_SIMPLE_TEST_ONE_TO_ONE_RELATION, SIMPLE_SUBCLASS_TEST_ELEMENT,
    SIMPLE_SUBCLASS_TEST_ONE_TO_ONE_RELATION, SIMPLE_TEST_ELEMENT, SIMPLE_TEST_ONE_TO_ONE_RELATION,
    SIMPLE_TEST_RELATION,
};
pub use ports::RecordingPort;
pub use processors::{Gate, Outcome, RecordingProcessor};
