// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Id generation services.
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh element ids. Instances are passed explicitly; there is no
/// process-wide generator.
pub trait IdGenerator: Send + Sync {
    /// Returns an id not returned before by this generator.
    fn next_id(&self) -> String;
}

/// Counter-based generator.
///
/// The counter is rendered as ten upper-case hex digits and reversed, so
/// consecutive ids differ in their leading character.
#[derive(Debug, Default)]
pub struct LinearIdGenerator {
    counter: AtomicU64,
}

impl LinearIdGenerator {
    /// Generator starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator whose first id renders `start`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }
}

impl IdGenerator for LinearIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{n:010X}").chars().rev().collect()
    }
}

/// Prepends a fixed prefix to ids of an inner generator.
#[derive(Debug)]
pub struct PrefixedIdGenerator<G> {
    prefix: String,
    inner: G,
}

impl<G: IdGenerator> PrefixedIdGenerator<G> {
    /// Wraps `inner`, prefixing every id with `prefix`.
    pub fn new(prefix: impl Into<String>, inner: G) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }
}

impl<G: IdGenerator> IdGenerator for PrefixedIdGenerator<G> {
    fn next_id(&self) -> String {
        format!("{}{}", self.prefix, self.inner.next_id())
    }
}
