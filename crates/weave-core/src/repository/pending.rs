// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Relations parked until their endpoints arrive.
use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::element::SharedElement;
use crate::time::{CausalRelation, VectorTimestamp};

#[derive(Debug)]
struct Parked {
    relation: SharedElement,
    version: Option<VectorTimestamp>,
    missing: BTreeSet<String>,
}

/// Pending relations with a reverse index from missing endpoint ids.
#[derive(Debug, Default)]
pub(crate) struct PendingRelations {
    parked: FxHashMap<String, Parked>,
    waiting_for: FxHashMap<String, BTreeSet<String>>,
}

impl PendingRelations {
    /// Parks `relation` until every id in `missing` is stored.
    ///
    /// Returns `false` and keeps the parked state when `version` is strictly
    /// before the version already parked for the same relation.
    pub(crate) fn park(
        &mut self,
        relation: SharedElement,
        version: Option<VectorTimestamp>,
        missing: BTreeSet<String>,
    ) -> bool {
        let id = relation.id().to_owned();
        if let (Some(existing), Some(incoming)) = (
            self.parked.get(&id).and_then(|p| p.version.as_ref()),
            version.as_ref(),
        ) {
            if incoming.relation_to(existing) == CausalRelation::StrictlyBefore {
                return false;
            }
        }
        self.unpark(&id);
        for endpoint in &missing {
            self.waiting_for
                .entry(endpoint.clone())
                .or_default()
                .insert(id.clone());
        }
        self.parked.insert(
            id,
            Parked {
                relation,
                version,
                missing,
            },
        );
        true
    }

    /// Records that `id` is now stored and returns the relations that became
    /// complete, in id order.
    pub(crate) fn on_element_insert(
        &mut self,
        id: &str,
    ) -> Vec<(SharedElement, Option<VectorTimestamp>)> {
        let Some(waiting) = self.waiting_for.remove(id) else {
            return Vec::new();
        };
        let mut ready = Vec::new();
        for relation_id in waiting {
            let complete = self.parked.get_mut(&relation_id).is_some_and(|p| {
                p.missing.remove(id);
                p.missing.is_empty()
            });
            if complete {
                if let Some(p) = self.parked.remove(&relation_id) {
                    ready.push((p.relation, p.version));
                }
            }
        }
        ready
    }

    /// Drops the parked relation `id` and every relation waiting for `id`.
    pub(crate) fn on_element_remove(&mut self, id: &str) {
        self.unpark(id);
        if let Some(waiting) = self.waiting_for.remove(id) {
            for relation_id in waiting {
                self.unpark(&relation_id);
            }
        }
    }

    /// Drops the parked relation `id` only.
    pub(crate) fn discard(&mut self, id: &str) {
        self.unpark(id);
    }

    /// Version of the parked relation `id`.
    pub(crate) fn version_of(&self, id: &str) -> Option<&VectorTimestamp> {
        self.parked.get(id).and_then(|p| p.version.as_ref())
    }

    /// True when `id` is parked.
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.parked.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.parked.len()
    }

    pub(crate) fn clear(&mut self) {
        self.parked.clear();
        self.waiting_for.clear();
    }

    fn unpark(&mut self, id: &str) {
        let Some(parked) = self.parked.remove(id) else {
            return;
        };
        for endpoint in parked.missing {
            if let Some(set) = self.waiting_for.get_mut(&endpoint) {
                set.remove(id);
                if set.is_empty() {
                    self.waiting_for.remove(&endpoint);
                }
            }
        }
    }
}
