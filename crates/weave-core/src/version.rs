// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-repository clock and element version table.
use std::collections::BTreeMap;

use thiserror::Error;

use crate::time::{CausalRelation, VectorTimestamp};

/// Errors raised by [`VersionManager::update_version`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// An incoming timestamp carries a larger component for this source than
    /// the local clock has ever issued.
    #[error("timestamp {timestamp} is ahead of the local clock for source {source_id}")]
    ClockAhead {
        /// The local source id.
        source_id: String,
        /// Offending timestamp.
        timestamp: VectorTimestamp,
    },
}

/// Clock and element versions of one repository.
///
/// Removed elements keep their last version as a tombstone so that stale
/// re-insertions can still be detected.
#[derive(Clone, Debug)]
pub struct VersionManager {
    source_id: String,
    clock: VectorTimestamp,
    versions: BTreeMap<String, VectorTimestamp>,
}

impl VersionManager {
    /// Manager issuing timestamps under `source_id`.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            clock: VectorTimestamp::new(),
            versions: BTreeMap::new(),
        }
    }

    /// Manager with a random v4 UUID as source id.
    pub fn with_random_source() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Source id used for local events.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Current clock.
    pub fn clock(&self) -> &VectorTimestamp {
        &self.clock
    }

    /// Last known version of `id` (including tombstones).
    pub fn version_of(&self, id: &str) -> Option<&VectorTimestamp> {
        self.versions.get(id)
    }

    /// Advances the own clock component.
    pub fn register_local_event(&mut self) {
        self.clock.increment(&self.source_id);
    }

    /// Stamps `id` with the current clock and returns the stamp.
    pub fn mark_element_updated(&mut self, id: &str) -> VectorTimestamp {
        let stamp = self.clock.clone();
        self.versions.insert(id.to_owned(), stamp.clone());
        stamp
    }

    /// Records that `id` was written at `timestamp`.
    ///
    /// Returns `Ok(false)` when `timestamp` is strictly before the stored
    /// version. Otherwise the clock absorbs `timestamp`, the element version
    /// becomes the join of the stored version and `timestamp`, and the result
    /// is `Ok(true)`.
    ///
    /// # Errors
    /// Returns [`VersionError::ClockAhead`] if `timestamp` carries a larger
    /// own-source component than the clock.
    pub fn update_version(
        &mut self,
        id: &str,
        timestamp: &VectorTimestamp,
    ) -> Result<bool, VersionError> {
        if let Some(current) = self.versions.get(id) {
            if timestamp.relation_to(current) == CausalRelation::StrictlyBefore {
                return Ok(false);
            }
        }
        if timestamp.get(&self.source_id) > self.clock.get(&self.source_id) {
            return Err(VersionError::ClockAhead {
                source_id: self.source_id.clone(),
                timestamp: timestamp.clone(),
            });
        }
        self.clock.merge_max(timestamp);
        let joined = match self.versions.get(id) {
            Some(current) => current.merged(timestamp),
            None => timestamp.clone(),
        };
        self.versions.insert(id.to_owned(), joined);
        Ok(true)
    }

    /// Forgets every element version. The clock keeps running.
    pub fn clear_versions(&mut self) {
        self.versions.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vt(entries: &[(&str, u64)]) -> VectorTimestamp {
        entries.iter().map(|(s, v)| (*s, *v)).collect()
    }

    #[test]
    fn local_events_stamp_with_clock() {
        let mut vm = VersionManager::new("me");
        vm.register_local_event();
        let stamp = vm.mark_element_updated("a");
        assert_eq!(stamp, vt(&[("me", 1)]));
        assert_eq!(vm.version_of("a"), Some(&stamp));
    }

    #[test]
    fn update_rejects_strictly_older() {
        let mut vm = VersionManager::new("me");
        assert_eq!(vm.update_version("a", &vt(&[("x", 2)])), Ok(true));
        assert_eq!(vm.update_version("a", &vt(&[("x", 1)])), Ok(false));
        assert_eq!(vm.version_of("a"), Some(&vt(&[("x", 2)])));
        assert_eq!(vm.clock(), &vt(&[("x", 2)]));
    }

    #[test]
    fn parallel_update_joins_versions() {
        let mut vm = VersionManager::new("me");
        vm.update_version("a", &vt(&[("x", 1)])).unwrap();
        assert_eq!(vm.update_version("a", &vt(&[("y", 1)])), Ok(true));
        assert_eq!(vm.version_of("a"), Some(&vt(&[("x", 1), ("y", 1)])));
    }

    #[test]
    fn own_component_ahead_is_an_error() {
        let mut vm = VersionManager::new("me");
        let err = vm.update_version("a", &vt(&[("me", 1)])).unwrap_err();
        assert!(matches!(err, VersionError::ClockAhead { .. }));
    }

    #[test]
    fn random_sources_differ() {
        let a = VersionManager::with_random_source();
        let b = VersionManager::with_random_source();
        assert_ne!(a.source_id(), b.source_id());
    }
}
