// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Vector timestamps and their causal partial order.
use std::collections::BTreeMap;
use std::fmt;

/// Result of comparing two [`VectorTimestamp`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CausalRelation {
    /// `self` is dominated by `other`.
    StrictlyBefore,
    /// `self` dominates `other`.
    StrictlyAfter,
    /// Neither dominates: concurrent updates.
    Parallel,
    /// Identical vectors.
    Equal,
}

impl CausalRelation {
    /// The relation seen from the other side.
    pub fn inverse(self) -> Self {
        match self {
            Self::StrictlyBefore => Self::StrictlyAfter,
            Self::StrictlyAfter => Self::StrictlyBefore,
            other => other,
        }
    }
}

/// Per-source logical clock.
///
/// Missing sources read as `0`; zero components are never stored, so two
/// timestamps are equal iff they compare [`CausalRelation::Equal`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VectorTimestamp {
    // BTreeMap for stable iteration order.
    entries: BTreeMap<String, u64>,
}

impl VectorTimestamp {
    /// Empty timestamp (all components zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// Component for `source`.
    pub fn get(&self, source: &str) -> u64 {
        self.entries.get(source).copied().unwrap_or_default()
    }

    /// Sets the component for `source`.
    pub fn set(&mut self, source: &str, value: u64) {
        if value == 0 {
            self.entries.remove(source);
        } else {
            self.entries.insert(source.to_owned(), value);
        }
    }

    /// Increments the component for `source` and returns the new value.
    pub fn increment(&mut self, source: &str) -> u64 {
        let slot = self.entries.entry(source.to_owned()).or_default();
        *slot = slot.saturating_add(1);
        *slot
    }

    /// Component-wise maximum, in place.
    pub fn merge_max(&mut self, other: &VectorTimestamp) {
        for (source, &value) in &other.entries {
            let slot = self.entries.entry(source.clone()).or_default();
            if *slot < value {
                *slot = value;
            }
        }
    }

    /// Component-wise maximum of `self` and `other`.
    pub fn merged(&self, other: &VectorTimestamp) -> VectorTimestamp {
        let mut out = self.clone();
        out.merge_max(other);
        out
    }

    /// True when all components are zero.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Non-zero components in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Causal relation of `self` to `other`.
    pub fn relation_to(&self, other: &VectorTimestamp) -> CausalRelation {
        let mut greater = false;
        let mut less = false;
        for source in self.entries.keys().chain(other.entries.keys()) {
            let mine = self.get(source);
            let theirs = other.get(source);
            if mine > theirs {
                greater = true;
            } else if mine < theirs {
                less = true;
            }
            if greater && less {
                return CausalRelation::Parallel;
            }
        }
        match (greater, less) {
            (true, false) => CausalRelation::StrictlyAfter,
            (false, true) => CausalRelation::StrictlyBefore,
            _ => CausalRelation::Equal,
        }
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for VectorTimestamp {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (source, value) in iter {
            let source = source.into();
            out.set(&source, value);
        }
        out
    }
}

impl fmt::Display for VectorTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (source, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{source}:{value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vt(entries: &[(&str, u64)]) -> VectorTimestamp {
        entries.iter().map(|(s, v)| (*s, *v)).collect()
    }

    #[test]
    fn zero_components_are_normalized() {
        assert_eq!(vt(&[("A", 0)]), VectorTimestamp::new());
        assert_eq!(
            vt(&[("A", 0)]).relation_to(&VectorTimestamp::new()),
            CausalRelation::Equal
        );
    }

    #[test]
    fn parallel_detection() {
        let v1 = vt(&[("A", 1), ("B", 0)]);
        let v2 = vt(&[("A", 0), ("B", 1)]);
        assert_eq!(v1.relation_to(&v2), CausalRelation::Parallel);
        assert_eq!(v2.relation_to(&v1), CausalRelation::Parallel);
    }

    #[test]
    fn strict_order() {
        let v1 = vt(&[("A", 5)]);
        let v2 = vt(&[("A", 6)]);
        assert_eq!(v1.relation_to(&v2), CausalRelation::StrictlyBefore);
        assert_eq!(v2.relation_to(&v1), CausalRelation::StrictlyAfter);
    }

    #[test]
    fn missing_source_reads_as_zero() {
        let v1 = vt(&[("A", 1)]);
        let v2 = vt(&[("A", 1), ("B", 2)]);
        assert_eq!(v1.get("B"), 0);
        assert_eq!(v1.relation_to(&v2), CausalRelation::StrictlyBefore);
    }

    #[test]
    fn merge_and_display() {
        let mut v = vt(&[("A", 3), ("B", 1)]);
        v.merge_max(&vt(&[("B", 4), ("C", 2)]));
        assert_eq!(v, vt(&[("A", 3), ("B", 4), ("C", 2)]));
        assert_eq!(v.to_string(), "{A:3, B:4, C:2}");
        assert_eq!(v.increment("A"), 4);
    }

    fn arb_vt() -> impl Strategy<Value = VectorTimestamp> {
        proptest::collection::btree_map(
            prop_oneof![Just("A"), Just("B"), Just("C")],
            0u64..4,
            0..3,
        )
        .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn relation_to_self_is_equal(v in arb_vt()) {
            prop_assert_eq!(v.relation_to(&v), CausalRelation::Equal);
        }

        #[test]
        fn relation_is_antisymmetric(a in arb_vt(), b in arb_vt()) {
            prop_assert_eq!(a.relation_to(&b), b.relation_to(&a).inverse());
        }

        #[test]
        fn merge_dominates_both(a in arb_vt(), b in arb_vt()) {
            let m = a.merged(&b);
            prop_assert!(matches!(m.relation_to(&a), CausalRelation::StrictlyAfter | CausalRelation::Equal));
            prop_assert!(matches!(m.relation_to(&b), CausalRelation::StrictlyAfter | CausalRelation::Equal));
        }
    }
}
