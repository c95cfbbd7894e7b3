// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use weave_core::{
    relation_id, CausalRelation, DiffCollection, DiffError, DiffKind, ModelDiff,
    TimedDiffCollection,
};
use weave_dry_tests::{
    simple_ref, vt, SimpleTestElement, TimedDiffBuilder, OTHER_SIMPLE_TEST_ELEMENT,
    SIMPLE_TEST_ELEMENT, SIMPLE_TEST_ONE_TO_ONE_RELATION,
};

#[test]
fn last_diff_per_id_wins() {
    let mut diffs = DiffCollection::new();
    diffs.put_diff(ModelDiff::add(SimpleTestElement::new("a", 1).shared()));
    let replaced = diffs.put_diff(ModelDiff::remove(SimpleTestElement::new("a", 1).shared()));
    assert!(replaced.is_some());
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs.get("a").map(ModelDiff::kind), Some(DiffKind::Remove));
}

#[test]
fn add_after_remove_marks_refresh() {
    let mut diffs = DiffCollection::new();
    diffs.put_diff(ModelDiff::remove(SimpleTestElement::new("a", 1).shared()));
    let mut later = DiffCollection::new();
    later.put_diff(ModelDiff::add(SimpleTestElement::new("a", 2).shared()));

    diffs.merge_collection(later);

    assert_eq!(diffs.get("a").map(ModelDiff::kind), Some(DiffKind::Add));
    assert!(diffs.is_refresh("a"));
}

#[test]
fn modify_requires_matching_identity() {
    let a = SimpleTestElement::new("a", 1).shared();
    let b = SimpleTestElement::new("b", 1).shared();
    let other_a = SimpleTestElement::other("a", 1).shared();
    assert!(matches!(
        ModelDiff::modify(a.clone(), b),
        Err(DiffError::ModifyMismatch { .. })
    ));
    assert!(ModelDiff::modify(a, other_a).is_err());
}

#[test]
fn typed_lookup_rejects_wrong_type() {
    let diffs = TimedDiffBuilder::new()
        .local_add(SimpleTestElement::other("o", 1).shared())
        .build();
    assert!(diffs
        .get_diff_for_element(&weave_core::ElementRef::new("o", OTHER_SIMPLE_TEST_ELEMENT))
        .unwrap()
        .is_some());
    assert!(matches!(
        diffs.get_diff_for_element(&simple_ref("o")),
        Err(DiffError::TypeMismatch { .. })
    ));
    assert!(diffs.get_diff_for_element(&simple_ref("x")).unwrap().is_none());
}

#[test]
fn type_filter_keeps_versions_and_markers() {
    let diffs = TimedDiffBuilder::new()
        .add(SimpleTestElement::new("a", 1).shared(), &[("up", 1)])
        .add(SimpleTestElement::subclass("s", 1).shared(), &[("up", 2)])
        .add(SimpleTestElement::other("o", 1).shared(), &[("up", 3)])
        .refresh("s")
        .refresh("o")
        .build();

    let simple = diffs.filter_by_element_types(&[SIMPLE_TEST_ELEMENT]);

    assert_eq!(simple.ids().collect::<Vec<_>>(), ["a", "s"]);
    assert_eq!(simple.version_for("s"), Some(&vt(&[("up", 2)])));
    assert_eq!(simple.refresh_ids().collect::<Vec<_>>(), ["s"]);
}

#[test]
fn newer_merge_skips_older_entries() {
    let mut held = TimedDiffBuilder::new()
        .add(SimpleTestElement::new("a", 2).shared(), &[("up", 2)])
        .build();
    let older = TimedDiffBuilder::new()
        .add(SimpleTestElement::new("a", 1).shared(), &[("up", 1)])
        .add(SimpleTestElement::new("b", 1).shared(), &[("up", 1)])
        .build();

    held.merge_newer_from(&older);

    assert_eq!(held.version_for("a"), Some(&vt(&[("up", 2)])));
    assert!(held.get("b").is_some());
}

#[test]
fn newer_merge_takes_parallel_entries_and_refresh() {
    let mut held = TimedDiffBuilder::new()
        .remove(SimpleTestElement::new("a", 1).shared(), &[("left", 1)])
        .build();
    let parallel = TimedDiffBuilder::new()
        .add(SimpleTestElement::new("a", 3).shared(), &[("right", 1)])
        .build();

    held.merge_newer_from(&parallel);

    assert_eq!(held.get("a").map(ModelDiff::kind), Some(DiffKind::Add));
    assert_eq!(held.version_for("a"), Some(&vt(&[("right", 1)])));
    assert!(held.is_refresh("a"), "remove superseded by add");
}

#[test]
fn untimed_entries_lose_against_held_versions() {
    let mut held = TimedDiffBuilder::new()
        .add(SimpleTestElement::new("a", 2).shared(), &[("up", 1)])
        .build();
    let untimed = TimedDiffBuilder::new()
        .local_add(SimpleTestElement::new("a", 9).shared())
        .local_add(SimpleTestElement::new("b", 1).shared())
        .build();

    held.merge_newer_from(&untimed);

    assert_eq!(held.version_for("a"), Some(&vt(&[("up", 1)])));
    assert!(held.get("b").is_some());
    assert!(held.version_for("b").is_none());
}

#[test]
fn untimed_collections_convert_without_versions() {
    let mut local = DiffCollection::new();
    local.put_diff(ModelDiff::add(SimpleTestElement::new("a", 1).shared()));
    local.mark_refresh("a");
    let timed: TimedDiffCollection = local.into();
    assert!(timed.version_for("a").is_none());
    assert!(timed.is_refresh("a"));
}

fn arb_id() -> impl Strategy<Value = String> {
    "[a-d]{1,3}"
}

proptest! {
    #[test]
    fn undirected_relation_ids_are_symmetric(a in arb_id(), b in arb_id()) {
        prop_assert_eq!(
            relation_id(SIMPLE_TEST_ONE_TO_ONE_RELATION, &a, &b, false),
            relation_id(SIMPLE_TEST_ONE_TO_ONE_RELATION, &b, &a, false)
        );
        let forward = relation_id(SIMPLE_TEST_ONE_TO_ONE_RELATION, &a, &b, true);
        prop_assert_eq!(&forward, &relation_id(SIMPLE_TEST_ONE_TO_ONE_RELATION, &a, &b, true));
        if a != b {
            prop_assert_ne!(forward, relation_id(SIMPLE_TEST_ONE_TO_ONE_RELATION, &b, &a, true));
        }
    }

    #[test]
    fn newer_merge_never_regresses_a_version(
        held in prop::collection::vec((0usize..4, 0u64..4, 0u64..4), 0..6),
        incoming in prop::collection::vec((0usize..4, 0u64..4, 0u64..4), 0..6),
    ) {
        let build = |entries: &[(usize, u64, u64)]| {
            let mut out = TimedDiffCollection::new();
            for &(id, l, r) in entries {
                out.put_diff(
                    ModelDiff::add(SimpleTestElement::new(format!("e{id}"), 0).shared()),
                    vt(&[("left", l), ("right", r)]),
                );
            }
            out
        };
        let before = build(held.as_slice());
        let other = build(incoming.as_slice());
        let mut merged = before.clone();
        merged.merge_newer_from(&other);

        for (id, _, version) in merged.iter() {
            let version = version.unwrap();
            if let Some(old) = before.version_for(id) {
                prop_assert_ne!(version.relation_to(old), CausalRelation::StrictlyBefore);
            }
            prop_assert!(before.get(id).is_some() || other.get(id).is_some());
        }
        prop_assert!(merged.len() >= before.len());
    }
}
