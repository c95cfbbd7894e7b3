// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Processor ports: coalescing, concurrency limits and failure isolation.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;
use std::time::Duration;

use weave_bus::{BusConfig, ModificationBus, StrategyKind};
use weave_core::TimedDiffCollection;
use weave_dry_tests::{
    Gate, Outcome, RecordingProcessor, SimpleTestElement, TimedDiffBuilder, SIMPLE_TEST_ELEMENT,
};

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn bus() -> ModificationBus {
    init_tracing();
    ModificationBus::new(&BusConfig {
        worker_threads: 4,
        parallel_strategy: StrategyKind::Overwrite,
    })
    .unwrap()
}

fn batch(id: &str, counter: u64) -> TimedDiffCollection {
    TimedDiffBuilder::new()
        .add(SimpleTestElement::new(id, 0).shared(), &[("up", counter)])
        .build()
}

fn ids(diffs: &TimedDiffCollection) -> BTreeSet<String> {
    diffs.ids().map(str::to_owned).collect()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn input_arriving_during_a_run_is_coalesced() {
    let bus = bus();
    let gate = Gate::closed();
    let processor =
        RecordingProcessor::new("slow", [SIMPLE_TEST_ELEMENT]).blocked_by(gate.clone());
    let port = bus.register_processor(processor.clone()).unwrap();

    bus.publish(batch("a", 1)).unwrap();
    assert!(processor.wait_for_calls(1, WAIT).await);

    bus.publish(batch("b", 2)).unwrap();
    bus.publish(batch("c", 3)).unwrap();
    assert!(wait_until(|| port.pending_len() == 2).await);
    gate.open();

    assert!(processor.wait_for_calls(2, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let calls = processor.calls();
    assert_eq!(calls.len(), 2, "three batches, two runs");
    assert_eq!(ids(&calls[0]), BTreeSet::from(["a".to_owned()]));
    assert_eq!(
        ids(&calls[1]),
        BTreeSet::from(["b".to_owned(), "c".to_owned()])
    );
    assert_eq!(port.pending_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn coalescing_keeps_the_newest_diff_per_element() {
    let bus = bus();
    let gate = Gate::closed();
    let processor =
        RecordingProcessor::new("slow", [SIMPLE_TEST_ELEMENT]).blocked_by(gate.clone());
    let port = bus.register_processor(processor.clone()).unwrap();

    bus.publish(batch("warmup", 1)).unwrap();
    assert!(processor.wait_for_calls(1, WAIT).await);
    for x in 1..=3_i64 {
        let element = SimpleTestElement::new("a", x).shared();
        let diffs = TimedDiffBuilder::new()
            .add(element, &[("up", x.unsigned_abs() + 1)])
            .build();
        bus.publish(diffs).unwrap();
    }
    assert!(wait_until(|| port.pending_len() == 1).await);
    gate.open();

    assert!(processor.wait_for_calls(2, WAIT).await);
    let calls = processor.calls();
    let element = calls[1].get("a").unwrap().affected();
    assert_eq!(
        element.downcast_ref::<SimpleTestElement>().unwrap().x(),
        3
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_update_is_lost_under_load() {
    let bus = bus();
    let processor = RecordingProcessor::new("sink", [SIMPLE_TEST_ELEMENT]);
    bus.register_processor(processor.clone()).unwrap();

    let expected: BTreeSet<String> = (0..200).map(|i| format!("e{i:03}")).collect();
    for (i, id) in expected.iter().enumerate() {
        bus.publish(batch(id, i as u64 + 1)).unwrap();
    }

    assert!(wait_until(|| processor.seen_ids() == expected).await);
    assert!(processor.call_count() <= expected.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishers_lose_nothing() {
    let bus = bus();
    let gate = Gate::closed();
    let processor =
        RecordingProcessor::new("sink", [SIMPLE_TEST_ELEMENT]).blocked_by(gate.clone());
    bus.register_processor(processor.clone()).unwrap();

    bus.publish(batch("warmup", 1)).unwrap();
    assert!(processor.wait_for_calls(1, WAIT).await);

    let publishers: Vec<_> = (0..8_u64)
        .map(|p| {
            let bus = bus.clone();
            tokio::spawn(async move {
                for n in 1..=50_u64 {
                    let id = format!("p{p}-{n:02}");
                    let source = format!("pub{p}");
                    let diffs = TimedDiffBuilder::new()
                        .add(SimpleTestElement::new(id, 0).shared(), &[(source.as_str(), n)])
                        .build();
                    bus.publish(diffs).unwrap();
                    if n % 7 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.await.unwrap();
    }
    gate.open();

    let mut expected: BTreeSet<String> = (0..8)
        .flat_map(|p| (1..=50).map(move |n| format!("p{p}-{n:02}")))
        .collect();
    expected.insert("warmup".to_owned());
    assert!(wait_until(|| processor.seen_ids() == expected).await);
    assert!(processor.call_count() < expected.len(), "input was coalesced");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failures_and_panics_do_not_block_later_batches() {
    let bus = bus();
    let processor = RecordingProcessor::new("flaky", [SIMPLE_TEST_ELEMENT]);
    processor.push(Outcome::Fail("boom".into()));
    processor.push(Outcome::Panic("kaboom".into()));
    let port = bus.register_processor(processor.clone()).unwrap();

    for (n, id) in ["a", "b", "c"].into_iter().enumerate() {
        bus.publish(batch(id, n as u64 + 1)).unwrap();
        assert!(processor.wait_for_calls(n + 1, WAIT).await, "call {}", n + 1);
    }
    assert_eq!(ids(&processor.calls()[2]), BTreeSet::from(["c".to_owned()]));
    assert!(wait_until(|| bus.worker_pool().available() == 4).await);
    assert_eq!(port.pending_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_threaded_processors_never_overlap() {
    let bus = bus();
    let gate = Gate::closed();
    let processor =
        RecordingProcessor::new("serial", [SIMPLE_TEST_ELEMENT]).blocked_by(gate.clone());
    bus.register_processor(processor.clone()).unwrap();

    bus.publish(batch("a", 1)).unwrap();
    assert!(processor.wait_for_calls(1, WAIT).await);
    bus.publish(batch("b", 2)).unwrap();
    assert!(
        !processor
            .wait_for_calls(2, Duration::from_millis(200))
            .await
    );

    gate.open();
    assert!(processor.wait_for_calls(2, WAIT).await);
    assert_eq!(processor.max_concurrency(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn processors_may_opt_into_parallel_runs() {
    let bus = bus();
    let gate = Gate::closed();
    let processor = RecordingProcessor::new("wide", [SIMPLE_TEST_ELEMENT])
        .blocked_by(gate.clone())
        .with_max_threads(2);
    bus.register_processor(processor.clone()).unwrap();

    bus.publish(batch("a", 1)).unwrap();
    assert!(processor.wait_for_calls(1, WAIT).await);
    bus.publish(batch("b", 2)).unwrap();
    assert!(processor.wait_for_calls(2, WAIT).await);
    assert_eq!(processor.max_concurrency(), 2);

    gate.open();
}
