// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bus routing, state cache, registration and lifecycle.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use weave_bus::{
    BusConfig, BusError, ConfigError, ConfigService, DiffInterceptor, ModificationBus,
    StrategyKind, EXTERNAL_ORIGIN,
};
use weave_core::TimedDiffCollection;
use weave_dry_tests::{
    InMemoryConfigStore, Outcome, RecordingPort, RecordingProcessor, SimpleTestElement,
    TimedDiffBuilder, OTHER_SIMPLE_TEST_ELEMENT, SIMPLE_TEST_ELEMENT,
};

const WAIT: Duration = Duration::from_secs(5);

fn config() -> BusConfig {
    BusConfig {
        worker_threads: 2,
        parallel_strategy: StrategyKind::Overwrite,
    }
}

fn ids(diffs: &TimedDiffCollection) -> BTreeSet<String> {
    diffs.ids().map(str::to_owned).collect()
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| (*s).to_owned()).collect()
}

fn mixed() -> TimedDiffCollection {
    TimedDiffBuilder::new()
        .add(SimpleTestElement::new("a", 1).shared(), &[("up", 1)])
        .add(SimpleTestElement::subclass("s", 1).shared(), &[("up", 1)])
        .add(SimpleTestElement::other("o", 1).shared(), &[("up", 1)])
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn collections_are_routed_by_consumed_type() {
    let bus = ModificationBus::new(&config()).unwrap();
    let simple = RecordingPort::new("simple", [SIMPLE_TEST_ELEMENT]);
    let other = RecordingPort::new("other", [OTHER_SIMPLE_TEST_ELEMENT]);
    bus.register_port(Arc::new(simple.clone())).unwrap();
    bus.register_port(Arc::new(other.clone())).unwrap();
    assert_eq!(bus.port_ids(), ["simple", "other"]);

    bus.publish(mixed()).unwrap();

    assert!(simple.wait_until(WAIT, |r| r.len() == 1).await);
    assert!(other.wait_until(WAIT, |r| r.len() == 1).await);
    assert_eq!(ids(&simple.received()[0]), set(&["a", "s"]));
    assert_eq!(ids(&other.received()[0]), set(&["o"]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_and_unmatched_collections_reach_nobody() {
    let bus = ModificationBus::new(&config()).unwrap();
    let simple = RecordingPort::new("simple", [SIMPLE_TEST_ELEMENT]);
    bus.register_port(Arc::new(simple.clone())).unwrap();

    bus.publish(TimedDiffCollection::new()).unwrap();
    bus.publish(
        TimedDiffBuilder::new()
            .add(SimpleTestElement::other("o", 1).shared(), &[("up", 1)])
            .build(),
    )
    .unwrap();

    assert!(
        !simple
            .wait_until(Duration::from_millis(100), |r| !r.is_empty())
            .await
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn processor_output_flows_to_downstream_ports() {
    let bus = ModificationBus::new(&config()).unwrap();
    let derived = TimedDiffBuilder::new()
        .add(SimpleTestElement::other("derived", 7).shared(), &[("deriver", 1)])
        .build();
    let processor = RecordingProcessor::new("deriver", [SIMPLE_TEST_ELEMENT]);
    processor.push(Outcome::Emit(derived));
    bus.register_processor(processor.clone()).unwrap();
    let sink = RecordingPort::new("sink", [OTHER_SIMPLE_TEST_ELEMENT]);
    bus.register_port(Arc::new(sink.clone())).unwrap();

    bus.publish(
        TimedDiffBuilder::new()
            .add(SimpleTestElement::new("a", 1).shared(), &[("up", 1)])
            .build(),
    )
    .unwrap();

    assert!(sink.wait_until(WAIT, |r| !r.is_empty()).await);
    assert_eq!(ids(&sink.received()[0]), set(&["derived"]));
    assert_eq!(ids(&bus.export_system_state()), set(&["a", "derived"]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_port_starts_from_cached_state() {
    let bus = ModificationBus::new(&config()).unwrap();
    bus.publish(mixed()).unwrap();
    bus.publish(
        TimedDiffBuilder::new()
            .remove(SimpleTestElement::subclass("s", 1).shared(), &[("up", 2)])
            .build(),
    )
    .unwrap();

    let late = RecordingPort::new("late", [SIMPLE_TEST_ELEMENT]);
    bus.register_port(Arc::new(late.clone())).unwrap();
    bus.publish(
        TimedDiffBuilder::new()
            .add(SimpleTestElement::new("b", 1).shared(), &[("up", 3)])
            .build(),
    )
    .unwrap();

    assert!(late.wait_until(WAIT, |r| r.len() == 2).await);
    let received = late.received();
    assert_eq!(ids(&received[0]), set(&["a"]), "cached state, filtered");
    assert_eq!(ids(&received[1]), set(&["b"]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_publications_do_not_regress_the_cache() {
    let bus = ModificationBus::new(&config()).unwrap();
    bus.publish(
        TimedDiffBuilder::new()
            .add(SimpleTestElement::new("a", 2).shared(), &[("up", 2)])
            .build(),
    )
    .unwrap();
    bus.publish(
        TimedDiffBuilder::new()
            .add(SimpleTestElement::new("a", 1).shared(), &[("up", 1)])
            .build(),
    )
    .unwrap();

    let state = bus.export_system_state();
    let cached = state.get("a").unwrap().affected();
    assert_eq!(cached.downcast_ref::<SimpleTestElement>().unwrap().x(), 2);
}

#[derive(Default)]
struct Origins(Mutex<Vec<(String, usize)>>);

impl DiffInterceptor for Origins {
    fn intercept(&self, origin: &str, diffs: &TimedDiffCollection) {
        self.0.lock().unwrap().push((origin.to_owned(), diffs.len()));
    }
}

impl Origins {
    fn seen(&self) -> Vec<(String, usize)> {
        self.0.lock().unwrap().clone()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interceptor_sees_every_origin() {
    let origins = Arc::new(Origins::default());
    let bus = ModificationBus::with_interceptor(&config(), Arc::clone(&origins) as _).unwrap();
    let ui = RecordingPort::new("ui", [SIMPLE_TEST_ELEMENT]);
    bus.register_port(Arc::new(ui.clone())).unwrap();

    bus.publish(mixed()).unwrap();
    ui.emit(
        TimedDiffBuilder::new()
            .local_add(SimpleTestElement::new("typed", 1).shared())
            .build(),
    );

    let deadline = tokio::time::Instant::now() + WAIT;
    while origins.seen().len() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        origins.seen(),
        [(EXTERNAL_ORIGIN.to_owned(), 3), ("ui".to_owned(), 1)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_closes_the_bus() {
    let bus = ModificationBus::new(&config()).unwrap();
    let port = RecordingPort::new("p", [SIMPLE_TEST_ELEMENT]);
    bus.register_port(Arc::new(port.clone())).unwrap();

    bus.shutdown();
    bus.shutdown();

    assert_eq!(bus.publish(mixed()), Err(BusError::Closed));
    assert_eq!(
        bus.register_port(Arc::new(RecordingPort::new("q", [SIMPLE_TEST_ELEMENT]))),
        Err(BusError::Closed)
    );
    assert!(bus.port_ids().is_empty());
    port.emit(mixed());
    assert!(
        !port
            .wait_until(Duration::from_millis(100), |r| !r.is_empty())
            .await
    );
}

#[test]
fn bus_needs_a_runtime() {
    assert!(matches!(
        ModificationBus::new(&config()),
        Err(BusError::NoRuntime)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bus_starts_from_stored_config() {
    let store = InMemoryConfigStore::with_json(
        "bus",
        r#"{"worker_threads":3,"parallel_strategy":"ignore"}"#,
    );
    let service = ConfigService::new(store.clone());

    let loaded = BusConfig::load(&service).unwrap();
    assert_eq!(loaded.worker_threads, 3);
    assert_eq!(loaded.parallel_strategy, StrategyKind::Ignore);

    let bus = ModificationBus::new(&loaded).unwrap();
    assert_eq!(bus.worker_pool().size(), 3);

    let updated = BusConfig {
        worker_threads: 5,
        ..loaded
    };
    updated.save(&service).unwrap();
    assert_eq!(BusConfig::load(&service).unwrap(), updated);

    store.set_fail_on_load(true);
    assert!(matches!(
        BusConfig::load(&service),
        Err(ConfigError::Other(_))
    ));
}

#[test]
fn invalid_stored_config_is_rejected() {
    let zero = InMemoryConfigStore::with_json("bus", r#"{"worker_threads":0}"#);
    assert!(BusConfig::load(&ConfigService::new(zero)).is_err());

    let garbage = InMemoryConfigStore::with_json("bus", "not json");
    assert!(matches!(
        BusConfig::load(&ConfigService::new(garbage)),
        Err(ConfigError::Serde(_))
    ));

    let empty = InMemoryConfigStore::new();
    assert_eq!(
        BusConfig::load(&ConfigService::new(empty))
            .unwrap()
            .parallel_strategy,
        StrategyKind::Overwrite
    );
}
