// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Change delivery: query observers, entity updaters, tracer hooks, and read
//! memoization across snapshots.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{entity_selection, id, init_tracing, leaf, obj};
use echo_cache::{
    Cache, CacheConfig, CacheContext, CacheTracer, ChangeId, ReadResult, Selection,
    SerializedCache, TxId,
};
use serde_json::{json, Value};

type Log<T> = Rc<RefCell<Vec<T>>>;

fn recorder() -> (Log<Option<Value>>, impl FnMut(&ReadResult) + 'static) {
    let log: Log<Option<Value>> = Rc::default();
    let sink = Rc::clone(&log);
    (log, move |r: &ReadResult| sink.borrow_mut().push(r.result.clone()))
}

fn seeded() -> Cache {
    let mut cache = Cache::default();
    cache
        .write(
            &Selection::query(vec![
                obj("foo", vec![leaf("id"), leaf("name")]),
                obj("bar", vec![leaf("id"), leaf("name")]),
            ]),
            &json!({"foo": {"id": 1, "name": "Foo"}, "bar": {"id": 2, "name": "Bar"}}),
        )
        .unwrap();
    cache
}

#[test]
fn observers_see_changes_to_what_they_read() {
    init_tracing();
    let mut cache = seeded();
    let (log, callback) = recorder();
    let observer = cache.watch(entity_selection("foo"), false, callback);
    assert!(log.borrow().is_empty());

    cache
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1, "name": "Renamed"}}))
        .unwrap();
    assert_eq!(
        *log.borrow(),
        vec![Some(json!({"foo": {"id": 1, "name": "Renamed"}}))]
    );

    assert!(cache.unwatch(observer));
    assert!(!cache.unwatch(observer));
    cache
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1, "name": "Again"}}))
        .unwrap();
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn unrelated_and_identical_writes_do_not_call_back() {
    let mut cache = seeded();
    let (log, callback) = recorder();
    cache.watch(entity_selection("foo"), false, callback);

    cache
        .write(
            &Selection::new(id("2"), vec![leaf("name")]),
            &json!({"name": "Other"}),
        )
        .unwrap();
    cache
        .write(&Selection::query(vec![leaf("flag")]), &json!({"flag": true}))
        .unwrap();
    cache
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1, "name": "Foo"}}))
        .unwrap();
    assert!(log.borrow().is_empty());
}

#[test]
fn optimistic_observers_follow_writes_and_rollbacks() {
    let mut cache = seeded();
    let (optimistic_log, on_optimistic) = recorder();
    let (baseline_log, on_baseline) = recorder();
    cache.watch(entity_selection("foo"), true, on_optimistic);
    cache.watch(entity_selection("foo"), false, on_baseline);

    cache
        .write_optimistic(
            ChangeId::new("edit"),
            &entity_selection("foo"),
            &json!({"foo": {"id": 1, "name": "Pending"}}),
        )
        .unwrap();
    cache.rollback(&ChangeId::new("edit")).unwrap();

    assert_eq!(
        *optimistic_log.borrow(),
        vec![
            Some(json!({"foo": {"id": 1, "name": "Pending"}})),
            Some(json!({"foo": {"id": 1, "name": "Foo"}})),
        ]
    );
    assert!(baseline_log.borrow().is_empty());
}

#[test]
fn observers_are_told_when_a_restore_changes_their_result() {
    let mut cache = seeded();
    let (log, callback) = recorder();
    cache.watch(entity_selection("foo"), false, callback);

    let serialized = SerializedCache::from_value(&json!({
        "ROOT_QUERY": {"variant": "Entity", "data": {}}
    }))
    .unwrap();
    cache.restore(&serialized, None, None).unwrap();
    assert_eq!(*log.borrow(), vec![Some(json!({}))]);

    cache.reset();
    assert_eq!(log.borrow().last(), Some(&None));
}

#[test]
fn entity_updaters_receive_previous_and_current_data() {
    let updates: Log<(String, Option<Value>, Option<Value>)> = Rc::default();
    let sink = Rc::clone(&updates);
    let context = CacheContext::new(CacheConfig::default()).with_entity_updater("User", move |u| {
        sink.borrow_mut()
            .push((u.id.to_string(), u.previous.cloned(), u.current.cloned()));
    });
    let mut cache = Cache::new(context);
    let selection = Selection::query(vec![obj(
        "me",
        vec![leaf("__typename"), leaf("id"), leaf("name")],
    )]);

    cache
        .write(&selection, &json!({"me": {"__typename": "User", "id": "u", "name": "A"}}))
        .unwrap();
    cache
        .write(&selection, &json!({"me": {"__typename": "User", "id": "u", "name": "B"}}))
        .unwrap();
    cache.write(&selection, &json!({"me": null})).unwrap();

    let first = json!({"__typename": "User", "id": "u", "name": "A"});
    let second = json!({"__typename": "User", "id": "u", "name": "B"});
    assert_eq!(
        *updates.borrow(),
        vec![
            ("u".to_owned(), None, Some(first.clone())),
            ("u".to_owned(), Some(first), Some(second.clone())),
            ("u".to_owned(), Some(second), None),
        ]
    );
}

#[test]
fn entity_updaters_can_resolve_reference_placeholders() {
    let updates: Log<(String, Option<Value>, Vec<(String, String)>)> = Rc::default();
    let sink = Rc::clone(&updates);
    let context = CacheContext::new(CacheConfig::default()).with_entity_updater("User", move |u| {
        let refs = u
            .current_references
            .iter()
            .map(|r| (r.path.to_string(), r.id.to_string()))
            .collect();
        sink.borrow_mut()
            .push((u.id.to_string(), u.current.cloned(), refs));
    });
    let mut cache = Cache::new(context);
    let selection = Selection::query(vec![obj(
        "me",
        vec![
            leaf("__typename"),
            leaf("id"),
            obj("friend", vec![leaf("__typename"), leaf("id")]),
        ],
    )]);
    cache
        .write(
            &selection,
            &json!({"me": {"__typename": "User", "id": "u",
                           "friend": {"__typename": "User", "id": "f"}}}),
        )
        .unwrap();

    assert_eq!(
        *updates.borrow(),
        vec![
            ("f".to_owned(), Some(json!({"__typename": "User", "id": "f"})), vec![]),
            (
                "u".to_owned(),
                Some(json!({"__typename": "User", "id": "u", "friend": null})),
                vec![("friend".to_owned(), "f".to_owned())],
            ),
        ]
    );
}

#[derive(Default, Clone)]
struct RecordingTracer {
    events: Log<String>,
}

impl CacheTracer for RecordingTracer {
    fn transaction_start(&self, tx: TxId) {
        self.events.borrow_mut().push(format!("start {tx}"));
    }

    fn transaction_end(&self, tx: TxId, committed: bool, edited_nodes: usize) {
        self.events
            .borrow_mut()
            .push(format!("end {tx} committed={committed} edited={edited_nodes}"));
    }

    fn write_end(&self, _selection: &Selection, edited_nodes: usize) {
        self.events
            .borrow_mut()
            .push(format!("write edited={edited_nodes}"));
    }

    fn read_end(&self, _selection: &Selection, complete: bool, memoized: bool) {
        self.events
            .borrow_mut()
            .push(format!("read complete={complete} memoized={memoized}"));
    }
}

#[test]
fn tracer_sees_transaction_boundaries_and_memoized_reads() {
    let tracer = RecordingTracer::default();
    let mut cache = Cache::new(CacheContext::default().with_tracer(tracer.clone()));

    cache
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1, "name": "Foo"}}))
        .unwrap();
    let first = cache.read(&entity_selection("foo"), false);
    let second = cache.read(&entity_selection("foo"), false);
    assert!(Rc::ptr_eq(&first, &second));

    let failed = cache.write(&entity_selection("foo"), &json!({"foo": 1}));
    assert!(failed.is_err());

    assert_eq!(
        *tracer.events.borrow(),
        vec![
            "start 1",
            "write edited=2",
            "end 1 committed=true edited=2",
            "read complete=true memoized=false",
            "read complete=true memoized=true",
            "start 2",
            "end 2 committed=false edited=0",
        ]
    );
}

#[test]
fn memoized_reads_survive_edits_to_other_nodes() {
    let mut cache = seeded();
    let bar_name = Selection::new(id("2"), vec![leaf("name")]);
    let before = cache.read(&bar_name, false);
    let foo_before = cache.read(&entity_selection("foo"), false);

    let edited = cache
        .write(
            &Selection::new(id("1"), vec![leaf("name")]),
            &json!({"name": "Changed"}),
        )
        .unwrap();
    assert_eq!(edited.into_iter().collect::<Vec<_>>(), vec![id("1")]);

    let after = cache.read(&bar_name, false);
    assert!(Rc::ptr_eq(&before, &after));
    let foo_after = cache.read(&entity_selection("foo"), false);
    assert!(!Rc::ptr_eq(&foo_before, &foo_after));
    assert_eq!(
        foo_after.result,
        Some(json!({"foo": {"id": 1, "name": "Changed"}}))
    );
}

#[test]
fn memoization_can_be_disabled() {
    let mut cache = Cache::with_config(CacheConfig {
        max_read_cache_entries: 0,
        ..CacheConfig::default()
    });
    cache
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1, "name": "Foo"}}))
        .unwrap();
    let first = cache.read(&entity_selection("foo"), false);
    let second = cache.read(&entity_selection("foo"), false);
    assert!(!Rc::ptr_eq(&first, &second));
    assert_eq!(first, second);
    assert_eq!(cache.snapshot().baseline().memoized_reads(), 0);
}
