// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Normalization of payloads into graph snapshots: references, minimal
//! edits, cycles, orphan collection, parameterized fields, and write errors.

mod common;

use std::rc::Rc;

use common::{baseline_ids, entity_selection, id, init_tracing, leaf, obj, vars};
use echo_cache::{
    ArgumentValue, Cache, CacheConfig, CacheError, FieldDirective, FieldPath, NodeId,
    NodeSnapshot, NodeVariant, Selection, SelectionField,
};
use serde_json::json;

#[test]
fn foo_scenario_stores_root_reference_and_entity() {
    init_tracing();
    let mut cache = Cache::default();
    let edited = cache
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1, "name": "Foo"}}))
        .unwrap();
    assert_eq!(edited.len(), 2);
    assert_eq!(baseline_ids(&cache), vec!["1", "ROOT_QUERY"]);

    let graph = cache.snapshot().baseline();
    assert_eq!(graph.node_data(&id("1")), Some(&json!({"id": 1, "name": "Foo"})));
    assert_eq!(
        graph.entity_reference_at(&NodeId::query_root(), &FieldPath::root().child_key("foo")),
        Some(&id("1"))
    );
    assert_eq!(graph.node_data(&NodeId::query_root()), Some(&json!({"foo": null})));
    let foo = FieldPath::root().child_key("foo");
    assert_eq!(
        graph.entity_references(&NodeId::query_root()).collect::<Vec<_>>(),
        vec![(&foo, &id("1"))]
    );

    let read = cache.read(&entity_selection("foo"), false);
    assert!(read.complete);
    assert_eq!(read.result, Some(json!({"foo": {"id": 1, "name": "Foo"}})));
}

#[test]
fn rewriting_the_same_payload_edits_nothing() {
    let mut cache = Cache::default();
    let payload = json!({"foo": {"id": 1, "name": "Foo"}});
    cache.write(&entity_selection("foo"), &payload).unwrap();
    let before = Rc::clone(cache.snapshot().baseline());
    let edited = cache.write(&entity_selection("foo"), &payload).unwrap();
    assert!(edited.is_empty());
    assert!(Rc::ptr_eq(&before, cache.snapshot().baseline()));
}

#[test]
fn untouched_nodes_keep_their_allocation() {
    let mut cache = Cache::default();
    let both = Selection::query(vec![
        obj("a", vec![leaf("id"), leaf("name")]),
        obj("b", vec![leaf("id"), leaf("name")]),
    ]);
    cache
        .write(
            &both,
            &json!({"a": {"id": "1", "name": "one"}, "b": {"id": "2", "name": "two"}}),
        )
        .unwrap();
    let before = Rc::clone(cache.snapshot().baseline());

    let edited = cache
        .write(&entity_selection("a"), &json!({"a": {"id": "1", "name": "uno"}}))
        .unwrap();
    let after = cache.snapshot().baseline();

    assert_eq!(edited.into_iter().collect::<Vec<_>>(), vec![id("1")]);
    for unchanged in [NodeId::query_root(), id("2")] {
        assert!(Rc::ptr_eq(
            before.node_rc(&unchanged).unwrap(),
            after.node_rc(&unchanged).unwrap()
        ));
    }
    assert!(!Rc::ptr_eq(
        before.node_rc(&id("1")).unwrap(),
        after.node_rc(&id("1")).unwrap()
    ));
}

#[test]
fn cyclic_payloads_terminate_and_link_both_ways() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![obj(
        "foo",
        vec![
            leaf("id"),
            obj("bar", vec![leaf("id"), obj("foo", vec![leaf("id")])]),
        ],
    )]);
    cache
        .write(
            &selection,
            &json!({"foo": {"id": "fooId", "bar": {"id": "barId", "foo": {"id": "fooId"}}}}),
        )
        .unwrap();
    let graph = cache.snapshot().baseline();
    assert_eq!(
        graph.entity_reference_at(&id("fooId"), &FieldPath::root().child_key("bar")),
        Some(&id("barId"))
    );
    assert_eq!(
        graph.entity_reference_at(&id("barId"), &FieldPath::root().child_key("foo")),
        Some(&id("fooId"))
    );
    let fooid = graph.get(&id("fooId")).unwrap();
    assert_eq!(fooid.inbound().len(), 2);

    let read = cache.read(&selection, false);
    assert!(read.complete);
    assert_eq!(
        read.result,
        Some(json!({"foo": {"id": "fooId", "bar": {"id": "barId", "foo": {"id": "fooId"}}}}))
    );
}

#[test]
fn nulling_the_only_reference_collects_orphans_transitively() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![obj(
        "foo",
        vec![leaf("id"), obj("bar", vec![leaf("id")])],
    )]);
    cache
        .write(&selection, &json!({"foo": {"id": "x", "bar": {"id": "y"}}}))
        .unwrap();
    assert_eq!(baseline_ids(&cache), vec!["ROOT_QUERY", "x", "y"]);

    let edited = cache.write(&selection, &json!({"foo": null})).unwrap();
    assert_eq!(baseline_ids(&cache), vec!["ROOT_QUERY"]);
    assert!(edited.contains(&id("x")) && edited.contains(&id("y")));
    assert_eq!(
        cache.read(&selection, false).result,
        Some(json!({"foo": null}))
    );
}

#[test]
fn omitting_the_only_reference_collects_orphans_transitively() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![obj(
        "foo",
        vec![leaf("id"), obj("bar", vec![leaf("id")])],
    )]);
    cache
        .write(&selection, &json!({"foo": {"id": "x", "bar": {"id": "y"}}}))
        .unwrap();

    let edited = cache.write(&selection, &json!({})).unwrap();
    assert_eq!(baseline_ids(&cache), vec!["ROOT_QUERY"]);
    assert!(edited.contains(&id("x")) && edited.contains(&id("y")));
    assert_eq!(
        cache.snapshot().baseline().node_data(&NodeId::query_root()),
        Some(&json!({"foo": null}))
    );
}

#[test]
fn omitted_parameterized_fields_release_their_entity() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![
        obj("user", vec![leaf("id"), leaf("name")]).literal_arg("id", json!(4)),
    ]);
    cache
        .write(&selection, &json!({"user": {"id": 4, "name": "Ann"}}))
        .unwrap();
    let param = NodeId::parameterized(
        &NodeId::query_root(),
        &FieldPath::root().child_key("user"),
        &vars(json!({"id": 4})),
    );

    cache.write(&selection, &json!({})).unwrap();
    let graph = cache.snapshot().baseline();
    assert!(!graph.contains(&id("4")));
    assert_eq!(graph.node_data(&param), Some(&json!(null)));
    assert_eq!(cache.read(&selection, false).result, Some(json!({"user": null})));
}

#[test]
fn shared_entities_survive_while_still_referenced() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![
        obj("first", vec![leaf("id")]),
        obj("second", vec![leaf("id")]),
    ]);
    cache
        .write(&selection, &json!({"first": {"id": "s"}, "second": {"id": "s"}}))
        .unwrap();
    cache
        .write(
            &Selection::query(vec![obj("first", vec![leaf("id")])]),
            &json!({"first": null}),
        )
        .unwrap();
    assert_eq!(baseline_ids(&cache), vec!["ROOT_QUERY", "s"]);
}

#[test]
fn mutually_referencing_entities_are_not_reclaimed_as_a_group() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![obj(
        "foo",
        vec![leaf("id"), obj("bar", vec![leaf("id"), obj("foo", vec![leaf("id")])])],
    )]);
    cache
        .write(
            &selection,
            &json!({"foo": {"id": "a", "bar": {"id": "b", "foo": {"id": "a"}}}}),
        )
        .unwrap();
    cache.write(&selection, &json!({"foo": null})).unwrap();
    assert_eq!(baseline_ids(&cache), vec!["ROOT_QUERY", "a", "b"]);
}

#[test]
fn shrinking_an_entity_list_drops_the_tail() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![obj("list", vec![leaf("id")])]);
    cache
        .write(&selection, &json!({"list": [{"id": 1}, {"id": 2}, {"id": 3}]}))
        .unwrap();
    assert_eq!(baseline_ids(&cache), vec!["1", "2", "3", "ROOT_QUERY"]);

    cache.write(&selection, &json!({"list": [{"id": 1}]})).unwrap();
    assert_eq!(baseline_ids(&cache), vec!["1", "ROOT_QUERY"]);
    assert_eq!(
        cache.snapshot().baseline().node_data(&NodeId::query_root()),
        Some(&json!({"list": [null]}))
    );
    assert_eq!(
        cache.read(&selection, false).result,
        Some(json!({"list": [{"id": 1}]}))
    );
}

#[test]
fn objects_without_ids_are_stored_inline() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![obj(
        "viewer",
        vec![leaf("name"), obj("settings", vec![leaf("dark")])],
    )]);
    cache
        .write(
            &selection,
            &json!({"viewer": {"name": "v", "settings": {"dark": false}}}),
        )
        .unwrap();
    assert_eq!(baseline_ids(&cache), vec!["ROOT_QUERY"]);
    assert_eq!(
        cache.read(&selection, false).result,
        Some(json!({"viewer": {"name": "v", "settings": {"dark": false}}}))
    );
}

#[test]
fn replacing_an_inline_object_with_an_entity_and_back() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![obj("owner", vec![leaf("id"), leaf("name")])]);
    cache
        .write(&selection, &json!({"owner": {"id": null, "name": "anon"}}))
        .unwrap();
    cache
        .write(&selection, &json!({"owner": {"id": 9, "name": "named"}}))
        .unwrap();
    assert_eq!(baseline_ids(&cache), vec!["9", "ROOT_QUERY"]);
    assert_eq!(
        cache.snapshot().baseline().node_data(&NodeId::query_root()),
        Some(&json!({"owner": null}))
    );

    cache
        .write(&selection, &json!({"owner": {"id": null, "name": "anon"}}))
        .unwrap();
    assert_eq!(baseline_ids(&cache), vec!["ROOT_QUERY"]);
    assert_eq!(
        cache.read(&selection, false).result,
        Some(json!({"owner": {"id": null, "name": "anon"}}))
    );
}

#[test]
fn falsy_scalars_and_aliases_are_preserved() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![
        leaf("zero"),
        leaf("empty"),
        leaf("no"),
        leaf("name").alias("displayName"),
    ]);
    cache
        .write(
            &selection,
            &json!({"zero": 0, "empty": "", "no": false, "displayName": "d"}),
        )
        .unwrap();
    assert_eq!(
        cache.snapshot().baseline().node_data(&NodeId::query_root()),
        Some(&json!({"zero": 0, "empty": "", "no": false, "name": "d"}))
    );
    let read = cache.read(&selection, false);
    assert!(read.complete);
    assert_eq!(
        read.result,
        Some(json!({"zero": 0, "empty": "", "no": false, "displayName": "d"}))
    );
}

#[test]
fn parameterized_fields_get_their_own_nodes() {
    let mut cache = Cache::default();
    let user = |v: serde_json::Value| {
        Selection::with_variables(
            NodeId::query_root(),
            vec![obj("user", vec![leaf("id"), leaf("name")]).variable_arg("id", "id")],
            vars(v),
        )
    };
    cache
        .write(&user(json!({"id": 4})), &json!({"user": {"id": 4, "name": "Ann"}}))
        .unwrap();

    let param = NodeId::parameterized(
        &NodeId::query_root(),
        &FieldPath::root().child_key("user"),
        &vars(json!({"id": 4})),
    );
    let graph = cache.snapshot().baseline();
    assert_eq!(
        graph.get(&param).map(NodeSnapshot::variant),
        Some(NodeVariant::ParameterizedValue)
    );
    assert_eq!(graph.node_data(&NodeId::query_root()), Some(&json!({})));
    assert_eq!(graph.entity_reference_at(&param, &FieldPath::root()), Some(&id("4")));

    let hit = cache.read(&user(json!({"id": 4})), false);
    assert!(hit.complete);
    assert_eq!(hit.result, Some(json!({"user": {"id": 4, "name": "Ann"}})));

    let miss = cache.read(&user(json!({"id": 5})), false);
    assert!(!miss.complete);
    assert_eq!(miss.result, Some(json!({})));
    assert!(miss.touched_node_ids.contains(&NodeId::parameterized(
        &NodeId::query_root(),
        &FieldPath::root().child_key("user"),
        &vars(json!({"id": 5})),
    )));
}

#[test]
fn parameterized_and_plain_variants_of_a_field_coexist() {
    let mut cache = Cache::default();
    let plain = Selection::query(vec![leaf("count")]);
    let filtered = Selection::query(vec![leaf("count").literal_arg("kind", json!("open"))]);
    cache.write(&plain, &json!({"count": 10})).unwrap();
    cache.write(&filtered, &json!({"count": 0})).unwrap();
    cache.write(&plain, &json!({"count": 11})).unwrap();

    assert_eq!(cache.read(&plain, false).result, Some(json!({"count": 11})));
    assert_eq!(cache.read(&filtered, false).result, Some(json!({"count": 0})));
}

#[test]
fn static_fields_are_stored_verbatim() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![SelectionField::new("avatar")
        .literal_arg("size", json!(64))
        .stored_statically()]);
    cache
        .write(&selection, &json!({"avatar": {"id": 3, "url": "a.png"}}))
        .unwrap();
    assert_eq!(baseline_ids(&cache), vec!["ROOT_QUERY"]);
    assert_eq!(
        cache.read(&selection, false).result,
        Some(json!({"avatar": {"id": 3, "url": "a.png"}}))
    );
}

#[test]
fn unusable_ids_are_identity_errors_and_nothing_is_committed() {
    let mut cache = Cache::default();
    cache
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1, "name": "Foo"}}))
        .unwrap();
    let before = Rc::clone(cache.snapshot().baseline());

    let err = cache
        .write(
            &Selection::query(vec![
                obj("foo", vec![leaf("id"), leaf("name")]),
                obj("bad", vec![leaf("id")]),
            ]),
            &json!({"foo": {"id": 1, "name": "changed"}, "bad": {"id": true}}),
        )
        .unwrap_err();
    assert!(matches!(err, CacheError::Identity { ref path, .. } if path == "bad"));
    assert!(Rc::ptr_eq(&before, cache.snapshot().baseline()));
}

#[test]
fn fields_expecting_identity_reject_anonymous_objects() {
    let mut cache = Cache::default();
    let selection = Selection::query(vec![
        obj("foo", vec![leaf("id"), leaf("name")]).expecting_identity()
    ]);
    let err = cache
        .write(&selection, &json!({"foo": {"name": "anon"}}))
        .unwrap_err();
    assert!(matches!(err, CacheError::Identity { .. }));
    assert!(cache.snapshot().baseline().is_empty());
}

#[test]
fn scalars_under_sub_selections_are_shape_errors() {
    let mut cache = Cache::default();
    let err = cache
        .write(&entity_selection("foo"), &json!({"foo": 3}))
        .unwrap_err();
    assert!(
        matches!(
            err,
            CacheError::Shape {
                ref path,
                expected: "object or array",
                found: "number",
            } if path == "foo"
        ),
        "unexpected error: {err}"
    );
}

#[test]
fn missing_fields_are_stored_as_null_unless_strict() {
    let mut lenient = Cache::default();
    lenient
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1, "name": "Foo"}}))
        .unwrap();
    lenient
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1}}))
        .unwrap();
    let read = lenient.read(&entity_selection("foo"), false);
    assert!(read.complete);
    assert_eq!(read.result, Some(json!({"foo": {"id": 1, "name": null}})));

    let mut strict = Cache::with_config(CacheConfig {
        strict: true,
        ..CacheConfig::default()
    });
    let err = strict
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1}}))
        .unwrap_err();
    assert!(matches!(err, CacheError::MissingField { ref path } if path == "foo.name"));
}

#[test]
fn namespaced_ids_keep_types_apart() {
    let mut cache = Cache::with_config(CacheConfig {
        namespace_ids_by_typename: true,
        ..CacheConfig::default()
    });
    let selection = Selection::query(vec![
        obj("user", vec![leaf("__typename"), leaf("id")]),
        obj("post", vec![leaf("__typename"), leaf("id")]),
    ]);
    cache
        .write(
            &selection,
            &json!({"user": {"__typename": "User", "id": 1}, "post": {"__typename": "Post", "id": 1}}),
        )
        .unwrap();
    assert_eq!(baseline_ids(&cache), vec!["Post:1", "ROOT_QUERY", "User:1"]);
}

#[test]
fn writes_rooted_at_an_entity_update_it_in_place() {
    let mut cache = Cache::default();
    cache
        .write(&entity_selection("foo"), &json!({"foo": {"id": 1, "name": "Foo"}}))
        .unwrap();
    let edited = cache
        .write(
            &Selection::new(id("1"), vec![leaf("name")]),
            &json!({"name": "Renamed"}),
        )
        .unwrap();
    assert_eq!(edited.into_iter().collect::<Vec<_>>(), vec![id("1")]);
    assert_eq!(
        cache.read(&entity_selection("foo"), false).result,
        Some(json!({"foo": {"id": 1, "name": "Renamed"}}))
    );
}

#[test]
fn skipped_fields_are_neither_written_nor_read() {
    let mut cache = Cache::default();
    let selection = |hide: bool| {
        Selection::with_variables(
            NodeId::query_root(),
            vec![
                leaf("shown"),
                leaf("secret").directive(FieldDirective::Skip(ArgumentValue::Variable(
                    "hide".to_owned(),
                ))),
            ],
            vars(json!({ "hide": hide })),
        )
    };
    cache
        .write(&selection(true), &json!({"shown": 1, "secret": 2}))
        .unwrap();
    assert_eq!(
        cache.snapshot().baseline().node_data(&NodeId::query_root()),
        Some(&json!({"shown": 1}))
    );
    let hidden = cache.read(&selection(true), false);
    assert!(hidden.complete);
    assert_eq!(hidden.result, Some(json!({"shown": 1})));
    assert!(!cache.read(&selection(false), false).complete);
}
