//! Merge Property Tests
//!
//! Order, idempotence and round-trip guarantees of the merge engine.

use proptest::prelude::*;
use specmerge_core::{
    merge, merge_documents,
    output::{render, OutputFormat},
    tree::yaml_documents,
    Mapping, MergeError, Node, NodeKind,
};

fn doc(text: &str) -> Mapping {
    let value = serde_yaml::from_str(text).unwrap();
    match Node::from_yaml(value, "").unwrap() {
        Node::Mapping(map) => map,
        other => panic!("fixture is not a mapping: {other:?}"),
    }
}

#[test]
fn property_remerge_identical_document_is_noop() {
    let fragment = doc("openapi: 3.0.3\ninfo: {title: Pets, version: '1'}\ntags: [a, b]\npaths: {/pets: {get: {}}}");
    let once = merge_documents([fragment.clone()]).unwrap();
    let twice = merge_documents([fragment.clone(), fragment]).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn property_later_document_wins() {
    let a = doc("x: 1");
    let b = doc("x: 2");
    assert_eq!(merge_documents([a.clone(), b.clone()]).unwrap(), doc("x: 2"));
    assert_eq!(merge_documents([b, a]).unwrap(), doc("x: 1"));
}

#[test]
fn property_nested_mappings_combine() {
    let merged = merge_documents([doc("server: {port: 8080}"), doc("server: {host: x}")]).unwrap();
    assert_eq!(merged, doc("server: {port: 8080, host: x}"));
}

#[test]
fn property_mapping_into_scalar_conflicts() {
    let mut acc = doc("paths: simple");
    let err = merge(&mut acc, doc("paths: {/a: v}")).unwrap_err();
    assert_eq!(
        err,
        MergeError::TypeConflict {
            key: "paths".to_string(),
            existing: NodeKind::String,
            incoming: NodeKind::Mapping,
        }
    );
}

#[test]
fn property_scalar_over_mapping_overwrites() {
    // A = {paths: {/a: v}}, B = {paths: simple}: the scalar arrives second
    // and replaces the mapping outright.
    let merged = merge_documents([doc("paths: {/a: v}"), doc("paths: simple")]).unwrap();
    assert_eq!(merged, doc("paths: simple"));
}

#[test]
fn property_conflict_aborts_run() {
    let result = merge_documents([doc("a: 1"), doc("a: {b: 2}"), doc("c: 3")]);
    assert!(matches!(result, Err(MergeError::TypeConflict { .. })));
}

#[test]
fn property_null_overwrites() {
    let merged = merge_documents([doc("flag: true"), doc("flag: null")]).unwrap();
    assert_eq!(merged.get("flag"), Some(&Node::Null));
    assert_eq!(merged.len(), 1);
}

#[test]
fn property_round_trip_yaml_and_json() {
    let merged = Node::Mapping(
        merge_documents([
            doc("openapi: 3.0.3\ncount: 3\nratio: 0.5\nflag: false\nnothing: ~\nversion: '1.0'\ncode: '200'"),
            doc("nested: {list: [1, two, {three: 3.25}], empty: {}, seq: []}\n'yes': 'no'"),
        ])
        .unwrap(),
    );

    for format in [OutputFormat::Yaml, OutputFormat::Json] {
        let text = render(&merged, format).unwrap();
        let mut documents = yaml_documents(&text).unwrap();
        assert_eq!(documents.len(), 1);
        let reparsed = Node::from_yaml(documents.remove(0), "").unwrap();
        assert_eq!(reparsed, merged, "{:?} round trip changed the tree", format);
    }
}

fn scalar() -> impl Strategy<Value = Node> {
    prop_oneof![
        any::<i64>().prop_map(Node::Int),
        any::<bool>().prop_map(Node::Bool),
        "[a-z]{0,8}".prop_map(Node::String),
    ]
}

proptest! {
    #[test]
    fn property_disjoint_keys_any_order(values in prop::collection::vec(scalar(), 1..8)) {
        let documents: Vec<Mapping> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut m = Mapping::new();
                m.insert(format!("key{}", i), v.clone());
                m
            })
            .collect();

        let forward = merge_documents(documents.clone()).unwrap();
        let backward = merge_documents(documents.into_iter().rev()).unwrap();

        prop_assert_eq!(forward.len(), values.len());
        for (i, v) in values.iter().enumerate() {
            let key = format!("key{}", i);
            prop_assert_eq!(forward.get(&key), Some(v));
            prop_assert_eq!(backward.get(&key), Some(v));
        }
    }

    #[test]
    fn property_last_scalar_wins(values in prop::collection::vec(scalar(), 1..8)) {
        let documents = values.iter().map(|v| {
            let mut m = Mapping::new();
            m.insert("x".to_string(), v.clone());
            m
        });
        let merged = merge_documents(documents).unwrap();
        prop_assert_eq!(merged.get("x"), values.last());
    }
}
