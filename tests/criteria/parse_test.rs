//! Tests for reading criteria from loose JSON.

use pretty_assertions::assert_eq;
use serde_json::json;
use sieve::criteria::{
    ClauseKind, Combinator, Criteria, CriteriaError, DistinctClause, FilterClause, FilterValue,
    GroupClause, JoinClause, JoinSpec, OrderClause, PredicateNode, SelectClause, SelectItem,
    SourceClause, SourceSpec,
};
use sieve::sql::{JoinKind, ParamKey};

#[test]
fn test_key_aliases() {
    let criteria = Criteria::from_json(&json!({
        "table": "User u",
        "columns": ["u.Name"],
        "groupBy": "u.Name",
        "orderBy": ["u.Name DESC"],
        "quantifier": "distinct",
        "cacheable": true
    }))
    .unwrap();

    assert_eq!(criteria.source, Some(SourceClause::Text("User u".into())));
    assert_eq!(
        criteria.select,
        Some(SelectClause::List(vec![SelectItem::Field("u.Name".into())]))
    );
    assert_eq!(criteria.group, Some(GroupClause::Text("u.Name".into())));
    assert_eq!(criteria.order, Some(OrderClause::List(vec!["u.Name DESC".into()])));
    assert_eq!(
        criteria.distinct,
        Some(DistinctClause::Quantifier("distinct".into()))
    );
    assert_eq!(criteria.cacheable, Some(true));
}

#[test]
fn test_source_object_and_list() {
    let one = Criteria::from_json(&json!({"from": {"entity": "Role", "alias": "r", "indexBy": "r.Id"}}))
        .unwrap();
    assert_eq!(
        one.source,
        Some(SourceClause::One(SourceSpec::new("Role").alias("r").index_by("r.Id")))
    );

    let many = Criteria::from_json(&json!({"from": ["Role", {"table": "Permission"}]})).unwrap();
    assert_eq!(
        many.source,
        Some(SourceClause::Many(vec![SourceSpec::new("Role"), SourceSpec::new("Permission")]))
    );

    let err = Criteria::from_json(&json!({"from": {"alias": "r"}})).unwrap_err();
    assert_eq!(
        err,
        CriteriaError::MissingKey {
            clause: ClauseKind::Source,
            key: "from"
        }
    );
}

#[test]
fn test_select_shapes() {
    let wildcard = Criteria::from_json(&json!({"select": " * "})).unwrap();
    assert_eq!(wildcard.select, Some(SelectClause::Wildcard));

    let entity = Criteria::from_json(&json!({"select": {"entity": "Role"}})).unwrap();
    assert_eq!(entity.select, Some(SelectClause::Entity("Role".into())));

    let err = Criteria::from_json(&json!({"select": 3})).unwrap_err();
    assert!(matches!(err, CriteriaError::InvalidShape { clause: ClauseKind::Select, .. }));
}

#[test]
fn test_join_shapes() {
    let criteria = Criteria::from_json(&json!({"joins": [
        {"leftJoin": "Role", "alias": "r", "conditionType": "ON", "condition": "%2$s.Id = %1$s.Id"},
        {"target": "Permission", "kind": "inner", "indexBy": "Permission.Id"}
    ]}))
    .unwrap();

    assert_eq!(
        criteria.join,
        Some(JoinClause::Many(vec![
            JoinSpec::left("Role").alias("r").on("%2$s.Id = %1$s.Id"),
            JoinSpec::new(JoinKind::Inner, "Permission").index_by("Permission.Id"),
        ]))
    );
}

#[test]
fn test_join_bad_condition_type() {
    let err = Criteria::from_json(&json!({"join": {"join": "Role", "conditionType": "using"}}))
        .unwrap_err();
    assert!(matches!(err, CriteriaError::InvalidValue { clause: ClauseKind::Join, .. }));
}

#[test]
fn test_where_map_values() {
    let criteria = Criteria::from_json(&json!({"where": {"Name": "demo", "Id": [1, 2]}})).unwrap();
    let Some(FilterClause::Map(map)) = criteria.where_clause else {
        panic!("expected a field map");
    };
    assert_eq!(map["Name"], FilterValue::Scalar(json!("demo")));
    assert_eq!(map["Id"], FilterValue::List(vec![json!(1), json!(2)]));
}

#[test]
fn test_predicate_tree() {
    let criteria = Criteria::from_json(&json!({"having": [
        {"type": "between", "field": "Age", "min": 18, "max": 65},
        {"combinator": "OR", "type": "not_in", "field": "Id", "values": 7},
        {"type": "nest", "predicates": [
            {"type": "like", "field": "Name", "pattern": "a%"},
            {"combinator": "or", "type": "is_not_null", "field": "Email"}
        ]},
        {"type": "expression", "text": "u.Score > :min", "parameters": {"min": 10}}
    ]}))
    .unwrap();

    let Some(FilterClause::Predicate(group)) = criteria.having else {
        panic!("expected predicate tree");
    };
    assert_eq!(group.entries.len(), 4);
    assert_eq!(group.entries[0].1, PredicateNode::between("Age", 18, 65));
    assert_eq!(group.entries[1].0, Combinator::Or);
    assert_eq!(
        group.entries[1].1,
        PredicateNode::in_list("Id", vec![json!(7)]).negate()
    );
    match &group.entries[2].1 {
        PredicateNode::Group(inner) => assert_eq!(inner.entries.len(), 2),
        other => panic!("expected group, got {:?}", other),
    }
    assert_eq!(
        group.entries[3].1,
        PredicateNode::expression("u.Score > :min", vec![(ParamKey::from("min"), json!(10))])
    );
}

#[test]
fn test_predicate_errors() {
    let missing_type = Criteria::from_json(&json!({"where": [{"field": "Id"}]})).unwrap_err();
    assert_eq!(
        missing_type,
        CriteriaError::MissingKey {
            clause: ClauseKind::Where,
            key: "type"
        }
    );

    let unknown = Criteria::from_json(&json!({"where": [{"type": "regex", "field": "Id"}]})).unwrap_err();
    assert!(matches!(unknown, CriteriaError::InvalidValue { .. }));

    let bad_op = Criteria::from_json(&json!({"where": [
        {"type": "comparison", "left": "Id", "op": "~", "right": 1}
    ]}))
    .unwrap_err();
    assert!(matches!(bad_op, CriteriaError::InvalidValue { clause: ClauseKind::Where, .. }));
}

#[test]
fn test_order_map_keeps_key_order() {
    let criteria = Criteria::from_json(&json!({"order": {"Name": "ASC", "Id": null}})).unwrap();
    let Some(OrderClause::Map(map)) = criteria.order else {
        panic!("expected an order mapping");
    };
    assert_eq!(
        map.into_iter().collect::<Vec<_>>(),
        vec![("Name".to_string(), "ASC".to_string()), ("Id".to_string(), String::new())]
    );
}

#[test]
fn test_cacheable_must_be_boolean() {
    let err = Criteria::from_json(&json!({"cache": "yes"})).unwrap_err();
    assert_eq!(err.clause(), ClauseKind::Cache);
}
