//! Loose JSON criteria.
//!
//! Accepts the associative-array style criteria callers send over the wire
//! and turns them into a typed [`Criteria`]:
//!
//! ```json
//! {
//!   "from": "User u INDEX BY u.Id, Role r",
//!   "select": "u, r",
//!   "joins": [{"leftJoin": "Permission", "condition": "%3$s.Id = %2$s.Id"}],
//!   "where": {"Name": "demo", "Id": [1, 2, 3]},
//!   "order": "Id DESC NULLS FIRST, Name",
//!   "limit": 10
//! }
//! ```
//!
//! A WHERE or HAVING array is a predicate tree; each element is a node
//! tagged by `type`:
//!
//! ```json
//! [
//!   {"type": "eq", "field": "Name", "value": "demo"},
//!   {"combinator": "or", "type": "in", "field": "Id", "values": [1, 2]},
//!   {"type": "group", "predicates": [{"type": "is_null", "field": "Email"}]}
//! ]
//! ```

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::trace;

use super::clause::{
    ClauseKind, Criteria, DistinctClause, FilterClause, FilterValue, GroupClause, JoinClause,
    JoinSpec, OrderClause, SelectClause, SelectItem, SourceClause, SourceSpec,
};
use super::error::{CriteriaError, CriteriaResult};
use super::predicate::{Combinator, Operand, PredicateGroup, PredicateNode};
use crate::sql::{BinaryOperator, ConditionType, JoinKind, ParamKey};

impl Criteria {
    /// Parse loose JSON criteria.
    ///
    /// Unknown keys are ignored and `null` clause values are skipped. A
    /// value that is not an object yields empty criteria.
    pub fn from_json(value: &Value) -> CriteriaResult<Criteria> {
        let Value::Object(map) = value else {
            trace!("criteria is not an object, nothing to apply");
            return Ok(Criteria::default());
        };

        let mut criteria = Criteria::default();
        for (key, value) in map {
            let Some(kind) = ClauseKind::from_key(key) else {
                trace!(key = %key, "ignoring unknown clause");
                continue;
            };
            // SET is rejected whatever it carries
            if kind == ClauseKind::Set {
                criteria.set = Some(value.clone());
                continue;
            }
            if value.is_null() {
                continue;
            }
            parse_clause(&mut criteria, kind, value)?;
        }
        Ok(criteria)
    }
}

fn parse_clause(criteria: &mut Criteria, kind: ClauseKind, value: &Value) -> CriteriaResult<()> {
    match kind {
        ClauseKind::Set => criteria.set = Some(value.clone()),
        ClauseKind::Source => criteria.source = Some(parse_source(value)?),
        ClauseKind::Select => criteria.select = Some(parse_select(value)?),
        ClauseKind::Distinct => criteria.distinct = Some(parse_distinct(value)?),
        ClauseKind::Join => criteria.join = Some(parse_join(value)?),
        ClauseKind::Where => criteria.where_clause = Some(parse_filter(kind, value)?),
        ClauseKind::Having => criteria.having = Some(parse_filter(kind, value)?),
        ClauseKind::Group => criteria.group = Some(parse_group(value)?),
        ClauseKind::Order => criteria.order = Some(parse_order(value)?),
        ClauseKind::Limit => criteria.limit = Some(parse_count(kind, value)?),
        ClauseKind::Offset => criteria.offset = Some(parse_count(kind, value)?),
        ClauseKind::Cache => {
            criteria.cacheable = Some(
                value
                    .as_bool()
                    .ok_or_else(|| CriteriaError::invalid_value(kind, "expected a boolean"))?,
            )
        }
    }
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

/// First string value found under any of `keys`.
fn string_at<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

fn owned_at(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    string_at(obj, keys).map(str::to_string)
}

fn string_list(kind: ClauseKind, items: &[Value]) -> CriteriaResult<Vec<String>> {
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| CriteriaError::invalid_shape(kind, "a list of strings"))
        })
        .collect()
}

// =============================================================================
// SOURCE / SELECT / DISTINCT
// =============================================================================

fn parse_source(value: &Value) -> CriteriaResult<SourceClause> {
    let kind = ClauseKind::Source;
    match value {
        Value::String(text) => Ok(SourceClause::Text(text.clone())),
        Value::Object(obj) => Ok(SourceClause::One(parse_source_spec(obj)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => parse_source_spec(obj),
                Value::String(name) => Ok(SourceSpec::new(name.as_str())),
                _ => Err(CriteriaError::invalid_shape(kind, "a list of source objects")),
            })
            .collect::<CriteriaResult<Vec<_>>>()
            .map(SourceClause::Many),
        _ => Err(CriteriaError::invalid_shape(kind, "a string, object or list")),
    }
}

fn parse_source_spec(obj: &Map<String, Value>) -> CriteriaResult<SourceSpec> {
    let entity = string_at(obj, &["from", "entity", "table"])
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CriteriaError::missing_key(ClauseKind::Source, "from"))?;
    Ok(SourceSpec {
        entity: entity.into(),
        alias: owned_at(obj, &["alias"]),
        index_by: owned_at(obj, &["indexBy", "index_by"]),
    })
}

fn parse_select(value: &Value) -> CriteriaResult<SelectClause> {
    let kind = ClauseKind::Select;
    match value {
        Value::String(text) if text.trim() == "*" => Ok(SelectClause::Wildcard),
        Value::String(text) => Ok(SelectClause::Text(text.clone())),
        Value::Object(obj) => string_at(obj, &["entity"])
            .map(|name| SelectClause::Entity(name.into()))
            .ok_or_else(|| CriteriaError::missing_key(kind, "entity")),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(field) => Ok(SelectItem::Field(field.clone())),
                Value::Object(obj) => string_at(obj, &["entity"])
                    .map(|name| SelectItem::Entity(name.into()))
                    .ok_or_else(|| CriteriaError::missing_key(kind, "entity")),
                _ => Err(CriteriaError::invalid_shape(kind, "a list of strings")),
            })
            .collect::<CriteriaResult<Vec<_>>>()
            .map(SelectClause::List),
        _ => Err(CriteriaError::invalid_shape(kind, "a string or list")),
    }
}

fn parse_distinct(value: &Value) -> CriteriaResult<DistinctClause> {
    match value {
        Value::Bool(flag) => Ok(DistinctClause::Flag(*flag)),
        Value::String(q) => Ok(DistinctClause::Quantifier(q.clone())),
        _ => Err(CriteriaError::invalid_shape(
            ClauseKind::Distinct,
            "a boolean or quantifier string",
        )),
    }
}

// =============================================================================
// JOIN
// =============================================================================

fn parse_join(value: &Value) -> CriteriaResult<JoinClause> {
    let kind = ClauseKind::Join;
    match value {
        Value::Object(obj) => Ok(JoinClause::One(parse_join_spec(obj)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => parse_join_spec(obj),
                _ => Err(CriteriaError::invalid_shape(kind, "a list of join objects")),
            })
            .collect::<CriteriaResult<Vec<_>>>()
            .map(JoinClause::Many),
        _ => Err(CriteriaError::invalid_shape(kind, "an object or list")),
    }
}

fn parse_join_spec(obj: &Map<String, Value>) -> CriteriaResult<JoinSpec> {
    let clause = ClauseKind::Join;

    // Either {"innerJoin": "Role"} or {"target": "Role", "kind": "inner"}
    let keyed = [
        ("join", JoinKind::Inner),
        ("innerJoin", JoinKind::Inner),
        ("inner_join", JoinKind::Inner),
        ("leftJoin", JoinKind::Left),
        ("left_join", JoinKind::Left),
    ]
    .into_iter()
    .find_map(|(key, kind)| obj.get(key).and_then(Value::as_str).map(|t| (kind, t)));

    let (kind, target) = match keyed {
        Some(found) => found,
        None => {
            let target = string_at(obj, &["target"])
                .ok_or_else(|| CriteriaError::missing_key(clause, "join"))?;
            let kind = match string_at(obj, &["kind", "type"]) {
                None => JoinKind::Inner,
                Some(k) if k.eq_ignore_ascii_case("inner") => JoinKind::Inner,
                Some(k) if k.eq_ignore_ascii_case("left") => JoinKind::Left,
                Some(k) => {
                    return Err(CriteriaError::invalid_value(
                        clause,
                        format!("unknown join kind '{}'", k),
                    ))
                }
            };
            (kind, target)
        }
    };

    if target.trim().is_empty() {
        return Err(CriteriaError::missing_key(clause, "join"));
    }

    let condition_type = match string_at(obj, &["conditionType", "condition_type"]) {
        None => None,
        Some(t) if t.trim().eq_ignore_ascii_case("on") => Some(ConditionType::On),
        Some(t) if t.trim().eq_ignore_ascii_case("with") => Some(ConditionType::With),
        Some(t) => {
            return Err(CriteriaError::invalid_value(
                clause,
                format!("unknown condition type '{}'", t),
            ))
        }
    };

    Ok(JoinSpec {
        kind,
        target: target.into(),
        alias: owned_at(obj, &["alias"]),
        condition_type,
        condition: owned_at(obj, &["condition"]),
        index_by: owned_at(obj, &["indexBy", "index_by"]),
    })
}

// =============================================================================
// WHERE / HAVING
// =============================================================================

fn parse_filter(kind: ClauseKind, value: &Value) -> CriteriaResult<FilterClause> {
    match value {
        Value::String(text) => Ok(FilterClause::Raw(text.clone())),
        Value::Array(items) => parse_predicate_group(kind, items).map(FilterClause::Predicate),
        Value::Object(obj) => {
            let map: IndexMap<String, FilterValue> = obj
                .iter()
                .map(|(field, value)| (field.clone(), parse_filter_value(value)))
                .collect();
            Ok(FilterClause::Map(map))
        }
        _ => Err(CriteriaError::invalid_shape(
            kind,
            "a string, mapping or predicate list",
        )),
    }
}

fn parse_filter_value(value: &Value) -> FilterValue {
    if let Value::Object(obj) = value {
        if let (Some(Value::Array(array)), Some(column_key)) =
            (obj.get("array"), string_at(obj, &["column_key"]))
        {
            return FilterValue::Pluck {
                array: array.clone(),
                column_key: column_key.to_string(),
            };
        }
    }
    FilterValue::from(value.clone())
}

fn parse_predicate_group(kind: ClauseKind, items: &[Value]) -> CriteriaResult<PredicateGroup> {
    let mut group = PredicateGroup::new();
    for item in items {
        let Value::Object(obj) = item else {
            return Err(CriteriaError::invalid_shape(kind, "a list of predicate objects"));
        };
        let combinator = match string_at(obj, &["combinator"]) {
            None => Combinator::And,
            Some(c) if c.eq_ignore_ascii_case("and") => Combinator::And,
            Some(c) if c.eq_ignore_ascii_case("or") => Combinator::Or,
            Some(c) => {
                return Err(CriteriaError::invalid_value(
                    kind,
                    format!("unknown combinator '{}'", c),
                ))
            }
        };
        let node = parse_predicate_node(kind, obj)?;
        group.entries.push((combinator, node));
    }
    Ok(group)
}

fn parse_predicate_node(kind: ClauseKind, obj: &Map<String, Value>) -> CriteriaResult<PredicateNode> {
    let node_type = string_at(obj, &["type"])
        .ok_or_else(|| CriteriaError::missing_key(kind, "type"))?
        .to_ascii_lowercase();

    let field = || {
        owned_at(obj, &["field", "identifier"]).ok_or_else(|| CriteriaError::missing_key(kind, "field"))
    };
    let value_at = |key: &'static str| {
        obj.get(key)
            .cloned()
            .ok_or_else(|| CriteriaError::missing_key(kind, key))
    };
    let text = || owned_at(obj, &["text", "literal", "expression"]).ok_or_else(|| CriteriaError::missing_key(kind, "text"));

    let node = match node_type.as_str() {
        "eq" | "ne" | "neq" | "lt" | "gt" | "lte" | "gte" => {
            let op = match node_type.as_str() {
                "eq" => BinaryOperator::Eq,
                "ne" | "neq" => BinaryOperator::Ne,
                "lt" => BinaryOperator::Lt,
                "gt" => BinaryOperator::Gt,
                "lte" => BinaryOperator::Lte,
                _ => BinaryOperator::Gte,
            };
            PredicateNode::compare(&field()?, op, value_at("value")?)
        }
        "comparison" | "operator" => {
            let op = string_at(obj, &["op", "operator"])
                .ok_or_else(|| CriteriaError::missing_key(kind, "op"))?
                .parse::<BinaryOperator>()
                .map_err(|e| CriteriaError::invalid_value(kind, e))?;
            let left = operand(kind, value_at("left")?, string_at(obj, &["left_type", "leftType"]), true)?;
            let right = operand(kind, value_at("right")?, string_at(obj, &["right_type", "rightType"]), false)?;
            PredicateNode::Comparison { left, op, right }
        }
        "between" | "not_between" => PredicateNode::Between {
            field: field()?,
            min: value_at("min")?,
            max: value_at("max")?,
            negated: node_type == "not_between",
        },
        "in" | "not_in" => {
            let values = match value_at("values")? {
                Value::Array(values) => values,
                other => vec![other],
            };
            PredicateNode::In {
                field: field()?,
                values,
                negated: node_type == "not_in",
            }
        }
        "is_null" | "is_not_null" => PredicateNode::IsNull {
            field: field()?,
            negated: node_type == "is_not_null",
        },
        "like" | "not_like" => PredicateNode::Like {
            field: field()?,
            pattern: owned_at(obj, &["pattern", "value"])
                .ok_or_else(|| CriteriaError::missing_key(kind, "pattern"))?,
            negated: node_type == "not_like",
        },
        "literal" => PredicateNode::Literal(text()?),
        "expression" => {
            let parameters = match obj.get("parameters") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(values)) => values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (ParamKey::Positional(i), v.clone()))
                    .collect(),
                Some(Value::Object(named)) => named
                    .iter()
                    .map(|(k, v)| (ParamKey::from(k.as_str()), v.clone()))
                    .collect(),
                Some(_) => {
                    return Err(CriteriaError::invalid_shape(
                        kind,
                        "expression parameters as a list or mapping",
                    ))
                }
            };
            PredicateNode::Expression {
                text: text()?,
                parameters,
            }
        }
        "group" | "nest" => match obj.get("predicates") {
            Some(Value::Array(items)) => PredicateNode::Group(parse_predicate_group(kind, items)?),
            _ => return Err(CriteriaError::missing_key(kind, "predicates")),
        },
        other => {
            return Err(CriteriaError::invalid_value(
                kind,
                format!("unknown predicate type '{}'", other),
            ))
        }
    };
    Ok(node)
}

fn operand(
    kind: ClauseKind,
    value: Value,
    tag: Option<&str>,
    default_identifier: bool,
) -> CriteriaResult<Operand> {
    let is_identifier = match tag {
        None => default_identifier,
        Some(t) if t.eq_ignore_ascii_case("identifier") => true,
        Some(t) if t.eq_ignore_ascii_case("value") => false,
        Some(t) => {
            return Err(CriteriaError::invalid_value(
                kind,
                format!("unknown operand type '{}'", t),
            ))
        }
    };
    match (is_identifier, value) {
        (true, Value::String(name)) => Ok(Operand::Identifier(name)),
        (true, _) => Err(CriteriaError::invalid_value(kind, "identifier operands must be strings")),
        (false, value) => Ok(Operand::Value(value)),
    }
}

// =============================================================================
// GROUP / ORDER / window
// =============================================================================

fn parse_group(value: &Value) -> CriteriaResult<GroupClause> {
    let kind = ClauseKind::Group;
    match value {
        Value::String(text) => Ok(GroupClause::Text(text.clone())),
        Value::Array(items) => string_list(kind, items).map(GroupClause::List),
        _ => Err(CriteriaError::invalid_shape(kind, "a string or list")),
    }
}

fn parse_order(value: &Value) -> CriteriaResult<OrderClause> {
    let kind = ClauseKind::Order;
    match value {
        Value::String(text) => Ok(OrderClause::Text(text.clone())),
        Value::Array(items) => string_list(kind, items).map(OrderClause::List),
        Value::Object(obj) => obj
            .iter()
            .map(|(field, dir)| match dir {
                Value::String(dir) => Ok((field.clone(), dir.clone())),
                Value::Null => Ok((field.clone(), String::new())),
                _ => Err(CriteriaError::invalid_shape(kind, "a mapping of field to direction")),
            })
            .collect::<CriteriaResult<IndexMap<_, _>>>()
            .map(OrderClause::Map),
        _ => Err(CriteriaError::invalid_shape(kind, "a string, list or mapping")),
    }
}

fn parse_count(kind: ClauseKind, value: &Value) -> CriteriaResult<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| CriteriaError::invalid_value(kind, "expected a non-negative integer"))
}
