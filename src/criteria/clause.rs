//! Typed criteria description.
//!
//! Each clause kind has its own closed set of accepted shapes. Callers build
//! a [`Criteria`] directly or parse it from loose JSON with
//! [`Criteria::from_json`](super::parse).

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

use super::predicate::PredicateGroup;
use crate::schema::EntityMeta;
use crate::sql::{ConditionType, JoinKind, NullsOrder, SortDir};

// =============================================================================
// Clause kinds
// =============================================================================

/// Clause kinds, in the order the compiler applies them (SET first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Set,
    Source,
    Select,
    Distinct,
    Join,
    Where,
    Having,
    Group,
    Order,
    Limit,
    Offset,
    Cache,
}

impl ClauseKind {
    /// Processing order.
    pub const ORDER: [ClauseKind; 12] = [
        ClauseKind::Set,
        ClauseKind::Source,
        ClauseKind::Select,
        ClauseKind::Distinct,
        ClauseKind::Join,
        ClauseKind::Where,
        ClauseKind::Having,
        ClauseKind::Group,
        ClauseKind::Order,
        ClauseKind::Limit,
        ClauseKind::Offset,
        ClauseKind::Cache,
    ];

    /// Map a criteria key to its clause kind. Unknown keys yield `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        let kind = match key.trim() {
            "from" | "table" => ClauseKind::Source,
            "select" | "columns" => ClauseKind::Select,
            "join" | "joins" => ClauseKind::Join,
            "where" => ClauseKind::Where,
            "having" => ClauseKind::Having,
            "group" | "groupBy" | "group_by" => ClauseKind::Group,
            "order" | "orderBy" | "order_by" => ClauseKind::Order,
            "limit" => ClauseKind::Limit,
            "offset" => ClauseKind::Offset,
            "distinct" | "quantifier" => ClauseKind::Distinct,
            "cacheable" | "cache" => ClauseKind::Cache,
            "set" | "combine" => ClauseKind::Set,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClauseKind::Set => "set",
            ClauseKind::Source => "from",
            ClauseKind::Select => "select",
            ClauseKind::Distinct => "distinct",
            ClauseKind::Join => "join",
            ClauseKind::Where => "where",
            ClauseKind::Having => "having",
            ClauseKind::Group => "group",
            ClauseKind::Order => "order",
            ClauseKind::Limit => "limit",
            ClauseKind::Offset => "offset",
            ClauseKind::Cache => "cacheable",
        }
    }
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Entity references
// =============================================================================

/// An entity named by the caller: a logical or qualified name, or the
/// entity's metadata itself.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRef {
    Name(String),
    Entity(EntityMeta),
}

impl EntityRef {
    pub fn name(&self) -> &str {
        match self {
            EntityRef::Name(name) => name.trim(),
            EntityRef::Entity(meta) => meta.name.as_str(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.name().is_empty()
    }
}

impl From<&str> for EntityRef {
    fn from(name: &str) -> Self {
        EntityRef::Name(name.into())
    }
}

impl From<String> for EntityRef {
    fn from(name: String) -> Self {
        EntityRef::Name(name)
    }
}

impl From<EntityMeta> for EntityRef {
    fn from(meta: EntityMeta) -> Self {
        EntityRef::Entity(meta)
    }
}

// =============================================================================
// SOURCE
// =============================================================================

/// A root entity to add to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub entity: EntityRef,
    pub alias: Option<String>,
    pub index_by: Option<String>,
}

impl SourceSpec {
    pub fn new(entity: impl Into<EntityRef>) -> Self {
        Self {
            entity: entity.into(),
            alias: None,
            index_by: None,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn index_by(mut self, field: &str) -> Self {
        self.index_by = Some(field.into());
        self
    }
}

/// Accepted SOURCE shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceClause {
    One(SourceSpec),
    /// `"Entity alias INDEX BY field, Entity2 alias2, Entity3"`
    Text(String),
    Many(Vec<SourceSpec>),
}

// =============================================================================
// SELECT
// =============================================================================

/// One selection term.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// Field reference or any other select expression
    Field(String),
    /// Selects the entity's alias
    Entity(EntityRef),
}

/// Accepted SELECT shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectClause {
    Wildcard,
    Entity(EntityRef),
    /// Comma-separated terms
    Text(String),
    List(Vec<SelectItem>),
}

// =============================================================================
// DISTINCT
// =============================================================================

/// Accepted DISTINCT shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum DistinctClause {
    Flag(bool),
    /// `"distinct"` (any case) enables, anything else disables
    Quantifier(String),
}

impl DistinctClause {
    pub fn is_distinct(&self) -> bool {
        match self {
            DistinctClause::Flag(flag) => *flag,
            DistinctClause::Quantifier(q) => q.trim().eq_ignore_ascii_case("distinct"),
        }
    }
}

// =============================================================================
// JOIN
// =============================================================================

/// A join to add to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub target: EntityRef,
    pub alias: Option<String>,
    /// Defaults to [`ConditionType::With`]
    pub condition_type: Option<ConditionType>,
    /// Template with `%N$s` alias placeholders. Synthesized when absent.
    pub condition: Option<String>,
    pub index_by: Option<String>,
}

impl JoinSpec {
    pub fn new(kind: JoinKind, target: impl Into<EntityRef>) -> Self {
        Self {
            kind,
            target: target.into(),
            alias: None,
            condition_type: None,
            condition: None,
            index_by: None,
        }
    }

    pub fn inner(target: impl Into<EntityRef>) -> Self {
        Self::new(JoinKind::Inner, target)
    }

    pub fn left(target: impl Into<EntityRef>) -> Self {
        Self::new(JoinKind::Left, target)
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn on(mut self, condition: &str) -> Self {
        self.condition_type = Some(ConditionType::On);
        self.condition = Some(condition.into());
        self
    }

    pub fn with(mut self, condition: &str) -> Self {
        self.condition_type = Some(ConditionType::With);
        self.condition = Some(condition.into());
        self
    }

    pub fn index_by(mut self, field: &str) -> Self {
        self.index_by = Some(field.into());
        self
    }
}

/// Accepted JOIN shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinClause {
    One(JoinSpec),
    Many(Vec<JoinSpec>),
}

// =============================================================================
// WHERE / HAVING
// =============================================================================

/// Value side of a field→value filter pair.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// `field = ?N`
    Scalar(Value),
    /// `field IN (?N)`
    List(Vec<Value>),
    /// `field IN (?N)` over `column_key` taken from each object in `array`
    Pluck { array: Vec<Value>, column_key: String },
}

impl FilterValue {
    /// The value bound to the parameter.
    pub fn to_parameter(&self) -> Value {
        match self {
            FilterValue::Scalar(v) => v.clone(),
            FilterValue::List(values) => Value::Array(values.clone()),
            FilterValue::Pluck { array, column_key } => Value::Array(
                array
                    .iter()
                    .map(|item| item.get(column_key).cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }

    pub fn is_list(&self) -> bool {
        !matches!(self, FilterValue::Scalar(_))
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(values) => FilterValue::List(values),
            other => FilterValue::Scalar(other),
        }
    }
}

/// Accepted WHERE and HAVING shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    Predicate(PredicateGroup),
    Map(IndexMap<String, FilterValue>),
    Raw(String),
}

// =============================================================================
// GROUP / ORDER
// =============================================================================

/// Accepted GROUP shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupClause {
    /// Comma-separated fields
    Text(String),
    List(Vec<String>),
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub field: String,
    pub direction: SortDir,
    pub nulls: Option<NullsOrder>,
}

impl OrderSpec {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.into(),
            direction: SortDir::Asc,
            nulls: None,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.into(),
            direction: SortDir::Desc,
            nulls: None,
        }
    }

    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }
}

/// Accepted ORDER shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderClause {
    /// `"Id DESC NULLS FIRST, Name"`
    Text(String),
    /// `["Id DESC NULLS FIRST", "Name"]`
    List(Vec<String>),
    /// `{"Id": "DESC NULLS FIRST", "Name": "ASC"}`
    Map(IndexMap<String, String>),
    Specs(Vec<OrderSpec>),
}

// =============================================================================
// Criteria
// =============================================================================

/// A criteria description: at most one value per clause kind.
///
/// Clauses are applied in [`ClauseKind::ORDER`], independent of the order
/// they were set in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub source: Option<SourceClause>,
    pub select: Option<SelectClause>,
    pub distinct: Option<DistinctClause>,
    pub join: Option<JoinClause>,
    pub where_clause: Option<FilterClause>,
    pub having: Option<FilterClause>,
    pub group: Option<GroupClause>,
    pub order: Option<OrderClause>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub cacheable: Option<bool>,
    /// Any payload here is rejected.
    pub set: Option<Value>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: SourceClause) -> Self {
        self.source = Some(source);
        self
    }

    pub fn select(mut self, select: SelectClause) -> Self {
        self.select = Some(select);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = Some(DistinctClause::Flag(distinct));
        self
    }

    pub fn join(mut self, join: JoinClause) -> Self {
        self.join = Some(join);
        self
    }

    pub fn filter(mut self, filter: FilterClause) -> Self {
        self.where_clause = Some(filter);
        self
    }

    /// WHERE from field→value pairs.
    pub fn where_eq<I, K>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), FilterValue::from(v)))
            .collect();
        self.filter(FilterClause::Map(map))
    }

    pub fn having(mut self, having: FilterClause) -> Self {
        self.having = Some(having);
        self
    }

    pub fn group(mut self, group: GroupClause) -> Self {
        self.group = Some(group);
        self
    }

    pub fn order(mut self, order: OrderClause) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = Some(cacheable);
        self
    }

    /// Whether no clause is set.
    pub fn is_empty(&self) -> bool {
        *self == Criteria::default()
    }
}
