//! Compiled query - the accumulated query object built from criteria.
//!
//! A [`CompiledQuery`] is bound to one or more root entities and grows
//! through `&mut self` accumulation methods, so a caller may hand a partially
//! built query to the criteria compiler and keep extending it afterwards.

use serde_json::Value;

use super::dialect::{Dialect, SqlDialect};
use super::expr::{combine, Expr, LogicalOp};
use super::params::{ParamKey, Parameters};
use super::token::{Token, TokenStream};

// =============================================================================
// Roots
// =============================================================================

/// A root entity in the FROM list.
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub entity: String,
    pub alias: String,
    pub index_by: Option<String>,
}

impl FromClause {
    pub fn new(entity: &str, alias: &str) -> Self {
        Self {
            entity: entity.into(),
            alias: alias.into(),
            index_by: None,
        }
    }

    pub fn with_index_by(mut self, field: &str) -> Self {
        self.index_by = Some(field.into());
        self
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Entity(self.entity.clone()))
            .space()
            .push(Token::Ident(self.alias.clone()));
        if let Some(field) = &self.index_by {
            if dialect.supports_index_by() {
                ts.space()
                    .push(Token::IndexBy)
                    .space()
                    .append(&Expr::reference(field).to_tokens());
            }
        }
        ts
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

/// How a join condition is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionType {
    On,
    #[default]
    With,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub entity: String,
    pub alias: String,
    pub condition_type: ConditionType,
    pub condition: Option<Expr>,
    pub index_by: Option<String>,
}

impl Join {
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self.kind {
            JoinKind::Inner => ts.push(Token::Inner),
            JoinKind::Left => ts.push(Token::Left),
        };

        ts.space().push(Token::Join).space();
        ts.push(Token::Entity(self.entity.clone()))
            .space()
            .push(Token::Ident(self.alias.clone()));

        if let Some(field) = &self.index_by {
            if dialect.supports_index_by() {
                ts.space()
                    .push(Token::IndexBy)
                    .space()
                    .append(&Expr::reference(field).to_tokens());
            }
        }

        if let Some(condition) = &self.condition {
            let keyword = match self.condition_type {
                ConditionType::With if dialect.supports_join_with() => Token::With,
                _ => Token::On,
            };
            ts.space().push(keyword).space();
            ts.append(&condition.to_tokens());
        }

        ts
    }
}

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// NULLS ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// An ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: SortDir,
    pub nulls: Option<NullsOrder>,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Asc,
            nulls: None,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Desc,
            nulls: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// Convert to tokens for a specific dialect.
    ///
    /// Skips NULLS FIRST/LAST for dialects that don't support it.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = self.expr.to_tokens();

        ts.space().push(match self.dir {
            SortDir::Asc => Token::Asc,
            SortDir::Desc => Token::Desc,
        });

        if let Some(nulls) = &self.nulls {
            if dialect.supports_nulls_ordering() {
                ts.space().push(match nulls {
                    NullsOrder::First => Token::NullsFirst,
                    NullsOrder::Last => Token::NullsLast,
                });
            }
        }

        ts
    }
}

// =============================================================================
// LIMIT / OFFSET
// =============================================================================

/// Result window: maximum results and first result offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffset {
    /// Delegates to `SqlDialect::emit_limit_offset()` for the actual formatting.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        dialect.emit_limit_offset(self.limit, self.offset)
    }
}

// =============================================================================
// Compiled Query
// =============================================================================

/// The accumulated query object.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "CompiledQuery has no effect until rendered with to_sql() or executed by a repository"]
pub struct CompiledQuery {
    pub select: Vec<Expr>,
    pub distinct: bool,
    pub from: Vec<FromClause>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit_offset: LimitOffset,
    pub parameters: Parameters,
    pub cacheable: bool,
}

impl CompiledQuery {
    /// Create an empty query with no roots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a query rooted at `entity` that selects it under `alias`.
    pub fn for_entity(entity: &str, alias: &str) -> Self {
        let mut query = Self::new();
        query.add_select(Expr::reference(alias));
        query.add_root(FromClause::new(entity, alias));
        query
    }

    // =========================================================================
    // Roots and aliases
    // =========================================================================

    pub fn add_root(&mut self, root: FromClause) -> &mut Self {
        self.from.push(root);
        self
    }

    /// Entity names of all roots, in registration order.
    pub fn root_entities(&self) -> Vec<&str> {
        self.from.iter().map(|f| f.entity.as_str()).collect()
    }

    /// Whether `entity` already is a root. A leading namespace separator is
    /// not significant.
    pub fn has_root(&self, entity: &str) -> bool {
        let wanted = entity.trim().trim_start_matches('\\');
        self.from
            .iter()
            .any(|f| f.entity.trim().trim_start_matches('\\') == wanted)
    }

    /// All `(alias, entity)` bindings: roots first, then joins.
    pub fn aliases(&self) -> Vec<(&str, &str)> {
        self.from
            .iter()
            .map(|f| (f.alias.as_str(), f.entity.as_str()))
            .chain(
                self.joins
                    .iter()
                    .map(|j| (j.alias.as_str(), j.entity.as_str())),
            )
            .collect()
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn add_select(&mut self, expr: Expr) -> &mut Self {
        self.select.push(expr);
        self
    }

    /// Drop repeated selection terms, keeping the first occurrence.
    pub fn dedup_select(&mut self) -> &mut Self {
        let mut unique: Vec<Expr> = Vec::with_capacity(self.select.len());
        for expr in self.select.drain(..) {
            if !unique.contains(&expr) {
                unique.push(expr);
            }
        }
        self.select = unique;
        self
    }

    pub fn set_distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    // =========================================================================
    // Joins
    // =========================================================================

    pub fn add_join(&mut self, join: Join) -> &mut Self {
        self.joins.push(join);
        self
    }

    // =========================================================================
    // WHERE / HAVING
    // =========================================================================

    /// AND a condition into WHERE.
    pub fn and_where(&mut self, condition: Expr) -> &mut Self {
        self.where_clause = accumulate(self.where_clause.take(), LogicalOp::And, condition);
        self
    }

    /// OR a condition into WHERE.
    pub fn or_where(&mut self, condition: Expr) -> &mut Self {
        self.where_clause = accumulate(self.where_clause.take(), LogicalOp::Or, condition);
        self
    }

    /// AND a condition into HAVING.
    pub fn and_having(&mut self, condition: Expr) -> &mut Self {
        self.having = accumulate(self.having.take(), LogicalOp::And, condition);
        self
    }

    /// OR a condition into HAVING.
    pub fn or_having(&mut self, condition: Expr) -> &mut Self {
        self.having = accumulate(self.having.take(), LogicalOp::Or, condition);
        self
    }

    // =========================================================================
    // Grouping, ordering, window, flags
    // =========================================================================

    pub fn add_group_by(&mut self, expr: Expr) -> &mut Self {
        self.group_by.push(expr);
        self
    }

    pub fn add_order_by(&mut self, order: OrderByExpr) -> &mut Self {
        self.order_by.push(order);
        self
    }

    pub fn set_limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.limit_offset.limit = limit;
        self
    }

    pub fn set_offset(&mut self, offset: Option<u64>) -> &mut Self {
        self.limit_offset.offset = offset;
        self
    }

    pub fn set_cacheable(&mut self, cacheable: bool) -> &mut Self {
        self.cacheable = cacheable;
        self
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Bind a value to the next free positional parameter.
    pub fn bind(&mut self, value: Value) -> ParamKey {
        self.parameters.bind(value)
    }

    pub fn set_parameter(&mut self, key: impl Into<ParamKey>, value: Value) -> &mut Self {
        self.parameters.set(key, value);
        self
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Convert to token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        // SELECT
        ts.push(Token::Select);
        if self.distinct {
            ts.space().push(Token::Distinct);
        }

        // An empty selection falls back to the root aliases
        let fallback: Vec<Expr>;
        let select = if self.select.is_empty() {
            fallback = self.from.iter().map(|f| Expr::reference(&f.alias)).collect();
            &fallback
        } else {
            &self.select
        };

        for (i, expr) in select.iter().enumerate() {
            if i == 0 {
                ts.newline().indent(1);
            } else {
                ts.comma().newline().indent(1);
            }
            ts.append(&self.select_tokens(expr, dialect));
        }

        // FROM
        for (i, root) in self.from.iter().enumerate() {
            if i == 0 {
                ts.newline().push(Token::From).space();
            } else {
                ts.comma().space();
            }
            ts.append(&root.to_tokens_for_dialect(dialect));
        }

        // JOINs
        for join in &self.joins {
            ts.newline();
            ts.append(&join.to_tokens_for_dialect(dialect));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            ts.append(&where_clause.to_tokens());
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens());
            }
        }

        // HAVING
        if let Some(having) = &self.having {
            ts.newline().push(Token::Having).space();
            ts.append(&having.to_tokens());
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&order.to_tokens_for_dialect(dialect));
            }
        }

        // LIMIT / OFFSET
        let window = self.limit_offset.to_tokens(dialect);
        if !window.is_empty() {
            ts.newline();
            ts.append(&window);
        }

        ts
    }

    fn select_tokens(&self, expr: &Expr, dialect: Dialect) -> TokenStream {
        if let Expr::Column {
            table: None,
            column,
        } = expr
        {
            let is_alias = self.aliases().iter().any(|(alias, _)| alias == column);
            if is_alias && !dialect.selects_entity_alias() {
                let mut ts = TokenStream::new();
                ts.push(Token::Ident(column.clone()))
                    .push(Token::Dot)
                    .push(Token::Star);
                return ts;
            }
        }
        expr.to_tokens()
    }

    /// Render the query text for a specific dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens_for_dialect(dialect).serialize(dialect)
    }

    /// Bound values in the order `dialect` expects them.
    ///
    /// Keyed dialects get the parameter set as bound. Dialects with
    /// anonymous placeholders get one entry per placeholder, in the order
    /// the placeholders appear in the rendered text; keys with no bound
    /// value are skipped.
    pub fn bind_values(&self, dialect: Dialect) -> Vec<(ParamKey, Value)> {
        if !dialect.anonymous_parameters() {
            return self
                .parameters
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
        }
        self.to_tokens_for_dialect(dialect)
            .param_keys()
            .into_iter()
            .filter_map(|key| {
                let value = self.parameters.get(&key)?.clone();
                Some((key, value))
            })
            .collect()
    }

    /// Cache key of this query, present only when the query is cacheable.
    pub fn cache_key(&self, dialect: Dialect) -> Option<String> {
        if !self.cacheable {
            return None;
        }
        crate::cache::query_fingerprint(&self.to_sql(dialect), dialect, &self.parameters)
    }
}

impl std::fmt::Display for CompiledQuery {
    /// Formats the query using the default dialect (DQL).
    ///
    /// For dialect-specific text, use [`CompiledQuery::to_sql`] instead.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql(Dialect::default()))
    }
}

fn accumulate(existing: Option<Expr>, op: LogicalOp, condition: Expr) -> Option<Expr> {
    Some(match existing {
        Some(existing) => combine(op, existing, condition),
        None => condition,
    })
}
