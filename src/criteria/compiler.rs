//! Criteria compiler - builds a [`CompiledQuery`] from a [`Criteria`].
//!
//! Clauses are applied in a fixed order (SET is rejected up front, then
//! SOURCE, SELECT, DISTINCT, JOIN, WHERE, HAVING, GROUP, ORDER, LIMIT,
//! OFFSET, CACHE) because later clauses resolve field references against
//! aliases registered by earlier ones.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sieve::criteria::{Criteria, CriteriaCompiler, OrderClause};
//!
//! let compiler = CriteriaCompiler::new(Arc::new(schema), "App\\Entity\\User");
//! let criteria = Criteria::new()
//!     .where_eq([("Name", json!("demo"))])
//!     .order(OrderClause::Text("Id DESC NULLS FIRST".into()));
//! let query = compiler.compile(&criteria, None)?;
//! println!("{}", query);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::alias::{derive_alias, AliasContext, AliasStyle};
use super::clause::{
    ClauseKind, Criteria, DistinctClause, EntityRef, FilterClause, GroupClause, JoinClause,
    JoinSpec, OrderClause, OrderSpec, SelectClause, SelectItem, SourceClause, SourceSpec,
};
use super::error::{CriteriaError, CriteriaResult};
use super::predicate::{FilterTarget, PredicateTransformer};
use crate::config::CompilerSettings;
use crate::schema::Schema;
use crate::sql::dialect::helpers::{entity_namespace, short_entity_name};
use crate::sql::{
    combine, raw, table_col, CompiledQuery, ConditionType, Expr, ExprExt, FromClause, Join,
    LogicalOp, NullsOrder, OrderByExpr, SortDir,
};

/// `field [ASC|DESC] [NULLS FIRST|LAST]`
static ORDER_TERM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(.+?)(?:\s+(ASC|DESC))?(?:\s+NULLS\s+(FIRST|LAST))?\s*$").unwrap()
});

// =============================================================================
// Options
// =============================================================================

/// Compiler behavior that does not come from the criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Namespace for unqualified entity names. Falls back to the namespace
    /// of the compiled entity.
    pub default_namespace: Option<String>,
    pub alias_style: AliasStyle,
    /// Join field when the target has no known primary key.
    pub guess_join_field: String,
    /// Upper bound for LIMIT.
    pub max_limit: Option<u64>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::from(&CompilerSettings::default())
    }
}

impl From<&CompilerSettings> for CompilerOptions {
    fn from(settings: &CompilerSettings) -> Self {
        Self {
            default_namespace: settings
                .default_namespace
                .as_deref()
                .map(|ns| ns.trim().trim_matches('\\').to_string())
                .filter(|ns| !ns.is_empty()),
            alias_style: settings.alias_style,
            guess_join_field: settings.guess_join_field.trim().to_string(),
            max_limit: settings.max_limit,
        }
    }
}

// =============================================================================
// Compiler
// =============================================================================

/// Compiles criteria for one primary entity.
#[derive(Debug, Clone)]
pub struct CriteriaCompiler {
    schema: Arc<Schema>,
    entity: String,
    options: CompilerOptions,
}

impl CriteriaCompiler {
    /// Create a compiler for `entity`. A name known to the schema is
    /// replaced by its fully-qualified form.
    pub fn new(schema: Arc<Schema>, entity: &str) -> Self {
        let entity = schema
            .get(entity)
            .map(|meta| meta.name.clone())
            .unwrap_or_else(|| entity.trim().to_string());
        Self {
            schema,
            entity,
            options: CompilerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    /// The primary entity.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// A fresh query rooted at the primary entity, selecting it.
    pub fn new_query(&self) -> CompiledQuery {
        let alias = derive_alias(&self.entity, self.options.alias_style);
        CompiledQuery::for_entity(&self.entity, &alias)
    }

    /// Compile `criteria` into `existing`, or into a fresh query.
    pub fn compile(
        &self,
        criteria: &Criteria,
        existing: Option<CompiledQuery>,
    ) -> CriteriaResult<CompiledQuery> {
        let mut query = existing.unwrap_or_else(|| self.new_query());
        self.compile_into(criteria, &mut query)?;
        Ok(query)
    }

    /// Parse loose JSON criteria and compile them.
    pub fn compile_json(
        &self,
        criteria: &Value,
        existing: Option<CompiledQuery>,
    ) -> CriteriaResult<CompiledQuery> {
        self.compile(&Criteria::from_json(criteria)?, existing)
    }

    /// Apply every clause of `criteria` to `query`.
    pub fn compile_into(&self, criteria: &Criteria, query: &mut CompiledQuery) -> CriteriaResult<()> {
        for kind in ClauseKind::ORDER {
            self.apply(kind, criteria, query)?;
        }
        Ok(())
    }

    fn apply(
        &self,
        kind: ClauseKind,
        criteria: &Criteria,
        query: &mut CompiledQuery,
    ) -> CriteriaResult<()> {
        match kind {
            ClauseKind::Set => {
                if criteria.set.is_some() {
                    return Err(CriteriaError::Unsupported { clause: kind });
                }
            }
            ClauseKind::Source => {
                if let Some(source) = &criteria.source {
                    debug!(clause = %kind, "applying clause");
                    self.apply_source(source, query)?;
                }
            }
            ClauseKind::Select => {
                if let Some(select) = &criteria.select {
                    debug!(clause = %kind, "applying clause");
                    self.apply_select(select, query);
                }
            }
            ClauseKind::Distinct => {
                if let Some(distinct) = &criteria.distinct {
                    self.apply_distinct(distinct, query);
                }
            }
            ClauseKind::Join => {
                if let Some(join) = &criteria.join {
                    debug!(clause = %kind, "applying clause");
                    self.apply_join(join, query)?;
                }
            }
            ClauseKind::Where => {
                if let Some(filter) = &criteria.where_clause {
                    debug!(clause = %kind, "applying clause");
                    self.apply_filter(FilterTarget::Where, filter, query);
                }
            }
            ClauseKind::Having => {
                if let Some(filter) = &criteria.having {
                    debug!(clause = %kind, "applying clause");
                    self.apply_filter(FilterTarget::Having, filter, query);
                }
            }
            ClauseKind::Group => {
                if let Some(group) = &criteria.group {
                    debug!(clause = %kind, "applying clause");
                    self.apply_group(group, query);
                }
            }
            ClauseKind::Order => {
                if let Some(order) = &criteria.order {
                    debug!(clause = %kind, "applying clause");
                    self.apply_order(order, query);
                }
            }
            ClauseKind::Limit => match criteria.limit {
                Some(0) | None => {}
                Some(limit) => {
                    let limit = self.options.max_limit.map_or(limit, |max| limit.min(max));
                    query.set_limit(Some(limit));
                }
            },
            ClauseKind::Offset => match criteria.offset {
                Some(0) | None => {}
                Some(offset) => {
                    query.set_offset(Some(offset));
                }
            },
            ClauseKind::Cache => {
                if criteria.cacheable == Some(true) {
                    query.set_cacheable(true);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Entity names
    // =========================================================================

    /// Namespace for unqualified names.
    fn default_namespace(&self) -> Option<&str> {
        self.options
            .default_namespace
            .as_deref()
            .or_else(|| entity_namespace(&self.entity))
    }

    /// Qualify an entity name with the default namespace when it has none.
    ///
    /// A qualified form unknown to the schema falls back to the schema's own
    /// entry for the short name.
    fn resolve_entity(&self, entity: &EntityRef) -> String {
        let name = match entity {
            EntityRef::Entity(meta) => return meta.name.clone(),
            EntityRef::Name(name) => name.trim(),
        };

        if short_entity_name(name) != name.trim_start_matches('\\') {
            return name.to_string();
        }

        let qualified = self.default_namespace().map(|ns| {
            let separator = if ns.contains("::") {
                "::"
            } else if ns.contains('.') && !ns.contains('\\') {
                "."
            } else {
                "\\"
            };
            format!("{}{}{}", ns, separator, name.trim_start_matches('\\'))
        });

        match qualified {
            Some(q) if self.schema.contains(&q) || self.schema.get(name).is_none() => q,
            _ => self
                .schema
                .get(name)
                .map(|meta| meta.name.clone())
                .unwrap_or_else(|| name.to_string()),
        }
    }

    fn alias_for(&self, explicit: Option<&str>, entity: &str, aliases: &AliasContext) -> String {
        match explicit.map(str::trim).filter(|a| !a.is_empty()) {
            Some(alias) => alias.to_string(),
            None => aliases.unique_alias(&derive_alias(entity, self.options.alias_style)),
        }
    }

    // =========================================================================
    // SOURCE
    // =========================================================================

    fn apply_source(&self, source: &SourceClause, query: &mut CompiledQuery) -> CriteriaResult<()> {
        let specs = match source {
            SourceClause::One(spec) => vec![spec.clone()],
            SourceClause::Many(specs) => specs.clone(),
            SourceClause::Text(text) => split_list(text)
                .iter()
                .filter_map(|part| parse_source_term(part))
                .collect(),
        };

        let mut aliases = AliasContext::from_query(query);
        for spec in specs {
            if spec.entity.is_blank() {
                return Err(CriteriaError::missing_key(ClauseKind::Source, "from"));
            }
            let entity = self.resolve_entity(&spec.entity);
            if query.has_root(&entity) {
                debug!(entity = %entity, "entity already a root, skipping");
                continue;
            }
            let alias = self.alias_for(spec.alias.as_deref(), &entity, &aliases);
            aliases.register(&alias, &entity);

            let mut root = FromClause::new(&entity, &alias);
            root.index_by = spec
                .index_by
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty());
            query.add_root(root);
        }
        Ok(())
    }

    // =========================================================================
    // SELECT / DISTINCT
    // =========================================================================

    fn apply_select(&self, select: &SelectClause, query: &mut CompiledQuery) {
        let aliases = AliasContext::from_query(query);
        let items: Vec<SelectItem> = match select {
            SelectClause::Wildcard => return,
            SelectClause::Entity(entity) => vec![SelectItem::Entity(entity.clone())],
            SelectClause::Text(text) => split_list(text).into_iter().map(SelectItem::Field).collect(),
            SelectClause::List(items) => items.clone(),
        };

        for item in items {
            let expr = match item {
                SelectItem::Field(term) => {
                    let term = term.trim();
                    if term.is_empty() || term == "*" {
                        continue;
                    }
                    let term = aliases.substitute(term).unwrap_or_else(|| term.to_string());
                    Expr::reference(&term)
                }
                SelectItem::Entity(entity) => {
                    if entity.is_blank() {
                        continue;
                    }
                    let entity = self.resolve_entity(&entity);
                    let alias = query
                        .aliases()
                        .into_iter()
                        .find(|(_, bound)| *bound == entity)
                        .map(|(alias, _)| alias.to_string())
                        .unwrap_or_else(|| derive_alias(&entity, self.options.alias_style));
                    Expr::reference(&alias)
                }
            };
            query.add_select(expr);
        }

        query.dedup_select();
    }

    fn apply_distinct(&self, distinct: &DistinctClause, query: &mut CompiledQuery) {
        match distinct {
            // `false` is a blank value
            DistinctClause::Flag(false) => {}
            other => {
                query.set_distinct(other.is_distinct());
            }
        }
    }

    // =========================================================================
    // JOIN
    // =========================================================================

    fn apply_join(&self, join: &JoinClause, query: &mut CompiledQuery) -> CriteriaResult<()> {
        let specs: &[JoinSpec] = match join {
            JoinClause::One(spec) => std::slice::from_ref(spec),
            JoinClause::Many(specs) => specs,
        };

        let mut aliases = AliasContext::from_query(query);
        for spec in specs {
            if spec.target.is_blank() {
                return Err(CriteriaError::missing_key(ClauseKind::Join, "join"));
            }
            let entity = self.resolve_entity(&spec.target);
            let alias = self.alias_for(spec.alias.as_deref(), &entity, &aliases);
            let condition_type = spec.condition_type.unwrap_or(ConditionType::With);

            // Register before synthesizing so placeholders can name this join
            aliases.register(&alias, &entity);

            let condition = match spec.condition.as_deref().map(str::trim) {
                Some(template) if !template.is_empty() => {
                    let substituted = aliases.substitute(template);
                    if substituted.is_none() {
                        debug!(condition = template, alias = %alias, "unresolved join condition, joining without one");
                    }
                    substituted.map(|text| raw(&text))
                }
                _ => self.default_join_condition(&entity, &aliases),
            };

            query.add_join(Join {
                kind: spec.kind,
                entity,
                alias,
                condition_type,
                condition,
                index_by: spec
                    .index_by
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            });
        }
        Ok(())
    }

    /// `<join alias>.<field> = <preceding alias>.<field>` where field is the
    /// target's first primary key field, or the configured guess.
    fn default_join_condition(&self, entity: &str, aliases: &AliasContext) -> Option<Expr> {
        let joined = aliases.get(aliases.len())?;
        let preceding = aliases.get(aliases.len().checked_sub(1)?)?;
        let field = self
            .schema
            .get(entity)
            .and_then(|meta| meta.first_primary_key())
            .unwrap_or(self.options.guess_join_field.as_str());
        Some(table_col(&joined.alias, field).eq(table_col(&preceding.alias, field)))
    }

    // =========================================================================
    // WHERE / HAVING
    // =========================================================================

    fn apply_filter(&self, target: FilterTarget, filter: &FilterClause, query: &mut CompiledQuery) {
        let condition = match filter {
            FilterClause::Predicate(tree) => {
                if !PredicateTransformer::new(&self.schema).apply(tree, query, target) {
                    debug!("every predicate was dropped");
                }
                return;
            }

            FilterClause::Map(pairs) => {
                let aliases = AliasContext::from_query(query);
                let mut group: Option<Expr> = None;
                for (key, value) in pairs {
                    if key.trim().is_empty() {
                        continue;
                    }
                    let Some(path) = aliases.resolve_field(key, &self.schema) else {
                        debug!(field = %key, "dropping filter pair with unresolved field");
                        continue;
                    };
                    let param = Expr::Param(query.bind(value.to_parameter()));
                    let expr = if value.is_list() {
                        path.to_expr().in_list(vec![param])
                    } else {
                        path.to_expr().eq(param)
                    };
                    group = Some(match group {
                        None => expr,
                        Some(existing) => combine(LogicalOp::Or, existing, expr),
                    });
                }
                match group {
                    Some(group) => group,
                    None => return,
                }
            }

            FilterClause::Raw(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                let aliases = AliasContext::from_query(query);
                raw(&aliases.substitute(text).unwrap_or_else(|| text.to_string()))
            }
        };

        match target {
            FilterTarget::Where => query.and_where(condition),
            FilterTarget::Having => query.and_having(condition),
        };
    }

    // =========================================================================
    // GROUP / ORDER
    // =========================================================================

    fn apply_group(&self, group: &GroupClause, query: &mut CompiledQuery) {
        let fields = match group {
            GroupClause::Text(text) => split_list(text),
            GroupClause::List(fields) => fields.clone(),
        };

        let aliases = AliasContext::from_query(query);
        for field in fields {
            if field.trim().is_empty() {
                continue;
            }
            match aliases.resolve_field(&field, &self.schema) {
                Some(path) => {
                    query.add_group_by(path.to_expr());
                }
                None => debug!(field = %field, "dropping unresolved group field"),
            }
        }
    }

    fn apply_order(&self, order: &OrderClause, query: &mut CompiledQuery) {
        let specs: Vec<OrderSpec> = match order {
            OrderClause::Text(text) => split_list(text)
                .iter()
                .filter_map(|term| parse_order_term(term))
                .collect(),
            OrderClause::List(terms) => terms.iter().filter_map(|t| parse_order_term(t)).collect(),
            OrderClause::Map(map) => map
                .iter()
                .filter(|(field, _)| !field.trim().is_empty())
                .filter_map(|(field, dir)| parse_order_term(&format!("{} {}", field, dir)))
                .collect(),
            OrderClause::Specs(specs) => specs.clone(),
        };

        let aliases = AliasContext::from_query(query);
        for spec in specs {
            let Some(path) = aliases.resolve_strict(&spec.field, &self.schema) else {
                debug!(field = %spec.field, "dropping unresolved order field");
                continue;
            };
            query.add_order_by(OrderByExpr {
                expr: path.to_expr(),
                dir: spec.direction,
                nulls: spec.nulls,
            });
        }
    }
}

// =============================================================================
// Term parsing
// =============================================================================

/// Split a comma-separated list at top level. Commas inside parentheses or
/// single quotes do not split. Blank items are dropped.
pub fn split_list(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;

    for c in text.chars() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                items.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    items.push(current);

    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// `Entity [alias] [INDEX BY field]`
fn parse_source_term(term: &str) -> Option<SourceSpec> {
    let parts: Vec<&str> = term.split_whitespace().collect();
    let mut spec = SourceSpec::new(*parts.first()?);
    if let Some(alias) = parts.get(1) {
        spec.alias = Some(alias.to_string());
    }
    if let [_, _, index, by, field, ..] = parts.as_slice() {
        if index.eq_ignore_ascii_case("INDEX") && by.eq_ignore_ascii_case("BY") {
            spec.index_by = Some(field.to_string());
        }
    }
    Some(spec)
}

/// `field [ASC|DESC] [NULLS FIRST|LAST]`
pub fn parse_order_term(term: &str) -> Option<OrderSpec> {
    let caps = ORDER_TERM.captures(term)?;
    let field = caps.get(1)?.as_str().trim();
    if field.is_empty() {
        return None;
    }
    let direction = match caps.get(2) {
        Some(d) if d.as_str().eq_ignore_ascii_case("DESC") => SortDir::Desc,
        _ => SortDir::Asc,
    };
    let nulls = caps.get(3).map(|n| {
        if n.as_str().eq_ignore_ascii_case("FIRST") {
            NullsOrder::First
        } else {
            NullsOrder::Last
        }
    });
    Some(OrderSpec {
        field: field.to_string(),
        direction,
        nulls,
    })
}
