//! Predicate trees and their translation into query expressions.
//!
//! A [`PredicateGroup`] is an ordered list of `(Combinator, PredicateNode)`
//! entries. Translation folds the entries left to right: the first surviving
//! entry starts the result and each later one joins it with its own
//! combinator. Nodes whose field reference does not resolve are dropped
//! without failing the group.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use super::alias::AliasContext;
use crate::schema::Schema;
use crate::sql::{
    combine, raw, BinaryOperator, CompiledQuery, Expr, ExprExt, LogicalOp, ParamKey, Parameters,
};

/// `?N` placeholder in expression text.
static POSITIONAL_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?(\d+)").unwrap());

// =============================================================================
// Predicate AST
// =============================================================================

/// How an entry joins the entries before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl From<Combinator> for LogicalOp {
    fn from(c: Combinator) -> Self {
        match c {
            Combinator::And => LogicalOp::And,
            Combinator::Or => LogicalOp::Or,
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Field reference, resolved against the alias context
    Identifier(String),
    /// Bound as a positional parameter
    Value(Value),
}

impl Operand {
    pub fn identifier(name: &str) -> Self {
        Operand::Identifier(name.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Operand::Value(value.into())
    }
}

/// A predicate leaf or nested group.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode {
    Comparison {
        left: Operand,
        op: BinaryOperator,
        right: Operand,
    },
    Between {
        field: String,
        min: Value,
        max: Value,
        negated: bool,
    },
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    Like {
        field: String,
        pattern: String,
        negated: bool,
    },
    /// Text with alias placeholders, used after substitution
    Literal(String),
    /// Text used verbatim; its parameters join the query's
    Expression {
        text: String,
        parameters: Vec<(ParamKey, Value)>,
    },
    Group(PredicateGroup),
}

impl PredicateNode {
    /// `field op value`
    pub fn compare(field: &str, op: BinaryOperator, value: impl Into<Value>) -> Self {
        PredicateNode::Comparison {
            left: Operand::identifier(field),
            op,
            right: Operand::value(value),
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, BinaryOperator::Eq, value)
    }

    pub fn between(field: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        PredicateNode::Between {
            field: field.into(),
            min: min.into(),
            max: max.into(),
            negated: false,
        }
    }

    pub fn in_list(field: &str, values: Vec<Value>) -> Self {
        PredicateNode::In {
            field: field.into(),
            values,
            negated: false,
        }
    }

    pub fn is_null(field: &str) -> Self {
        PredicateNode::IsNull {
            field: field.into(),
            negated: false,
        }
    }

    pub fn like(field: &str, pattern: &str) -> Self {
        PredicateNode::Like {
            field: field.into(),
            pattern: pattern.into(),
            negated: false,
        }
    }

    pub fn literal(text: &str) -> Self {
        PredicateNode::Literal(text.into())
    }

    pub fn expression(text: &str, parameters: Vec<(ParamKey, Value)>) -> Self {
        PredicateNode::Expression {
            text: text.into(),
            parameters,
        }
    }

    /// Flip a Between, In, IsNull or Like node to its negated form.
    /// Other nodes are returned unchanged.
    pub fn negate(self) -> Self {
        match self {
            PredicateNode::Between {
                field,
                min,
                max,
                negated,
            } => PredicateNode::Between {
                field,
                min,
                max,
                negated: !negated,
            },
            PredicateNode::In {
                field,
                values,
                negated,
            } => PredicateNode::In {
                field,
                values,
                negated: !negated,
            },
            PredicateNode::IsNull { field, negated } => PredicateNode::IsNull {
                field,
                negated: !negated,
            },
            PredicateNode::Like {
                field,
                pattern,
                negated,
            } => PredicateNode::Like {
                field,
                pattern,
                negated: !negated,
            },
            other => other,
        }
    }
}

/// Ordered predicate entries, each with its combinator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateGroup {
    pub entries: Vec<(Combinator, PredicateNode)>,
}

impl PredicateGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, node: PredicateNode) -> Self {
        self.entries.push((Combinator::And, node));
        self
    }

    pub fn or(mut self, node: PredicateNode) -> Self {
        self.entries.push((Combinator::Or, node));
        self
    }

    /// Nest `group` as one entry.
    pub fn and_group(self, group: PredicateGroup) -> Self {
        self.and(PredicateNode::Group(group))
    }

    pub fn or_group(self, group: PredicateGroup) -> Self {
        self.or(PredicateNode::Group(group))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Transformation
// =============================================================================

/// Translate a predicate group into one expression.
///
/// Returns `None` when every entry was dropped. Values are bound into
/// `params`.
pub fn transform(
    group: &PredicateGroup,
    aliases: &AliasContext,
    schema: &Schema,
    params: &mut Parameters,
) -> Option<Expr> {
    let mut acc: Option<Expr> = None;

    for (combinator, node) in &group.entries {
        let Some(expr) = transform_node(node, aliases, schema, params) else {
            continue;
        };
        acc = Some(match acc {
            None => expr,
            Some(existing) => combine((*combinator).into(), existing, expr),
        });
    }

    acc
}

fn transform_node(
    node: &PredicateNode,
    aliases: &AliasContext,
    schema: &Schema,
    params: &mut Parameters,
) -> Option<Expr> {
    let field = |reference: &str| {
        let resolved = aliases.resolve_field(reference, schema);
        if resolved.is_none() {
            debug!(field = reference, "dropping predicate with unresolved field");
        }
        resolved.map(|path| path.to_expr())
    };

    match node {
        PredicateNode::Comparison { left, op, right } => {
            // The identifier side is on the left of the rendered comparison
            let (ident, value, op) = match (left, right) {
                (Operand::Identifier(_), _) => (left, right, *op),
                (_, Operand::Identifier(_)) => (right, left, op.mirror()),
                _ => {
                    debug!("dropping comparison without identifier");
                    return None;
                }
            };
            let Operand::Identifier(name) = ident else {
                return None;
            };
            let lhs = field(name)?;
            let rhs = match value {
                Operand::Identifier(other) => field(other)?,
                Operand::Value(v) => Expr::Param(params.bind(v.clone())),
            };
            Some(lhs.compare(op, rhs))
        }

        PredicateNode::Between {
            field: name,
            min,
            max,
            negated,
        } => {
            let target = field(name)?;
            Some(Expr::Between {
                expr: Box::new(target),
                low: Box::new(Expr::Param(params.bind(min.clone()))),
                high: Box::new(Expr::Param(params.bind(max.clone()))),
                negated: *negated,
            })
        }

        PredicateNode::In {
            field: name,
            values,
            negated,
        } => {
            let target = field(name)?;
            let values = if values.is_empty() {
                Vec::new()
            } else {
                vec![Expr::Param(params.bind(Value::Array(values.clone())))]
            };
            Some(Expr::In {
                expr: Box::new(target),
                values,
                negated: *negated,
            })
        }

        PredicateNode::IsNull {
            field: name,
            negated,
        } => Some(Expr::IsNull {
            expr: Box::new(field(name)?),
            negated: *negated,
        }),

        PredicateNode::Like {
            field: name,
            pattern,
            negated,
        } => {
            let target = field(name)?;
            Some(Expr::Like {
                expr: Box::new(target),
                pattern: Box::new(Expr::Param(params.bind(Value::String(pattern.clone())))),
                negated: *negated,
            })
        }

        PredicateNode::Literal(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            let substituted = aliases.substitute(text).unwrap_or_else(|| text.to_string());
            Some(raw(&substituted))
        }

        PredicateNode::Expression { text, parameters } => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            let (text, parameters) = rebase_positional(text, parameters, params.next_position());
            params.merge(parameters);
            Some(raw(&text))
        }

        PredicateNode::Group(inner) => transform(inner, aliases, schema, params),
    }
}

/// Shift an expression's positional keys by `offset` and rewrite its `?N`
/// placeholders to match. Named keys and placeholders for keys the
/// expression does not bind are left alone.
fn rebase_positional(
    text: &str,
    parameters: &[(ParamKey, Value)],
    offset: usize,
) -> (String, Vec<(ParamKey, Value)>) {
    if offset == 0 {
        return (text.to_string(), parameters.to_vec());
    }

    let own: HashSet<usize> = parameters
        .iter()
        .filter_map(|(key, _)| match key {
            ParamKey::Positional(n) => Some(*n),
            ParamKey::Named(_) => None,
        })
        .collect();

    let text = POSITIONAL_PLACEHOLDER
        .replace_all(text, |caps: &Captures| match caps[1].parse::<usize>() {
            Ok(n) if own.contains(&n) => format!("?{}", n + offset),
            _ => caps[0].to_string(),
        })
        .into_owned();

    let parameters = parameters
        .iter()
        .map(|(key, value)| match key {
            ParamKey::Positional(n) => (ParamKey::Positional(n + offset), value.clone()),
            ParamKey::Named(_) => (key.clone(), value.clone()),
        })
        .collect();

    (text, parameters)
}

/// Which accumulator a predicate tree is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    Where,
    Having,
}

/// Applies predicate trees to a query.
#[derive(Debug, Clone, Copy)]
pub struct PredicateTransformer<'a> {
    schema: &'a Schema,
}

impl<'a> PredicateTransformer<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Translate `tree` against the query's aliases and AND it into the
    /// target clause. Returns whether anything was added.
    pub fn apply(&self, tree: &PredicateGroup, query: &mut CompiledQuery, target: FilterTarget) -> bool {
        let aliases = AliasContext::from_query(query);
        let Some(expr) = transform(tree, &aliases, self.schema, &mut query.parameters) else {
            return false;
        };
        match target {
            FilterTarget::Where => query.and_where(expr),
            FilterTarget::Having => query.and_having(expr),
        };
        true
    }
}
