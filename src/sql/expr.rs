//! Expression AST - the building blocks of WHERE, HAVING, GROUP BY and
//! ORDER BY clauses.
//!
//! This module provides a strongly-typed AST for query expressions
//! with exhaustive pattern matching enforced by the compiler.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::dialect::Dialect;
use super::params::ParamKey;
use super::token::{Token, TokenStream};

/// `alias` or `alias.property`, nothing else.
static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*))?\s*$").unwrap()
});

// =============================================================================
// Expression AST
// =============================================================================

/// A query expression.
///
/// Every variant must be handled in `to_tokens()` - the compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Field or alias reference: optional_alias.property
    Column {
        table: Option<String>,
        column: String,
    },

    /// Literal values
    Literal(Literal),

    /// Bound parameter placeholder
    Param(ParamKey),

    /// Comparison: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// AND/OR list. Nested composites with more than one part are
    /// parenthesized when rendered.
    Composite { op: LogicalOp, parts: Vec<Expr> },

    /// IN: expr IN (values...)
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// BETWEEN: expr BETWEEN low AND high
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE / NOT LIKE
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },

    /// Wildcard: *
    Star,

    /// Raw text passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Raw text is not sanitized.
    /// It carries criteria the caller already expressed as raw text
    /// (where strings, literal predicates, join conditions).
    Raw(String),
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl BinaryOperator {
    /// The operator that keeps the meaning when both sides are swapped.
    pub fn mirror(self) -> Self {
        match self {
            BinaryOperator::Lt => BinaryOperator::Gt,
            BinaryOperator::Gt => BinaryOperator::Lt,
            BinaryOperator::Lte => BinaryOperator::Gte,
            BinaryOperator::Gte => BinaryOperator::Lte,
            other => other,
        }
    }
}

impl std::str::FromStr for BinaryOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(BinaryOperator::Eq),
            "!=" | "<>" => Ok(BinaryOperator::Ne),
            "<" => Ok(BinaryOperator::Lt),
            ">" => Ok(BinaryOperator::Gt),
            "<=" => Ok(BinaryOperator::Lte),
            ">=" => Ok(BinaryOperator::Gte),
            other => Err(format!("unknown comparison operator: {}", other)),
        }
    }
}

/// Logical combinators for [`Expr::Composite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

// =============================================================================
// Expression to Tokens
// =============================================================================

impl Expr {
    /// Convert this expression to a token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            Expr::Column { table, column } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }

            Expr::Literal(lit) => {
                ts.push(match lit {
                    Literal::Int(n) => Token::LitInt(*n),
                    Literal::Float(f) => Token::LitFloat(*f),
                    Literal::String(s) => Token::LitString(s.clone()),
                    Literal::Bool(b) => Token::LitBool(*b),
                    Literal::Null => Token::LitNull,
                });
            }

            Expr::Param(key) => {
                ts.push(Token::Param(key.clone()));
            }

            Expr::BinaryOp { left, op, right } => {
                ts.append(&left.to_tokens());
                ts.space();
                ts.push(binary_op_to_token(*op));
                ts.space();
                ts.append(&right.to_tokens());
            }

            Expr::Composite { op, parts } => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        ts.space();
                        ts.push(match op {
                            LogicalOp::And => Token::And,
                            LogicalOp::Or => Token::Or,
                        });
                        ts.space();
                    }
                    if part.needs_parens_in_composite() {
                        ts.lparen();
                        ts.append(&part.to_tokens());
                        ts.rparen();
                    } else {
                        ts.append(&part.to_tokens());
                    }
                }
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                // "x IN ()" is invalid; it can never match
                if values.is_empty() {
                    ts.push(if *negated { Token::True } else { Token::False });
                } else {
                    ts.append(&expr.to_tokens());
                    if *negated {
                        ts.space().push(Token::Not);
                    }
                    ts.space().push(Token::In).lparen();
                    for (i, val) in values.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&val.to_tokens());
                    }
                    ts.rparen();
                }
            }

            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                ts.append(&expr.to_tokens());
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space().push(Token::Between).space();
                ts.append(&low.to_tokens());
                ts.space().push(Token::And).space();
                ts.append(&high.to_tokens());
            }

            Expr::IsNull { expr, negated } => {
                ts.append(&expr.to_tokens());
                ts.space();
                ts.push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }

            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                ts.append(&expr.to_tokens());
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space().push(Token::Like).space();
                ts.append(&pattern.to_tokens());
            }

            Expr::Star => {
                ts.push(Token::Star);
            }

            Expr::Raw(text) => {
                ts.push(Token::Raw(text.clone()));
            }
        }

        ts
    }

    /// Render with the given dialect.
    pub fn to_text(&self, dialect: Dialect) -> String {
        self.to_tokens().serialize(dialect)
    }

    /// Parse a selection or grouping reference.
    ///
    /// `alias` and `alias.property` become [`Expr::Column`]; anything else
    /// (function calls, `AS` clauses, arithmetic) is kept as [`Expr::Raw`].
    pub fn reference(text: &str) -> Expr {
        match REFERENCE.captures(text) {
            Some(caps) => match caps.get(2) {
                Some(column) => table_col(&caps[1], column.as_str()),
                None => col(&caps[1]),
            },
            None => Expr::Raw(text.trim().to_string()),
        }
    }

    fn needs_parens_in_composite(&self) -> bool {
        match self {
            Expr::Composite { parts, .. } => parts.len() > 1,
            Expr::Raw(text) => {
                let upper = text.to_ascii_uppercase();
                upper.contains(" OR ") || upper.contains(" AND ")
            }
            _ => false,
        }
    }
}

fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
    }
}

// =============================================================================
// Expression Constructors
// =============================================================================

/// Create an unqualified reference.
pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        column: name.into(),
    }
}

/// Create a qualified reference (alias.property).
pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        column: column.into(),
    }
}

/// Create an integer literal.
pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

/// Create a string literal.
pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

/// Create a boolean literal.
pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

/// Create a NULL literal.
pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

/// Create a parameter placeholder.
pub fn param(key: impl Into<ParamKey>) -> Expr {
    Expr::Param(key.into())
}

/// Create a raw fragment.
pub fn raw(text: &str) -> Expr {
    Expr::Raw(text.into())
}

/// Convert a JSON value into a literal.
///
/// Arrays and objects have no literal form and are embedded as their JSON
/// text in a string literal.
pub fn lit_value(value: &Value) -> Expr {
    Expr::Literal(match value {
        Value::Null => Literal::Null,
        Value::Bool(b) => Literal::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Literal::Int(i),
            None => Literal::Float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Literal::String(s.clone()),
        other => Literal::String(other.to_string()),
    })
}

// =============================================================================
// Fluent API
// =============================================================================

/// Extension trait for fluent expression building.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn compare(self, op: BinaryOperator, other: impl Into<Expr>) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self.into_expr()),
            op,
            right: Box::new(other.into()),
        }
    }

    fn eq(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOperator::Eq, other)
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOperator::Ne, other)
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOperator::Lt, other)
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOperator::Gt, other)
    }

    fn lte(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOperator::Lte, other)
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        self.compare(BinaryOperator::Gte, other)
    }

    /// Combine with AND, flattening into an existing AND list.
    fn and(self, other: impl Into<Expr>) -> Expr {
        combine(LogicalOp::And, self.into_expr(), other.into())
    }

    /// Combine with OR, flattening into an existing OR list.
    fn or(self, other: impl Into<Expr>) -> Expr {
        combine(LogicalOp::Or, self.into_expr(), other.into())
    }

    fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
            negated: false,
        }
    }

    fn not_in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
            negated: true,
        }
    }

    fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        Expr::Between {
            expr: Box::new(self.into_expr()),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
            negated: false,
        }
    }

    fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: false,
        }
    }

    fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: true,
        }
    }

    fn like(self, pattern: impl Into<Expr>) -> Expr {
        Expr::Like {
            expr: Box::new(self.into_expr()),
            pattern: Box::new(pattern.into()),
            negated: false,
        }
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

/// Append `right` to `left` under `op`.
///
/// A left side that already is a composite of the same operator grows in
/// place; anything else is wrapped into a new two-part composite.
pub fn combine(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    match left {
        Expr::Composite {
            op: existing,
            mut parts,
        } if existing == op => {
            parts.push(right);
            Expr::Composite { op, parts }
        }
        other => Expr::Composite {
            op,
            parts: vec![other, right],
        },
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        lit_bool(b)
    }
}

impl From<ParamKey> for Expr {
    fn from(key: ParamKey) -> Self {
        Expr::Param(key)
    }
}
