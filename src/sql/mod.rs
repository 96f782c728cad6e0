//! Query object layer.
//!
//! This module provides a type-safe query object that criteria compile into
//! and that renders to entity query language or SQL. It includes:
//!
//! - [`query`] - the accumulated [`CompiledQuery`]
//! - [`expr`] - Expression AST and builder DSL
//! - [`params`] - Positional and named parameter bindings
//! - [`token`] - Token types for query rendering
//! - [`dialect`] - Dialect implementations

pub mod dialect;
pub mod expr;
pub mod params;
pub mod query;
pub mod token;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    col, combine, lit_bool, lit_int, lit_null, lit_str, lit_value, param, raw, table_col,
    BinaryOperator, Expr, ExprExt, Literal, LogicalOp,
};
pub use params::{ParamKey, Parameters};
pub use query::{
    CompiledQuery, ConditionType, FromClause, Join, JoinKind, LimitOffset, NullsOrder,
    OrderByExpr, SortDir,
};
pub use token::{Token, TokenStream};
