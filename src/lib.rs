//! # Sieve
//!
//! Compiles loosely-typed criteria descriptions into entity queries, with a
//! CRUD service layer on top.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Criteria (JSON or builder API)               │
//! │  (source, select, join, where, having, group, order)    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [criteria::parse]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Typed clauses (Criteria)                   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [criteria::compiler + schema]
//! ┌─────────────────────────────────────────────────────────┐
//! │     CompiledQuery (roots, joins, trees, parameters)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!              ┌───────────┴────────────┐
//!              ▼ [sql::dialect]         ▼ [service]
//! ┌────────────────────────┐  ┌──────────────────────────────┐
//! │ DQL / Postgres / MySQL │  │ Repository + lifecycle events │
//! └────────────────────────┘  └──────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod criteria;
pub mod schema;
pub mod service;
pub mod sql;

// Re-export SQL submodules at crate level
pub use sql::dialect;
pub use sql::expr;
pub use sql::query;
pub use sql::token;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{CompilerSettings, Settings};
    pub use crate::criteria::{
        AliasStyle, ClauseKind, CompilerOptions, Criteria, CriteriaCompiler, CriteriaError,
        CriteriaResult, DistinctClause, EntityRef, FilterClause, FilterValue, GroupClause,
        JoinClause, JoinSpec, OrderClause, OrderSpec, PredicateGroup, PredicateNode,
        SelectClause, SelectItem, SourceClause, SourceSpec,
    };
    pub use crate::dialect::{Dialect, SqlDialect};
    pub use crate::expr::{
        // Constructors
        col,
        lit_bool,
        lit_int,
        lit_null,
        lit_str,
        param,
        raw,
        table_col,
        // Types
        BinaryOperator,
        Expr,
        ExprExt,
        Literal,
        LogicalOp,
    };
    pub use crate::query::{
        CompiledQuery, ConditionType, FromClause, Join, JoinKind, NullsOrder, OrderByExpr,
        SortDir,
    };
    pub use crate::schema::{EntityMeta, Schema};
    pub use crate::service::{
        CrudService, Entity, LifecycleEvent, LifecycleListener, Paging, ReadTarget, Record,
        Repository, ServiceError, ServiceResult,
    };
    pub use crate::sql::{ParamKey, Parameters};
}
