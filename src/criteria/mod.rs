//! Criteria: a loose, clause-keyed query description and its compiler.
//!
//! - [`clause`] - typed clause values and the [`Criteria`] builder
//! - [`parse`] - reading criteria from JSON
//! - [`alias`] - alias derivation, positional substitution, field resolution
//! - [`predicate`] - predicate trees and their translation to expressions
//! - [`compiler`] - applying criteria to a [`CompiledQuery`](crate::sql::CompiledQuery)

pub mod alias;
pub mod clause;
pub mod compiler;
pub mod error;
pub mod parse;
pub mod predicate;

pub use alias::{derive_alias, AliasBinding, AliasContext, AliasStyle, FieldPath};
pub use clause::{
    ClauseKind, Criteria, DistinctClause, EntityRef, FilterClause, FilterValue, GroupClause,
    JoinClause, JoinSpec, OrderClause, OrderSpec, SelectClause, SelectItem, SourceClause,
    SourceSpec,
};
pub use compiler::{parse_order_term, split_list, CompilerOptions, CriteriaCompiler};
pub use error::{CriteriaError, CriteriaResult};
pub use predicate::{
    transform, Combinator, FilterTarget, Operand, PredicateGroup, PredicateNode,
    PredicateTransformer,
};
