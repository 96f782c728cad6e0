//! Query dialect definitions and formatting rules.
//!
//! A compiled query is rendered through a dialect. The default dialect is
//! [`Dql`], an entity query language in the style of object-relational
//! mappers: entity names are written as-is, joins may carry a `WITH`
//! condition, roots may be `INDEX BY` a field, and the result window is not
//! part of the text (the mapper applies it on the query object).
//!
//! The SQL dialects render the same query against tables named after the
//! short entity name:
//!
//! - Identifier quoting: `"` (PostgreSQL), `` ` `` (MySQL), none (DQL)
//! - Parameters: `?0` (DQL), `$1` (PostgreSQL), `?` (MySQL)
//! - Boolean literals: true/false vs 1/0
//! - `WITH` join conditions become `ON`, `INDEX BY` is dropped
//!
//! # Usage
//!
//! ```ignore
//! use sieve::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("User");  // "User"
//! ```

mod dql;
pub mod helpers;
mod mysql;
mod postgres;

pub use dql::Dql;
pub use mysql::MySql;
pub use postgres::Postgres;

use super::params::ParamKey;
use super::token::TokenStream;

/// Dialect trait - defines how query constructs are rendered.
///
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (alias, property).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Format an entity name in a FROM or JOIN position.
    ///
    /// SQL dialects address the table named after the short entity name.
    fn format_entity(&self, name: &str) -> String {
        self.quote_identifier(helpers::short_entity_name(name))
    }

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Format a NULL literal.
    fn format_null(&self) -> &'static str {
        "NULL"
    }

    /// Format a parameter placeholder.
    fn format_parameter(&self, key: &ParamKey) -> String {
        key.to_string()
    }

    /// Whether placeholders carry no key and are bound by position in the
    /// text.
    fn anonymous_parameters(&self) -> bool {
        false
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    // =========================================================================
    // Joins and roots
    // =========================================================================

    /// Whether `JOIN ... WITH cond` is understood.
    ///
    /// Dialects without it render the condition after `ON`.
    fn supports_join_with(&self) -> bool {
        false
    }

    /// Whether `INDEX BY field` may follow a root or join.
    fn supports_index_by(&self) -> bool {
        false
    }

    /// Whether a bare alias in the select list stands for the whole entity.
    ///
    /// Dialects without it render `alias.*`.
    fn selects_entity_alias(&self) -> bool {
        false
    }

    // =========================================================================
    // NULLS Ordering
    // =========================================================================

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    fn supports_nulls_ordering(&self) -> bool {
        true
    }
}

/// Supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Dql,
    Postgres,
    MySql,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Dql => &Dql,
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dql" => Ok(Dialect::Dql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            other => Err(format!("unknown dialect: {}", other)),
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn format_entity(&self, name: &str) -> String {
        self.dialect().format_entity(name)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_null(&self) -> &'static str {
        self.dialect().format_null()
    }

    fn format_parameter(&self, key: &ParamKey) -> String {
        self.dialect().format_parameter(key)
    }

    fn anonymous_parameters(&self) -> bool {
        self.dialect().anonymous_parameters()
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn supports_join_with(&self) -> bool {
        self.dialect().supports_join_with()
    }

    fn supports_index_by(&self) -> bool {
        self.dialect().supports_index_by()
    }

    fn selects_entity_alias(&self) -> bool {
        self.dialect().selects_entity_alias()
    }

    fn supports_nulls_ordering(&self) -> bool {
        self.dialect().supports_nulls_ordering()
    }
}
