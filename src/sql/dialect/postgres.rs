//! PostgreSQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Native boolean type (true/false)
//! - `$n` parameters (1-based)
//! - NULLS FIRST/LAST

use super::helpers;
use super::SqlDialect;
use crate::sql::params::ParamKey;

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn format_parameter(&self, key: &ParamKey) -> String {
        match key {
            ParamKey::Positional(n) => format!("${}", n + 1),
            ParamKey::Named(name) => format!(":{}", name),
        }
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)
}
