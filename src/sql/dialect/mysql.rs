//! MySQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), rendered as 1/0
//! - Anonymous `?` parameters, bound in text order
//!   (see [`CompiledQuery::bind_values`](crate::sql::CompiledQuery::bind_values))
//! - Raw text is emitted verbatim, so placeholders written in it keep
//!   their `?N` / `:name` form
//! - No NULLS FIRST/LAST

use super::helpers;
use super::SqlDialect;
use crate::sql::params::ParamKey;

/// MySQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn format_parameter(&self, _key: &ParamKey) -> String {
        "?".into()
    }

    fn anonymous_parameters(&self) -> bool {
        true
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }
}
