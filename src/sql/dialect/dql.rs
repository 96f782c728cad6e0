//! Entity query language dialect.
//!
//! DQL features:
//! - Bare identifiers and fully-qualified entity names
//! - `JOIN ... WITH condition` and `INDEX BY field`
//! - Positional (`?0`) and named (`:name`) parameters
//! - Result window applied on the query object, never rendered

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// Entity query language dialect.
#[derive(Debug, Clone, Copy)]
pub struct Dql;

impl SqlDialect for Dql {
    fn name(&self) -> &'static str {
        "dql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        ident.to_string()
    }

    fn format_entity(&self, name: &str) -> String {
        name.trim().to_string()
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn emit_limit_offset(&self, _limit: Option<u64>, _offset: Option<u64>) -> TokenStream {
        TokenStream::new()
    }

    fn supports_join_with(&self) -> bool {
        true
    }

    fn supports_index_by(&self) -> bool {
        true
    }

    fn selects_entity_alias(&self) -> bool {
        true
    }
}
