//! Shared helper functions for dialect implementations.

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Last segment of a namespace-qualified entity name.
///
/// Accepts `\`, `::` and `.` as namespace separators.
pub fn short_entity_name(name: &str) -> &str {
    let name = name.trim();
    let cut = name
        .rfind('\\')
        .map(|i| i + 1)
        .max(name.rfind("::").map(|i| i + 2))
        .max(name.rfind('.').map(|i| i + 1))
        .unwrap_or(0);
    &name[cut..]
}

/// Namespace part of a qualified entity name, without the trailing
/// separator. `None` for unqualified names.
pub fn entity_namespace(name: &str) -> Option<&str> {
    let name = name.trim();
    let short = short_entity_name(name);
    let prefix = &name[..name.len() - short.len()];
    let namespace = prefix
        .strip_suffix('\\')
        .or_else(|| prefix.strip_suffix("::"))
        .or_else(|| prefix.strip_suffix('.'))?;
    (!namespace.is_empty()).then_some(namespace)
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: DQL, Postgres
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: MySQL
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL).
/// Used by: Postgres, MySQL
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}
