//! Query cache keys.
//!
//! A cacheable [`CompiledQuery`](crate::sql::CompiledQuery) is identified by
//! the hash of its rendered text, the dialect it was rendered for and its
//! parameter bindings. Two queries that render identically but bind
//! different values get different keys.
//!
//! # Key Format
//!
//! ```text
//! sha256(json({"dialect": "dql", "text": "SELECT ...", "parameters": {"?0": 1}}))
//! ```

mod hash;
pub use hash::compute_hash;

use serde::Serialize;
use tracing::warn;

use crate::sql::{Dialect, Parameters, SqlDialect};

/// Everything that identifies a rendered query.
#[derive(Debug, Serialize)]
pub struct QueryFingerprint<'a> {
    pub dialect: &'static str,
    pub text: &'a str,
    pub parameters: &'a Parameters,
}

/// Hash a rendered query into a cache key.
///
/// Returns `None` when the parameters cannot be serialized.
pub fn query_fingerprint(text: &str, dialect: Dialect, parameters: &Parameters) -> Option<String> {
    let fingerprint = QueryFingerprint {
        dialect: dialect.name(),
        text,
        parameters,
    };
    match compute_hash(&fingerprint) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(error = %e, "failed to hash query fingerprint");
            None
        }
    }
}
