//! Errors raised while compiling criteria.

use super::clause::ClauseKind;

/// Malformed or unsupported criteria.
///
/// Field references that fail to resolve are not errors; the compiler drops
/// them and logs at `debug`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CriteriaError {
    #[error("'{clause}' expects {expected}")]
    InvalidShape {
        clause: ClauseKind,
        expected: &'static str,
    },

    #[error("'{clause}' requires the key \"{key}\"")]
    MissingKey { clause: ClauseKind, key: &'static str },

    #[error("'{clause}' is not supported by the query object")]
    Unsupported { clause: ClauseKind },

    #[error("'{clause}' has an invalid value: {message}")]
    InvalidValue { clause: ClauseKind, message: String },
}

impl CriteriaError {
    pub fn invalid_shape(clause: ClauseKind, expected: &'static str) -> Self {
        Self::InvalidShape { clause, expected }
    }

    pub fn missing_key(clause: ClauseKind, key: &'static str) -> Self {
        Self::MissingKey { clause, key }
    }

    pub fn invalid_value(clause: ClauseKind, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            clause,
            message: message.into(),
        }
    }

    /// The clause the error was raised for.
    pub fn clause(&self) -> ClauseKind {
        match self {
            Self::InvalidShape { clause, .. }
            | Self::MissingKey { clause, .. }
            | Self::Unsupported { clause }
            | Self::InvalidValue { clause, .. } => *clause,
        }
    }
}

pub type CriteriaResult<T> = Result<T, CriteriaError>;
