//! Formula errors
//!
//! Every failure of the formula language is a `FormulaError`. In the sync
//! taxonomy these are evaluation errors: per-record, handled by the record
//! failure policy.

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = Result<T, FormulaError>;

/// Formula parse and evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("type mismatch: {operation} cannot take {found}")]
    TypeMismatch { operation: String, found: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("numeric overflow in {0}")]
    Overflow(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("function {name} expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("formula limit exceeded: {0}")]
    LimitExceeded(String),
}

impl FormulaError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            FormulaError::Syntax { .. } => "FORMULA_SYNTAX",
            FormulaError::UnknownField(_) => "FORMULA_UNKNOWN_FIELD",
            FormulaError::TypeMismatch { .. } => "FORMULA_TYPE_MISMATCH",
            FormulaError::DivisionByZero => "FORMULA_DIVISION_BY_ZERO",
            FormulaError::Overflow(_) => "FORMULA_OVERFLOW",
            FormulaError::UnknownFunction(_) => "FORMULA_UNKNOWN_FUNCTION",
            FormulaError::Arity { .. } => "FORMULA_ARITY",
            FormulaError::LimitExceeded(_) => "FORMULA_LIMIT_EXCEEDED",
        }
    }

    /// Returns true if the error comes from the formula text itself
    /// rather than from the data it was evaluated against.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            FormulaError::Syntax { .. }
                | FormulaError::UnknownFunction(_)
                | FormulaError::Arity { .. }
                | FormulaError::LimitExceeded(_)
        )
    }

    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        FormulaError::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(operation: impl Into<String>, found: impl Into<String>) -> Self {
        FormulaError::TypeMismatch {
            operation: operation.into(),
            found: found.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_field_name() {
        let err = FormulaError::UnknownField("hours".into());
        assert_eq!(err.to_string(), "unknown field: hours");
        assert_eq!(err.code(), "FORMULA_UNKNOWN_FIELD");
    }

    #[test]
    fn test_static_classification() {
        assert!(FormulaError::syntax(0, "x").is_static());
        assert!(!FormulaError::DivisionByZero.is_static());
        assert!(!FormulaError::UnknownField("a".into()).is_static());
    }
}
