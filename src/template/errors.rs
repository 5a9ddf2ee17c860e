//! Template errors

use thiserror::Error;

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Template parse and render failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// `${` without a closing `}`
    #[error("unterminated placeholder at byte {offset}")]
    Unterminated { offset: usize },

    /// Placeholder name is empty or not an identifier
    #[error("invalid placeholder name '{name}' at byte {offset}")]
    InvalidName { name: String, offset: usize },

    /// `$` not followed by `{` or `$`
    #[error("stray '$' at byte {offset}; write '$$' for a literal dollar sign")]
    StrayDollar { offset: usize },

    /// A mandatory placeholder has no value
    #[error("unresolved placeholder '{0}'")]
    Unresolved(String),

    /// A mandatory placeholder resolved to null
    #[error("placeholder '{0}' is null")]
    NullValue(String),
}

impl TemplateError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            TemplateError::Unterminated { .. } => "TEMPLATE_UNTERMINATED",
            TemplateError::InvalidName { .. } => "TEMPLATE_INVALID_NAME",
            TemplateError::StrayDollar { .. } => "TEMPLATE_STRAY_DOLLAR",
            TemplateError::Unresolved(_) => "TEMPLATE_UNRESOLVED",
            TemplateError::NullValue(_) => "TEMPLATE_NULL_VALUE",
        }
    }

    /// True for errors raised while parsing rather than rendering
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            TemplateError::Unterminated { .. }
                | TemplateError::InvalidName { .. }
                | TemplateError::StrayDollar { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_classification() {
        let err = TemplateError::Unresolved("client".into());
        assert_eq!(err.code(), "TEMPLATE_UNRESOLVED");
        assert!(!err.is_static());
        assert!(TemplateError::Unterminated { offset: 3 }.is_static());
        assert_eq!(err.to_string(), "unresolved placeholder 'client'");
    }
}
