//! Transform errors

use thiserror::Error;

use crate::formula::FormulaError;
use crate::template::TemplateError;

/// Result type for transform operations
pub type TransformResult<T> = Result<T, TransformError>;

/// Why a single derived field could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// `scale` was set on a field that did not produce a number
    #[error("scale applies to numbers, got {found}")]
    Scale { found: String },
}

impl EvaluationError {
    pub fn code(&self) -> &'static str {
        match self {
            EvaluationError::Formula(e) => e.code(),
            EvaluationError::Template(e) => e.code(),
            EvaluationError::Scale { .. } => "TRANSFORM_SCALE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// A required derived field failed to evaluate
    #[error("field '{field}': {source}")]
    Field {
        field: String,
        #[source]
        source: EvaluationError,
    },

    /// The record carries a field with the same name as a derived field
    #[error("derived field '{field}' shadows a source field")]
    Shadowed { field: String },

    /// A field's formula or template did not compile
    #[error("field '{field}' does not compile: {source}")]
    Compile {
        field: String,
        #[source]
        source: EvaluationError,
    },

    /// A field declaration is malformed
    #[error("field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("duplicate derived field '{0}'")]
    DuplicateField(String),

    /// A field reads a derived field declared after it
    #[error("field '{field}' reads '{reference}' before it is derived")]
    ForwardReference { field: String, reference: String },

    /// The posting could not be encoded canonically
    #[error("posting encoding failed: {0}")]
    Encoding(String),

    /// The source does not provide what the field set needs
    #[error("schema mismatch: missing {missing:?}, shadowed {shadowed:?}")]
    Schema {
        missing: Vec<String>,
        shadowed: Vec<String>,
    },
}

impl TransformError {
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::Field { .. } => "TRANSFORM_FIELD",
            TransformError::Shadowed { .. } => "TRANSFORM_SHADOWED",
            TransformError::Compile { .. } => "TRANSFORM_COMPILE",
            TransformError::InvalidField { .. } => "TRANSFORM_INVALID_FIELD",
            TransformError::DuplicateField(_) => "TRANSFORM_DUPLICATE_FIELD",
            TransformError::ForwardReference { .. } => "TRANSFORM_FORWARD_REFERENCE",
            TransformError::Encoding(_) => "TRANSFORM_ENCODING",
            TransformError::Schema { .. } => "TRANSFORM_SCHEMA",
        }
    }

    /// True for errors about a single record rather than the field set
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            TransformError::Field { .. }
                | TransformError::Shadowed { .. }
                | TransformError::Encoding(_)
        )
    }
}
