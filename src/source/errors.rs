//! Source errors

use std::fmt;

use thiserror::Error;

use crate::position::Position;

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// A malformed source row.
///
/// The position is known when the position column itself decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDefect {
    pub position: Option<Position>,
    pub reason: String,
}

impl RowDefect {
    pub fn new(position: Option<Position>, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RowDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(p) => write!(f, "row at position {}: {}", p, self.reason),
            None => write!(f, "row without position: {}", self.reason),
        }
    }
}

/// Source failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The store could not be reached or the query failed
    #[error("source unavailable: {message}")]
    Unavailable { message: String },

    /// A malformed row under the abort integrity policy
    #[error("data integrity error: {0}")]
    DataIntegrity(RowDefect),

    /// The source broke the ordering or size contract
    #[error("source contract violated: {message}")]
    ContractViolation { message: String },

    /// The source is misconfigured
    #[error("invalid source configuration: {message}")]
    Configuration { message: String },
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::Unavailable { .. } => "SOURCE_UNAVAILABLE",
            SourceError::DataIntegrity(_) => "SOURCE_DATA_INTEGRITY",
            SourceError::ContractViolation { .. } => "SOURCE_CONTRACT_VIOLATION",
            SourceError::Configuration { .. } => "SOURCE_CONFIGURATION",
        }
    }

    /// True when the condition is expected to clear on its own
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Unavailable { .. })
    }
}
