//! Sync errors
//!
//! Only fatal conditions surface as `SyncError`. Source outages, delivery
//! failures and per-record errors are reported in the cycle outcome.

use std::io;

use thiserror::Error;

use crate::source::SourceError;
use crate::watermark::WatermarkError;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Watermark persistence failed
    #[error("watermark persistence failed: {0}")]
    Watermark(#[from] WatermarkError),

    /// The skip journal could not be written before commit
    #[error("skip journal {context}: {source}")]
    Journal {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Internal state machine violation
    #[error("illegal coordinator transition {from} -> {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    /// The coordinator halted after an earlier fatal error
    #[error("coordinator is halted")]
    Halted,

    #[error("invalid sync configuration: {0}")]
    Config(String),

    /// Source failure outside a cycle (preview, health check)
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl SyncError {
    pub(crate) fn journal(context: impl Into<String>, source: io::Error) -> Self {
        SyncError::Journal {
            context: context.into(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Watermark(_) => "SYNC_PERSISTENCE",
            SyncError::Journal { .. } => "SYNC_JOURNAL",
            SyncError::IllegalTransition { .. } => "SYNC_ILLEGAL_TRANSITION",
            SyncError::Halted => "SYNC_HALTED",
            SyncError::Config(_) => "SYNC_CONFIG",
            SyncError::Source(e) => e.code(),
        }
    }

    /// True when the loop must stop
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Config(_) | SyncError::Source(_))
    }
}
