//! Watermark errors
//!
//! Every watermark error is fatal: the connector cannot know what it has
//! delivered, so it must stop rather than guess.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::position::Position;

pub type WatermarkResult<T> = Result<T, WatermarkError>;

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("watermark file {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("unsupported watermark format version {0}")]
    UnsupportedVersion(u32),

    #[error("watermark regression: current {current}, attempted {attempted}")]
    Regression {
        current: Position,
        attempted: Position,
    },

    #[error("watermark store unavailable: {0}")]
    Unavailable(String),
}

impl WatermarkError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        WatermarkError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WatermarkError::Io { .. } => "WATERMARK_IO",
            WatermarkError::Corrupt { .. } => "WATERMARK_CORRUPT",
            WatermarkError::UnsupportedVersion(_) => "WATERMARK_UNSUPPORTED_VERSION",
            WatermarkError::Regression { .. } => "WATERMARK_REGRESSION",
            WatermarkError::Unavailable(_) => "WATERMARK_UNAVAILABLE",
        }
    }

    pub fn is_fatal(&self) -> bool {
        true
    }
}
