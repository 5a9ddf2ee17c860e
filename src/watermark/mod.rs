//! Watermark persistence
//!
//! The watermark is the highest position whose records have all been
//! delivered or explicitly skipped. It never moves backwards and is never
//! re-derived from partial state.

mod cell;
mod errors;
mod file;
mod memory;

pub use cell::WatermarkCell;
pub use errors::{WatermarkError, WatermarkResult};
pub use file::{watermark_path, FileWatermarkStore, WatermarkDocument, FORMAT_VERSION};
pub use memory::MemoryWatermarkStore;

use crate::position::Position;

/// Durable storage for a single watermark position
pub trait WatermarkStore: Send + Sync {
    /// Last committed position, or the configured initial position
    fn load(&self) -> WatermarkResult<Position>;

    /// Durably replace the stored position
    fn commit(&self, position: Position) -> WatermarkResult<()>;
}
