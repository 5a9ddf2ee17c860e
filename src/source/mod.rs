//! Record source
//!
//! Reads records strictly above a position, ascending, in bounded batches.
//! The store is never written to.

mod errors;
mod fetcher;
mod memory;
mod record;
mod sql;

pub use errors::{RowDefect, SourceError, SourceResult};
pub use fetcher::{IntegrityPolicy, RecordFetcher};
pub use memory::MemorySource;
pub use record::{Batch, SourceRecord};
pub use sql::{assemble_record, ColumnKind, ColumnSpec, PositionKind, SqlSource, SqlSourceConfig};

use async_trait::async_trait;

use crate::position::Position;

/// A single row as returned by a source
pub type Row = Result<SourceRecord, RowDefect>;

/// Read capability over the source store
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Rows with position strictly greater than `after`, ascending, at most
    /// `limit` of them
    async fn fetch_rows(&self, after: Position, limit: usize) -> SourceResult<Vec<Row>>;

    /// Verify the store can be queried
    async fn health_check(&self) -> SourceResult<()>;

    /// Total number of rows the base query yields
    async fn count(&self) -> SourceResult<u64>;

    /// Field names the source provides, `None` when unknown
    async fn describe_fields(&self) -> SourceResult<Option<Vec<String>>>;
}
