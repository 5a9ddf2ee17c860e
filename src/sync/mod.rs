//! Incremental sync engine
//!
//! The coordinator owns the watermark cell and runs one cycle at a time:
//! fetch the batch above the watermark, transform and deliver each record
//! in order, then commit the batch high position. Failures are classified
//! into per-record (policy), per-cycle (backoff) and fatal (halt).
//!
//! An optional refresh pass resends already synced records on its own
//! cursor without moving the watermark.

mod backoff;
mod config;
mod coordinator;
mod errors;
mod journal;
mod refresh;
mod report;
mod state;

pub use backoff::Backoff;
pub use config::{
    BackoffConfig, RecordFailurePolicy, RefreshConfig, SyncConfig, MAX_BATCH_SIZE,
};
pub use coordinator::{Preview, SyncCoordinator};
pub use errors::{SyncError, SyncResult};
pub use journal::{FileSkipJournal, JournalEntry, MemorySkipJournal, SkipJournal, JOURNAL_FILE};
pub use refresh::{RefreshOutcome, RefreshReport, Refresher};
pub use report::{CycleOutcome, CycleReport, SkipStage, SkippedRecord};
pub use state::CoordinatorState;
