//! Observable events for chronosync
//!
//! Every line the sync engine logs is named by one of these events.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Connector startup begins
    BootStart,
    /// Connector ready, loop about to start
    BootComplete,
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Field set compiled
    FieldsCompiled,
    /// Shutdown requested
    ShutdownStart,
    /// Loop stopped cleanly
    ShutdownComplete,

    // Cycle
    /// Source returned no records above the watermark
    NoNewRecords,
    /// Source returned a batch
    BatchFetched,
    /// Batch was capped; another cycle follows immediately
    BacklogDrain,
    /// Cycle aborted; backoff scheduled
    BackoffScheduled,
    /// Cycle abandoned because shutdown was requested
    CycleInterrupted,

    // Records
    /// A record reached the target
    RecordDelivered,
    /// A record was skipped under the skip policy
    RecordSkipped,
    /// A malformed source row was skipped
    RowDefect,
    /// An optional derived field could not be produced
    FieldOmitted,

    // Watermark
    /// Watermark loaded at startup
    WatermarkLoaded,
    /// Watermark durably advanced
    WatermarkCommitted,
    /// Watermark persistence failed (FATAL)
    WatermarkFailed,

    // Refresh
    /// Refresh slice resent and cursor advanced
    RefreshComplete,
    /// Refresh cursor passed the watermark and restarted
    RefreshWrapped,
    /// Refresh pass abandoned; cursor unchanged
    RefreshFailed,

    // Health
    /// Source health check passed
    SourceHealthy,
    /// Source health check failed
    SourceUnhealthy,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "CHRONOSYNC_STARTUP_BEGIN",
            Event::BootComplete => "CHRONOSYNC_STARTUP_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::FieldsCompiled => "FIELDS_COMPILED",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            Event::NoNewRecords => "NO_NEW_RECORDS",
            Event::BatchFetched => "BATCH_FETCHED",
            Event::BacklogDrain => "BACKLOG_DRAIN",
            Event::BackoffScheduled => "BACKOFF_SCHEDULED",
            Event::CycleInterrupted => "CYCLE_INTERRUPTED",

            Event::RecordDelivered => "RECORD_DELIVERED",
            Event::RecordSkipped => "RECORD_SKIPPED",
            Event::RowDefect => "ROW_DEFECT",
            Event::FieldOmitted => "FIELD_OMITTED",

            Event::WatermarkLoaded => "WATERMARK_LOADED",
            Event::WatermarkCommitted => "WATERMARK_COMMITTED",
            Event::WatermarkFailed => "WATERMARK_FAILED",

            Event::RefreshComplete => "REFRESH_COMPLETE",
            Event::RefreshWrapped => "REFRESH_WRAPPED",
            Event::RefreshFailed => "REFRESH_FAILED",

            Event::SourceHealthy => "SOURCE_HEALTHY",
            Event::SourceUnhealthy => "SOURCE_UNHEALTHY",
        }
    }

    /// Returns true if this event means the loop cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::WatermarkFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
