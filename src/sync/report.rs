//! Cycle reports

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::position::Position;

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing above the watermark
    NoNewRecords,
    /// Every record delivered or skipped, watermark advanced
    Committed,
    /// The source could not be read; backoff scheduled
    SourceFailed { code: &'static str, reason: String },
    /// The target asked for a retry; backoff scheduled
    DeliveryRetryable { position: Position, reason: String },
    /// A record failed under the abort policy; backoff scheduled
    RecordAborted {
        position: Position,
        code: String,
        reason: String,
    },
    /// Shutdown requested before the batch finished
    Interrupted,
}

impl CycleOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            CycleOutcome::NoNewRecords => "no_new_records",
            CycleOutcome::Committed => "committed",
            CycleOutcome::SourceFailed { .. } => "source_failed",
            CycleOutcome::DeliveryRetryable { .. } => "delivery_retryable",
            CycleOutcome::RecordAborted { .. } => "record_aborted",
            CycleOutcome::Interrupted => "interrupted",
        }
    }

    /// True for outcomes that leave the watermark unchanged and back off
    pub fn is_retry(&self) -> bool {
        matches!(
            self,
            CycleOutcome::SourceFailed { .. }
                | CycleOutcome::DeliveryRetryable { .. }
                | CycleOutcome::RecordAborted { .. }
        )
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pipeline stage a record was skipped at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipStage {
    Integrity,
    Transform,
    Delivery,
}

/// A record the cycle moved past without delivering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// `None` for a row that had no readable position
    pub position: Option<Position>,
    pub stage: SkipStage,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub outcome: CycleOutcome,
    /// Rows returned by the source, well-formed or not
    pub fetched: usize,
    pub delivered: usize,
    pub skipped: Vec<SkippedRecord>,
    pub watermark_before: Position,
    pub watermark_after: Position,
    /// The batch was full; another cycle should follow immediately
    pub capped: bool,
    /// Delay scheduled before the retry, if any
    pub backoff: Option<Duration>,
    pub duration: Duration,
}

impl CycleReport {
    pub(crate) fn new(cycle_id: Uuid, watermark: Position) -> Self {
        Self {
            cycle_id,
            outcome: CycleOutcome::NoNewRecords,
            fetched: 0,
            delivered: 0,
            skipped: Vec::new(),
            watermark_before: watermark,
            watermark_after: watermark,
            capped: false,
            backoff: None,
            duration: Duration::ZERO,
        }
    }

    pub fn advanced(&self) -> bool {
        self.watermark_after > self.watermark_before
    }

    /// True when the loop should start the next cycle without waiting.
    ///
    /// Requires progress: a full batch that left the watermark in place
    /// would otherwise be refetched in a tight loop.
    pub fn drain_backlog(&self) -> bool {
        self.capped && self.outcome == CycleOutcome::Committed && self.advanced()
    }
}
