//! Refresh pass
//!
//! Walks already synced records in position order and resends them under
//! their usual idempotency keys, a slice per pass. The slice cursor is
//! persisted separately from the watermark and wraps back to the start
//! once it runs past the last synced record, so the whole source is
//! revisited once per refresh cycle.
//!
//! A refresh never touches the watermark. Failures end the pass early and
//! leave the cursor where the pass found it.

use std::sync::Arc;

use serde::Serialize;

use crate::delivery::{DeliveryOutcome, DeliveryTarget};
use crate::observability::{log_event_at, log_event_with_fields, Event, Severity};
use crate::position::Position;
use crate::source::RecordFetcher;
use crate::transform::Transformer;
use crate::watermark::{WatermarkResult, WatermarkStore};

use super::config::RefreshConfig;

/// How a refresh pass ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Cursor moved to the last record of the slice
    Advanced,
    /// Nothing left below the watermark; cursor reset to the start
    Wrapped,
    /// Source or target failed; cursor unchanged
    Failed { code: String, reason: String },
    /// Shutdown requested mid-slice; cursor unchanged
    Interrupted,
}

impl RefreshOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            RefreshOutcome::Advanced => "advanced",
            RefreshOutcome::Wrapped => "wrapped",
            RefreshOutcome::Failed { .. } => "failed",
            RefreshOutcome::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub cursor_before: Position,
    pub cursor_after: Position,
    pub batch_size: usize,
    pub resent: usize,
    /// Records the transformer or the target refused
    pub rejected: usize,
    pub outcome: RefreshOutcome,
}

impl RefreshReport {
    fn new(cursor: Position, batch_size: usize) -> Self {
        Self {
            cursor_before: cursor,
            cursor_after: cursor,
            batch_size,
            resent: 0,
            rejected: 0,
            outcome: RefreshOutcome::Advanced,
        }
    }
}

pub struct Refresher {
    config: RefreshConfig,
    cursor: Box<dyn WatermarkStore>,
    start: Position,
}

impl Refresher {
    /// `start` is where the cursor begins and where it wraps back to
    pub fn new(config: RefreshConfig, cursor: Box<dyn WatermarkStore>, start: Position) -> Self {
        Self {
            config,
            cursor,
            start,
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn cursor(&self) -> WatermarkResult<Position> {
        self.cursor.load()
    }

    /// Resend the next slice of records at or below `ceiling`
    pub async fn pass(
        &self,
        fetcher: &RecordFetcher,
        transformer: &Transformer,
        target: &Arc<dyn DeliveryTarget>,
        ceiling: Position,
        stop: impl Fn() -> bool,
    ) -> RefreshReport {
        let cursor = match self.cursor.load() {
            Ok(cursor) => cursor,
            Err(err) => {
                let mut report = RefreshReport::new(self.start, 0);
                return self.fail(&mut report, err.code(), err.to_string());
            }
        };

        let count = match fetcher.source().count().await {
            Ok(count) => count,
            Err(err) => {
                let mut report = RefreshReport::new(cursor, 0);
                return self.fail(&mut report, err.code(), err.to_string());
            }
        };
        let mut report = RefreshReport::new(cursor, self.config.batch_size(count));

        let batch = match fetcher.fetch(cursor, report.batch_size).await {
            Ok(batch) => batch,
            Err(err) => return self.fail(&mut report, err.code(), err.to_string()),
        };

        let records: Vec<_> = batch
            .records
            .iter()
            .filter(|r| r.position() <= ceiling)
            .collect();
        let reached = batch.high.filter(|high| *high <= ceiling).or_else(|| {
            records.last().map(|r| r.position())
        });

        let Some(next) = reached else {
            return self.wrap(report);
        };

        for record in records {
            if stop() {
                report.outcome = RefreshOutcome::Interrupted;
                return report;
            }

            let posting = match transformer.transform(record) {
                Ok(posting) => posting,
                Err(err) => {
                    report.rejected += 1;
                    log_event_at(
                        Severity::Warn,
                        Event::RecordSkipped,
                        &[
                            ("position", &record.position().to_string()),
                            ("code", err.code()),
                            ("reason", &err.to_string()),
                            ("pass", "refresh"),
                        ],
                    );
                    continue;
                }
            };

            match target.deliver(&posting).await {
                DeliveryOutcome::Delivered => report.resent += 1,
                DeliveryOutcome::PermanentFailure { reason } => {
                    report.rejected += 1;
                    log_event_at(
                        Severity::Warn,
                        Event::RecordSkipped,
                        &[
                            ("position", &record.position().to_string()),
                            ("code", "DELIVERY_PERMANENT"),
                            ("reason", &reason),
                            ("pass", "refresh"),
                        ],
                    );
                }
                DeliveryOutcome::RetryableFailure { reason, .. } => {
                    return self.fail(&mut report, "DELIVERY_RETRYABLE", reason);
                }
            }
        }

        if let Err(err) = self.cursor.commit(next) {
            return self.fail(&mut report, err.code(), err.to_string());
        }
        report.cursor_after = next;
        log_event_with_fields(
            Event::RefreshComplete,
            &[
                ("cursor", &next.to_string()),
                ("batch_size", &report.batch_size.to_string()),
                ("resent", &report.resent.to_string()),
                ("rejected", &report.rejected.to_string()),
            ],
        );
        report
    }

    fn wrap(&self, mut report: RefreshReport) -> RefreshReport {
        if let Err(err) = self.cursor.commit(self.start) {
            return self.fail(&mut report, err.code(), err.to_string());
        }
        report.cursor_after = self.start;
        report.outcome = RefreshOutcome::Wrapped;
        log_event_with_fields(
            Event::RefreshWrapped,
            &[
                ("from", &report.cursor_before.to_string()),
                ("to", &self.start.to_string()),
            ],
        );
        report
    }

    fn fail(&self, report: &mut RefreshReport, code: &str, reason: String) -> RefreshReport {
        log_event_at(
            Severity::Warn,
            Event::RefreshFailed,
            &[
                ("cursor", &report.cursor_before.to_string()),
                ("code", code),
                ("reason", &reason),
            ],
        );
        report.cursor_after = report.cursor_before;
        report.outcome = RefreshOutcome::Failed {
            code: code.to_string(),
            reason,
        };
        report.clone()
    }
}
