//! Sync coordinator
//!
//! Drives fetch → transform → deliver → commit cycles against a single
//! watermark. Records are processed one at a time in position order, so
//! the watermark only ever moves past a contiguous prefix of delivered or
//! skipped records. Commit granularity is the batch: any retryable failure
//! leaves the watermark where the cycle found it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::crash_point::{maybe_crash, points};
use crate::delivery::{DeliveryOutcome, DeliveryTarget};
use crate::observability::{
    log_event_at, log_event_with_fields, Event, ObservationScope, Severity,
};
use crate::position::Position;
use crate::source::{Batch, RecordFetcher, RecordSource, SourceError};
use crate::transform::{TransformedPosting, Transformer};
use crate::watermark::{WatermarkCell, WatermarkStore};

use super::backoff::Backoff;
use super::config::{RecordFailurePolicy, SyncConfig};
use super::errors::{SyncError, SyncResult};
use super::journal::{JournalEntry, SkipJournal};
use super::refresh::{RefreshReport, Refresher};
use super::report::{CycleOutcome, CycleReport, SkipStage, SkippedRecord};
use super::state::CoordinatorState;

/// Result of a dry run: what the next cycle would submit
#[derive(Debug, Clone, Default)]
pub struct Preview {
    pub postings: Vec<TransformedPosting>,
    pub failures: Vec<SkippedRecord>,
    /// Position the watermark would advance to
    pub high: Option<Position>,
    pub capped: bool,
}

/// What the record loop decided for one record
enum Step {
    Continue,
    Stop,
}

pub struct SyncCoordinator {
    config: SyncConfig,
    fetcher: RecordFetcher,
    transformer: Transformer,
    target: Arc<dyn DeliveryTarget>,
    watermark: WatermarkCell,
    journal: Option<Arc<dyn SkipJournal>>,
    refresher: Option<Refresher>,
    backoff: Backoff,
    state: CoordinatorState,
    shutdown: watch::Receiver<bool>,
}

impl SyncCoordinator {
    /// Validate `config` and load the watermark once.
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn RecordSource>,
        transformer: Transformer,
        target: Arc<dyn DeliveryTarget>,
        store: Box<dyn WatermarkStore>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let watermark = WatermarkCell::load(store)?;
        let fetcher = RecordFetcher::new(source, config.on_integrity_error);
        let backoff = Backoff::new(config.backoff.clone());
        // No sender: shutdown is never requested unless `with_shutdown` is used
        let (_, shutdown) = watch::channel(false);

        Ok(Self {
            config,
            fetcher,
            transformer,
            target,
            watermark,
            journal: None,
            refresher: None,
            backoff,
            state: CoordinatorState::Idle,
            shutdown,
        })
    }

    pub fn with_journal(mut self, journal: Arc<dyn SkipJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Attach a refresh pass whose cursor lives in `cursor`
    pub fn with_refresh(mut self, cursor: Box<dyn WatermarkStore>) -> Self {
        let start = self.config.initial_position();
        self.refresher = Some(Refresher::new(self.config.refresh.clone(), cursor, start));
        self
    }

    /// Stop between records once the channel carries `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_backoff_seed(mut self, seed: u64) -> Self {
        self.backoff = Backoff::with_seed(self.config.backoff.clone(), seed);
        self
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Last durably committed position
    pub fn watermark(&self) -> Position {
        self.watermark.current()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn transition(&mut self, to: CoordinatorState) -> SyncResult<()> {
        self.state = self.state.transition(to)?;
        Ok(())
    }

    /// Leave Backoff once its delay has elapsed
    pub fn finish_backoff(&mut self) -> SyncResult<()> {
        if self.state == CoordinatorState::Backoff {
            self.transition(CoordinatorState::Idle)?;
        }
        Ok(())
    }

    /// Run one cycle.
    ///
    /// Source outages, retryable delivery failures and aborted records are
    /// reported in the returned outcome with a backoff delay. Only fatal
    /// errors come back as `Err`, after which the coordinator is halted.
    pub async fn run_cycle(&mut self) -> SyncResult<CycleReport> {
        if self.state.is_terminal() {
            return Err(SyncError::Halted);
        }
        self.finish_backoff()?;

        let cycle_id = Uuid::new_v4();
        let before = self.watermark.current();
        let mut report = CycleReport::new(cycle_id, before);

        let scope = ObservationScope::with_fields(
            "SYNC_CYCLE",
            &[
                ("cycle_id", &cycle_id.to_string()),
                ("watermark", &before.to_string()),
            ],
        );
        let started = Instant::now();

        let result = self.execute(&mut report).await;
        report.duration = started.elapsed();

        match result {
            Ok(()) => {
                scope.complete_with_fields(&[
                    ("outcome", report.outcome.name()),
                    ("fetched", &report.fetched.to_string()),
                    ("delivered", &report.delivered.to_string()),
                    ("skipped", &report.skipped.len().to_string()),
                    ("watermark", &report.watermark_after.to_string()),
                ]);
                Ok(report)
            }
            Err(err) => {
                if let SyncError::Watermark(inner) = &err {
                    log_event_with_fields(
                        Event::WatermarkFailed,
                        &[("code", inner.code()), ("reason", &inner.to_string())],
                    );
                }
                self.state = CoordinatorState::Halted;
                scope.fail_fatal(&err.to_string());
                Err(err)
            }
        }
    }

    async fn execute(&mut self, report: &mut CycleReport) -> SyncResult<()> {
        self.transition(CoordinatorState::Fetching)?;

        let batch = match self
            .fetcher
            .fetch(report.watermark_before, self.config.batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                let outcome = CycleOutcome::SourceFailed {
                    code: err.code(),
                    reason: err.to_string(),
                };
                return self.schedule_backoff(report, outcome, None);
            }
        };

        report.fetched = batch.rows_seen();
        report.capped = batch.capped;

        if batch.is_empty() {
            log_event_with_fields(
                Event::NoNewRecords,
                &[("watermark", &report.watermark_before.to_string())],
            );
            self.backoff.reset();
            report.outcome = CycleOutcome::NoNewRecords;
            return self.transition(CoordinatorState::Idle);
        }

        log_event_with_fields(
            Event::BatchFetched,
            &[
                ("records", &batch.records.len().to_string()),
                ("defects", &batch.skipped.len().to_string()),
                ("after", &report.watermark_before.to_string()),
                (
                    "high",
                    &batch.high.map(|p| p.to_string()).unwrap_or_default(),
                ),
                ("capped", if batch.capped { "true" } else { "false" }),
            ],
        );

        let high = match batch.high {
            Some(high) => high,
            None => {
                let err = SourceError::contract("batch carries no readable position");
                let outcome = CycleOutcome::SourceFailed {
                    code: err.code(),
                    reason: err.to_string(),
                };
                return self.schedule_backoff(report, outcome, None);
            }
        };

        for defect in &batch.skipped {
            report.skipped.push(SkippedRecord {
                position: defect.position,
                stage: SkipStage::Integrity,
                code: "SOURCE_DATA_INTEGRITY".to_string(),
                reason: defect.reason.clone(),
            });
        }

        if let Step::Stop = self.process_records(&batch, report).await? {
            return Ok(());
        }

        self.commit(&batch, high, report)
    }

    async fn process_records(
        &mut self,
        batch: &Batch,
        report: &mut CycleReport,
    ) -> SyncResult<Step> {
        for record in &batch.records {
            if self.shutdown_requested() {
                log_event_at(
                    Severity::Warn,
                    Event::CycleInterrupted,
                    &[
                        ("cycle_id", &report.cycle_id.to_string()),
                        ("next_position", &record.position().to_string()),
                    ],
                );
                report.skipped.clear();
                report.outcome = CycleOutcome::Interrupted;
                self.transition(CoordinatorState::Idle)?;
                return Ok(Step::Stop);
            }

            if self.state != CoordinatorState::Transforming {
                self.transition(CoordinatorState::Transforming)?;
            }
            let position = record.position();

            let posting = match self.transformer.transform(record) {
                Ok(posting) => posting,
                Err(err) => {
                    let skipped = SkippedRecord {
                        position: Some(position),
                        stage: SkipStage::Transform,
                        code: err.code().to_string(),
                        reason: err.to_string(),
                    };
                    match self.record_failure(report, skipped)? {
                        Step::Continue => continue,
                        Step::Stop => return Ok(Step::Stop),
                    }
                }
            };

            self.transition(CoordinatorState::Delivering)?;
            match self.target.deliver(&posting).await {
                DeliveryOutcome::Delivered => {
                    report.delivered += 1;
                    log_event_at(
                        Severity::Trace,
                        Event::RecordDelivered,
                        &[
                            ("position", &position.to_string()),
                            ("key", &posting.idempotency_key),
                        ],
                    );
                    maybe_crash(points::SYNC_AFTER_DELIVERY);
                }
                DeliveryOutcome::RetryableFailure {
                    reason,
                    retry_after,
                } => {
                    let outcome = CycleOutcome::DeliveryRetryable { position, reason };
                    self.schedule_backoff(report, outcome, retry_after)?;
                    return Ok(Step::Stop);
                }
                DeliveryOutcome::PermanentFailure { reason } => {
                    let skipped = SkippedRecord {
                        position: Some(position),
                        stage: SkipStage::Delivery,
                        code: "DELIVERY_PERMANENT".to_string(),
                        reason,
                    };
                    if let Step::Stop = self.record_failure(report, skipped)? {
                        return Ok(Step::Stop);
                    }
                }
            }
        }
        Ok(Step::Continue)
    }

    /// Apply the record failure policy to one failed record
    fn record_failure(
        &mut self,
        report: &mut CycleReport,
        skipped: SkippedRecord,
    ) -> SyncResult<Step> {
        let position = skipped
            .position
            .map(|p| p.to_string())
            .unwrap_or_default();

        match self.config.on_record_failure {
            RecordFailurePolicy::Skip => {
                log_event_at(
                    Severity::Warn,
                    Event::RecordSkipped,
                    &[
                        ("position", &position),
                        ("code", &skipped.code),
                        ("reason", &skipped.reason),
                    ],
                );
                report.skipped.push(skipped);
                Ok(Step::Continue)
            }
            RecordFailurePolicy::Abort => {
                let outcome = CycleOutcome::RecordAborted {
                    position: skipped.position.unwrap_or(report.watermark_before),
                    code: skipped.code,
                    reason: skipped.reason,
                };
                self.schedule_backoff(report, outcome, None)?;
                Ok(Step::Stop)
            }
        }
    }

    fn schedule_backoff(
        &mut self,
        report: &mut CycleReport,
        outcome: CycleOutcome,
        hint: Option<Duration>,
    ) -> SyncResult<()> {
        let delay = self.backoff.next_delay(hint);
        self.transition(CoordinatorState::Backoff)?;

        let reason = match &outcome {
            CycleOutcome::SourceFailed { reason, .. }
            | CycleOutcome::DeliveryRetryable { reason, .. }
            | CycleOutcome::RecordAborted { reason, .. } => reason.clone(),
            _ => String::new(),
        };
        log_event_at(
            Severity::Warn,
            Event::BackoffScheduled,
            &[
                ("outcome", outcome.name()),
                ("reason", &reason),
                ("delay_ms", &delay.as_millis().to_string()),
                ("attempt", &self.backoff.attempt().to_string()),
                ("watermark", &report.watermark_before.to_string()),
            ],
        );

        // nothing was moved past, so nothing counts as skipped
        report.skipped.clear();
        report.outcome = outcome;
        report.backoff = Some(delay);
        Ok(())
    }

    fn commit(
        &mut self,
        batch: &Batch,
        high: Position,
        report: &mut CycleReport,
    ) -> SyncResult<()> {
        self.transition(CoordinatorState::Committing)?;

        report.skipped.sort_by_key(|s| s.position);
        if let Some(journal) = &self.journal {
            let entries: Vec<JournalEntry> = report
                .skipped
                .iter()
                .cloned()
                .map(|record| JournalEntry::new(report.cycle_id, record))
                .collect();
            journal
                .append(&entries)
                .map_err(|e| SyncError::journal("append", e))?;
        }

        maybe_crash(points::SYNC_BEFORE_COMMIT);
        self.watermark.advance(high)?;
        maybe_crash(points::SYNC_AFTER_COMMIT);

        report.watermark_after = self.watermark.current();
        report.outcome = CycleOutcome::Committed;
        self.backoff.reset();
        self.transition(CoordinatorState::Idle)?;

        if batch.capped {
            log_event_with_fields(
                Event::BacklogDrain,
                &[
                    ("watermark", &report.watermark_after.to_string()),
                    ("batch_size", &self.config.batch_size.to_string()),
                ],
            );
        }
        Ok(())
    }

    /// Run cycles until the backlog is drained or a cycle needs a retry.
    ///
    /// Never sleeps; a cycle that schedules backoff ends the run.
    pub async fn run_once(&mut self) -> SyncResult<Vec<CycleReport>> {
        let mut reports = Vec::new();
        loop {
            let report = self.run_cycle().await?;
            let drain = report.drain_backlog() && !self.shutdown_requested();
            reports.push(report);
            if !drain {
                return Ok(reports);
            }
        }
    }

    /// Poll until shutdown is requested or a fatal error occurs
    pub async fn run(&mut self) -> SyncResult<()> {
        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh = self.refresh_ticker();

        'poll: loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = next_tick(&mut refresh) => {
                    self.run_refresh().await;
                    continue 'poll;
                }
                _ = shutdown_signal(&mut shutdown) => break 'poll,
            }

            loop {
                if self.shutdown_requested() {
                    break 'poll;
                }
                let report = self.run_cycle().await?;

                if let Some(delay) = report.backoff {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_signal(&mut shutdown) => break 'poll,
                    }
                    self.finish_backoff()?;
                    continue;
                }
                if !report.drain_backlog() {
                    break;
                }
            }
        }

        self.finish_backoff()?;
        Ok(())
    }

    /// Resend the next refresh slice below the watermark.
    ///
    /// `None` when no refresh cursor is attached or the coordinator halted.
    pub async fn run_refresh(&self) -> Option<RefreshReport> {
        if self.state.is_terminal() {
            return None;
        }
        let refresher = self.refresher.as_ref()?;
        let shutdown = self.shutdown.clone();
        let report = refresher
            .pass(
                &self.fetcher,
                &self.transformer,
                &self.target,
                self.watermark.current(),
                || *shutdown.borrow(),
            )
            .await;
        Some(report)
    }

    fn refresh_ticker(&self) -> Option<Interval> {
        let refresh = self.refresher.as_ref()?.config();
        if !refresh.enabled {
            return None;
        }
        let period = refresh.interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(ticker)
    }

    /// Fetch and transform the next batch without delivering or committing
    pub async fn preview(&self) -> SyncResult<Preview> {
        let batch = self
            .fetcher
            .fetch(self.watermark.current(), self.config.batch_size)
            .await?;

        let mut preview = Preview {
            high: batch.high,
            capped: batch.capped,
            ..Preview::default()
        };
        for defect in batch.skipped {
            preview.failures.push(SkippedRecord {
                position: defect.position,
                stage: SkipStage::Integrity,
                code: "SOURCE_DATA_INTEGRITY".to_string(),
                reason: defect.reason,
            });
        }
        for record in &batch.records {
            match self.transformer.transform(record) {
                Ok(posting) => preview.postings.push(posting),
                Err(err) => preview.failures.push(SkippedRecord {
                    position: Some(record.position()),
                    stage: SkipStage::Transform,
                    code: err.code().to_string(),
                    reason: err.to_string(),
                }),
            }
        }
        preview.failures.sort_by_key(|s| s.position);
        Ok(preview)
    }
}

/// Next tick of an optional ticker; never resolves without one
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Resolves once shutdown is requested; never if the sender is gone
async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::MemoryTarget;
    use crate::source::{MemorySource, SourceRecord};
    use crate::sync::journal::MemorySkipJournal;
    use crate::sync::refresh::RefreshOutcome;
    use crate::transform::{FieldSet, FieldSpec};
    use crate::value::Value;
    use crate::watermark::MemoryWatermarkStore;

    struct Harness {
        source: Arc<MemorySource>,
        target: Arc<MemoryTarget>,
        store: MemoryWatermarkStore,
        journal: MemorySkipJournal,
        coordinator: SyncCoordinator,
    }

    fn record(position: i64, amount: i64) -> SourceRecord {
        SourceRecord::from_pairs(
            Position::new(position),
            [("amount", Value::from(amount))],
        )
    }

    fn harness(config: SyncConfig, records: Vec<SourceRecord>) -> Harness {
        let source = Arc::new(MemorySource::with_records(records));
        let target = Arc::new(MemoryTarget::new());
        let store = MemoryWatermarkStore::new(Position::new(100));
        let journal = MemorySkipJournal::new();
        let fields = FieldSet::compile(&[FieldSpec::formula("total", "amount * 1.1")]).unwrap();

        let coordinator = SyncCoordinator::new(
            config,
            source.clone(),
            Transformer::new(fields, "test"),
            target.clone(),
            Box::new(store.clone()),
        )
        .unwrap()
        .with_journal(Arc::new(journal.clone()))
        .with_backoff_seed(3);

        Harness {
            source,
            target,
            store,
            journal,
            coordinator,
        }
    }

    #[tokio::test]
    async fn test_full_batch_commits_high_position() {
        let mut h = harness(
            SyncConfig::default(),
            vec![record(101, 10), record(102, 20), record(103, 30)],
        );
        let report = h.coordinator.run_cycle().await.unwrap();

        assert_eq!(report.outcome, CycleOutcome::Committed);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.watermark_after, Position::new(103));
        assert_eq!(h.store.persisted(), Some(Position::new(103)));
        assert_eq!(h.coordinator.state(), CoordinatorState::Idle);

        let totals: Vec<String> = h
            .target
            .delivered()
            .iter()
            .map(|p| p.get("total").unwrap().to_string())
            .collect();
        assert_eq!(totals, vec!["11.0", "22.0", "33.0"]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let mut h = harness(SyncConfig::default(), vec![record(50, 1)]);
        let report = h.coordinator.run_cycle().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::NoNewRecords);
        assert_eq!(h.store.commits(), 0);
        assert_eq!(h.target.attempts(), 0);
    }

    #[tokio::test]
    async fn test_retryable_failure_keeps_watermark() {
        let mut h = harness(
            SyncConfig::default(),
            vec![record(101, 10), record(102, 20), record(103, 30)],
        );
        h.target.script(
            Position::new(102),
            DeliveryOutcome::RetryableFailure {
                reason: "503".into(),
                retry_after: Some(Duration::from_secs(2)),
            },
        );

        let report = h.coordinator.run_cycle().await.unwrap();
        assert!(matches!(
            report.outcome,
            CycleOutcome::DeliveryRetryable { position, .. } if position == Position::new(102)
        ));
        assert!(report.backoff.unwrap() >= Duration::from_secs(2));
        assert_eq!(h.coordinator.state(), CoordinatorState::Backoff);
        assert_eq!(h.coordinator.watermark(), Position::new(100));
        assert_eq!(h.store.commits(), 0);

        let report = h.coordinator.run_cycle().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Committed);
        assert_eq!(report.watermark_before, Position::new(100));
        assert_eq!(h.store.persisted(), Some(Position::new(103)));
        // 101 was resubmitted under the same key and deduplicated
        assert_eq!(h.target.delivered_positions().len(), 3);
        assert_eq!(h.target.attempts(), 5);
    }

    #[tokio::test]
    async fn test_missing_input_is_skipped_and_journaled() {
        let missing = SourceRecord::from_pairs(Position::new(102), [("note", Value::from("x"))]);
        let mut h = harness(
            SyncConfig::default(),
            vec![record(101, 10), missing, record(103, 30)],
        );
        let report = h.coordinator.run_cycle().await.unwrap();

        assert_eq!(report.outcome, CycleOutcome::Committed);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].stage, SkipStage::Transform);
        assert_eq!(h.store.persisted(), Some(Position::new(103)));

        let entries = h.journal.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.position, Some(Position::new(102)));
        assert_eq!(entries[0].cycle_id, report.cycle_id);
    }

    #[tokio::test]
    async fn test_abort_policy_backs_off_without_commit() {
        let config = SyncConfig {
            on_record_failure: RecordFailurePolicy::Abort,
            ..SyncConfig::default()
        };
        let mut h = harness(config, vec![record(101, 10), record(102, 20)]);
        h.target
            .script(Position::new(102), DeliveryOutcome::permanent("422"));

        let report = h.coordinator.run_cycle().await.unwrap();
        assert!(matches!(report.outcome, CycleOutcome::RecordAborted { .. }));
        assert!(report.backoff.is_some());
        assert!(report.skipped.is_empty());
        assert_eq!(h.store.commits(), 0);
        assert!(h.journal.entries().is_empty());
    }

    #[tokio::test]
    async fn test_source_outage_backs_off() {
        let mut h = harness(SyncConfig::default(), vec![record(101, 10)]);
        h.source.fail_next(1);

        let report = h.coordinator.run_cycle().await.unwrap();
        assert!(matches!(report.outcome, CycleOutcome::SourceFailed { .. }));
        assert_eq!(h.coordinator.state(), CoordinatorState::Backoff);

        let report = h.coordinator.run_cycle().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Committed);
    }

    #[tokio::test]
    async fn test_persistence_failure_halts() {
        let mut h = harness(SyncConfig::default(), vec![record(101, 10)]);
        h.store.set_failing(true);

        let err = h.coordinator.run_cycle().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(h.coordinator.state(), CoordinatorState::Halted);
        assert!(matches!(
            h.coordinator.run_cycle().await,
            Err(SyncError::Halted)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_between_records() {
        let mut h = harness(SyncConfig::default(), vec![record(101, 10), record(102, 20)]);
        let (tx, rx) = watch::channel(true);
        h.coordinator = h.coordinator.with_shutdown(rx);

        let report = h.coordinator.run_cycle().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Interrupted);
        assert_eq!(h.target.attempts(), 0);
        assert_eq!(h.store.commits(), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_run_once_drains_backlog() {
        let config = SyncConfig {
            batch_size: 2,
            ..SyncConfig::default()
        };
        let records = (101..=105).map(|p| record(p, p)).collect();
        let mut h = harness(config, records);

        let reports = h.coordinator.run_once().await.unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports[0].capped && reports[1].capped);
        assert!(!reports[2].capped);
        assert_eq!(h.store.persisted(), Some(Position::new(105)));
    }

    #[tokio::test]
    async fn test_refresh_resends_below_watermark_only() {
        let config = SyncConfig {
            batch_size: 2,
            initial_position: 100,
            ..SyncConfig::default()
        };
        let records = (101..=104).map(|p| record(p, p)).collect();
        let mut h = harness(config, records);
        let cursor = MemoryWatermarkStore::new(Position::ZERO);
        h.coordinator = h.coordinator.with_refresh(Box::new(cursor.clone()));

        h.coordinator.run_cycle().await.unwrap();
        assert_eq!(h.coordinator.watermark(), Position::new(102));

        let report = h.coordinator.run_refresh().await.unwrap();
        assert_eq!(report.resent, 2);
        assert_eq!(report.cursor_after, Position::new(102));
        assert_eq!(h.coordinator.watermark(), Position::new(102));
        assert_eq!(h.target.delivered_positions().len(), 2);
        assert_eq!(h.target.attempts(), 4);

        let report = h.coordinator.run_refresh().await.unwrap();
        assert_eq!(report.outcome, RefreshOutcome::Wrapped);
        // the refresh cursor starts from the initial position, not from zero
        assert_eq!(cursor.persisted(), Some(Position::new(100)));
    }

    #[tokio::test]
    async fn test_refresh_absent_without_cursor() {
        let h = harness(SyncConfig::default(), vec![record(101, 10)]);
        assert!(h.coordinator.run_refresh().await.is_none());
    }

    #[tokio::test]
    async fn test_preview_has_no_side_effects() {
        let h = harness(SyncConfig::default(), vec![record(101, 10), record(102, 20)]);
        let preview = h.coordinator.preview().await.unwrap();

        assert_eq!(preview.postings.len(), 2);
        assert_eq!(preview.high, Some(Position::new(102)));
        assert_eq!(h.target.attempts(), 0);
        assert_eq!(h.store.commits(), 0);
    }
}
