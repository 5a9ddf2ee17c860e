//! In-memory record source
//!
//! Backs the test suite and `once --dry-run` runs against inline records.
//! Outages can be scripted with `fail_next` and `set_available`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::position::Position;

use super::errors::{RowDefect, SourceError, SourceResult};
use super::record::SourceRecord;
use super::{RecordSource, Row};

#[derive(Debug, Default)]
pub struct MemorySource {
    rows: Mutex<BTreeMap<Position, Row>>,
    fields: Mutex<Option<Vec<String>>>,
    failures_remaining: AtomicUsize,
    unavailable: AtomicBool,
    fetch_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I: IntoIterator<Item = SourceRecord>>(records: I) -> Self {
        let source = Self::new();
        for record in records {
            source.insert(record);
        }
        source
    }

    /// Add or replace the record at its position
    pub fn insert(&self, record: SourceRecord) {
        self.rows().insert(record.position(), Ok(record));
    }

    /// Add a malformed row at `position`
    pub fn push_defect(&self, position: Position, reason: &str) {
        self.rows()
            .insert(position, Err(RowDefect::new(Some(position), reason)));
    }

    /// Declare the field names `describe_fields` reports
    pub fn set_fields(&self, fields: Vec<String>) {
        *self.fields.lock().unwrap_or_else(PoisonError::into_inner) = Some(fields);
    }

    /// Fail the next `n` fetches with `Unavailable`
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Toggle a persistent outage
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of `fetch_rows` calls so far, failed ones included
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, BTreeMap<Position, Row>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> SourceResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable("memory source is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn fetch_rows(&self, after: Position, limit: usize) -> SourceResult<Vec<Row>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let scripted = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if scripted.is_ok() {
            return Err(SourceError::unavailable("scripted outage"));
        }

        let rows = self.rows();
        Ok(rows
            .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
            .take(limit)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn health_check(&self) -> SourceResult<()> {
        self.check_available()
    }

    async fn count(&self) -> SourceResult<u64> {
        self.check_available()?;
        Ok(self.rows().len() as u64)
    }

    async fn describe_fields(&self) -> SourceResult<Option<Vec<String>>> {
        self.check_available()?;
        Ok(self
            .fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
