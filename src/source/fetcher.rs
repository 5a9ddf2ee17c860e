//! Record fetcher
//!
//! Wraps a `RecordSource`, enforces its ordering and size contract, and
//! applies the integrity policy to malformed rows.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::observability::{log_event_at, Event, Severity};
use crate::position::Position;

use super::errors::{SourceError, SourceResult};
use super::record::Batch;
use super::RecordSource;

/// What to do with a malformed source row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// Log the row, keep it in `Batch::skipped` and move past it
    #[default]
    Skip,
    /// Fail the fetch
    Abort,
}

pub struct RecordFetcher {
    source: Arc<dyn RecordSource>,
    policy: IntegrityPolicy,
}

impl RecordFetcher {
    pub fn new(source: Arc<dyn RecordSource>, policy: IntegrityPolicy) -> Self {
        Self { source, policy }
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    pub fn policy(&self) -> IntegrityPolicy {
        self.policy
    }

    /// Fetch up to `limit` records strictly above `after`, ascending
    pub async fn fetch(&self, after: Position, limit: usize) -> SourceResult<Batch> {
        let rows = self.source.fetch_rows(after, limit).await?;

        if rows.len() > limit {
            return Err(SourceError::contract(format!(
                "returned {} rows for limit {}",
                rows.len(),
                limit
            )));
        }

        let mut batch = Batch {
            capped: limit > 0 && rows.len() == limit,
            ..Batch::default()
        };
        let mut last = after;

        for row in rows {
            let position = match &row {
                Ok(record) => Some(record.position()),
                Err(defect) => defect.position,
            };

            if let Some(p) = position {
                if p <= last {
                    return Err(SourceError::contract(format!(
                        "position {} does not ascend past {}",
                        p, last
                    )));
                }
                last = p;
                batch.high = Some(p);
            }

            match row {
                Ok(record) => batch.records.push(record),
                Err(defect) => match self.policy {
                    IntegrityPolicy::Abort => return Err(SourceError::DataIntegrity(defect)),
                    IntegrityPolicy::Skip => {
                        let position = defect
                            .position
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "unknown".to_string());
                        log_event_at(
                            Severity::Warn,
                            Event::RowDefect,
                            &[("position", &position), ("reason", &defect.reason)],
                        );
                        batch.skipped.push(defect);
                    }
                },
            }
        }

        // a batch that cannot move the watermark would be refetched forever
        if batch.high.is_none() && !batch.is_empty() {
            return Err(SourceError::contract(format!(
                "none of the {} rows carries a readable position",
                batch.rows_seen()
            )));
        }

        Ok(batch)
    }
}
