//! Sync configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::position::Position;
use crate::source::IntegrityPolicy;

use super::errors::{SyncError, SyncResult};

/// Largest batch a single fetch may request
pub const MAX_BATCH_SIZE: usize = 10_000;

/// What to do with a record that fails to transform or is permanently
/// rejected by the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFailurePolicy {
    /// Journal the record and move past it
    #[default]
    Skip,
    /// Abort the cycle; the batch is retried after backoff
    Abort,
}

/// Retry backoff bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Fraction of the delay randomized in both directions
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_initial_ms() -> u64 {
    1_000
}

fn default_max_ms() -> u64 {
    300_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> SyncResult<()> {
        if self.initial_ms == 0 {
            return Err(SyncError::Config("backoff.initial_ms must be > 0".into()));
        }
        if self.max_ms < self.initial_ms {
            return Err(SyncError::Config(
                "backoff.max_ms must be >= backoff.initial_ms".into(),
            ));
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(SyncError::Config("backoff.multiplier must be >= 1.0".into()));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(SyncError::Config("backoff.jitter must be within 0..=1".into()));
        }
        Ok(())
    }
}

/// Periodic re-delivery of already synced records.
///
/// Each pass resends the next slice of records at or below the watermark,
/// sized so the whole source is covered once per `cycle_days`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Run refresh passes from the poll loop (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between passes (default: 300)
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,

    /// Days to cover every record once (default: 14)
    #[serde(default = "default_refresh_cycle_days")]
    pub cycle_days: u64,

    #[serde(default = "default_refresh_min_batch")]
    pub min_batch: usize,

    #[serde(default = "default_refresh_max_batch")]
    pub max_batch: usize,
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_refresh_cycle_days() -> u64 {
    14
}

fn default_refresh_min_batch() -> usize {
    10
}

fn default_refresh_max_batch() -> usize {
    500
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_refresh_interval_secs(),
            cycle_days: default_refresh_cycle_days(),
            min_batch: default_refresh_min_batch(),
            max_batch: default_refresh_max_batch(),
        }
    }
}

impl RefreshConfig {
    pub fn validate(&self) -> SyncResult<()> {
        if self.interval_secs == 0 {
            return Err(SyncError::Config("refresh.interval_secs must be > 0".into()));
        }
        if self.cycle_days == 0 {
            return Err(SyncError::Config("refresh.cycle_days must be > 0".into()));
        }
        if self.min_batch == 0 || self.max_batch < self.min_batch || self.max_batch > MAX_BATCH_SIZE
        {
            return Err(SyncError::Config(format!(
                "refresh batch bounds must satisfy 1 <= min_batch <= max_batch <= {}",
                MAX_BATCH_SIZE
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Records per pass for a source holding `count` records
    pub fn batch_size(&self, count: u64) -> usize {
        let passes = (self.cycle_days * 86_400 / self.interval_secs).max(1);
        let per_pass = usize::try_from(count / passes).unwrap_or(usize::MAX);
        per_pass.clamp(self.min_batch, self.max_batch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Records per fetch (default: 500)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds between polls (default: 60)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub on_record_failure: RecordFailurePolicy,

    #[serde(default)]
    pub on_integrity_error: IntegrityPolicy,

    /// Watermark used before the first commit (default: 0)
    #[serde(default)]
    pub initial_position: i64,

    #[serde(default)]
    pub refresh: RefreshConfig,
}

fn default_batch_size() -> usize {
    500
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval_secs(),
            backoff: BackoffConfig::default(),
            on_record_failure: RecordFailurePolicy::default(),
            on_integrity_error: IntegrityPolicy::default(),
            initial_position: 0,
            refresh: RefreshConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(SyncError::Config(format!(
                "batch_size must be within 1..={}",
                MAX_BATCH_SIZE
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(SyncError::Config("poll_interval_secs must be > 0".into()));
        }
        self.backoff.validate()?;
        self.refresh.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_position(&self) -> Position {
        Position::new(self.initial_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.backoff.initial_ms, 1_000);
        assert_eq!(config.backoff.max_ms, 300_000);
        assert_eq!(config.on_record_failure, RecordFailurePolicy::Skip);
        assert_eq!(config.on_integrity_error, IntegrityPolicy::Skip);
        assert_eq!(config.initial_position(), Position::ZERO);
        assert!(!config.refresh.enabled);
        assert_eq!(config.refresh.cycle_days, 14);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_refresh_batch_covers_source_once_per_cycle() {
        // every 5 minutes for 14 days is 4032 passes
        let refresh = RefreshConfig {
            max_batch: 1_000,
            ..RefreshConfig::default()
        };
        assert_eq!(refresh.batch_size(400_000), 400_000 / 4_032);
        assert_eq!(refresh.batch_size(20), 10);
        assert_eq!(refresh.batch_size(u64::MAX), 1_000);
        assert_eq!(refresh.batch_size(0), 10);
    }

    #[test]
    fn test_refresh_bounds_validated() {
        let mut config = SyncConfig::default();
        config.refresh.min_batch = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.refresh.max_batch = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policies_parse_lowercase() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"on_record_failure":"abort","on_integrity_error":"abort"}"#)
                .unwrap();
        assert_eq!(config.on_record_failure, RecordFailurePolicy::Abort);
        assert_eq!(config.on_integrity_error, IntegrityPolicy::Abort);
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut config = SyncConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.backoff.max_ms = 10;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.backoff.jitter = 1.5;
        assert!(config.validate().is_err());
    }
}
