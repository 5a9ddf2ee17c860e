//! Connector configuration
//!
//! One JSON file describes a connector: where records come from, where
//! postings go, how the sync loop behaves and which derived fields to
//! produce. Secrets are never stored here; the file names the environment
//! variables that hold them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::delivery::{DeliveryTarget, HttpTarget, HttpTargetConfig, MemoryTarget};
use crate::position::Position;
use crate::source::{MemorySource, RecordSource, SourceRecord, SqlSource, SqlSourceConfig};
use crate::sync::{FileSkipJournal, SyncConfig};
use crate::transform::{FieldSet, FieldSpec, Transformer};
use crate::value::Value;
use crate::watermark::FileWatermarkStore;

/// Refresh cursor file name inside the state directory
pub const REFRESH_CURSOR_FILE: &str = "refresh_cursor.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError(message.into())
}

/// A record written inline in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineRecord {
    pub position: i64,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl InlineRecord {
    pub fn to_record(&self) -> ConfigResult<SourceRecord> {
        let mut pairs = Vec::with_capacity(self.fields.len());
        for (name, json) in &self.fields {
            let value = Value::from_json(json).ok_or_else(|| {
                invalid(format!(
                    "record {}: field '{}' must be a scalar",
                    self.position, name
                ))
            })?;
            pairs.push((name.clone(), value));
        }
        Ok(SourceRecord::from_pairs(Position::new(self.position), pairs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Postgres(SqlSourceConfig),
    Memory {
        #[serde(default)]
        records: Vec<InlineRecord>,
        /// Field names the source reports to the startup schema check
        #[serde(default)]
        fields: Option<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetConfig {
    Http(HttpTargetConfig),
    /// Accepts every posting; for local runs and tests
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Stable connector name, used in logs and idempotency keys
    pub connector_id: String,

    /// Idempotency key prefix (default: `connector_id`)
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Directory holding the watermark file and skip journal
    pub state_dir: PathBuf,

    pub source: SourceConfig,

    pub target: TargetConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    pub fields: Vec<FieldSpec>,

    /// Append skipped records to `state_dir/skipped.jsonl` (default: true)
    #[serde(default = "default_journal")]
    pub journal: bool,
}

fn default_journal() -> bool {
    true
}

impl AppConfig {
    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| invalid(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: AppConfig = serde_json::from_str(content)
            .map_err(|e| invalid(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.connector_id.trim().is_empty() {
            return Err(invalid("connector_id must not be empty"));
        }
        if self.key_prefix().contains(char::is_whitespace) {
            return Err(invalid("key_prefix must not contain whitespace"));
        }
        if self.fields.is_empty() {
            return Err(invalid("at least one field is required"));
        }
        self.sync.validate().map_err(|e| invalid(e.to_string()))?;

        match &self.source {
            SourceConfig::Postgres(sql) => sql.validate().map_err(|e| invalid(e.to_string()))?,
            SourceConfig::Memory { records, .. } => {
                for record in records {
                    record.to_record()?;
                }
            }
        }
        if let TargetConfig::Http(http) = &self.target {
            http.validate().map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }

    pub fn key_prefix(&self) -> &str {
        self.key_prefix.as_deref().unwrap_or(&self.connector_id)
    }

    /// Compile the field set into a transformer
    pub fn transformer(&self) -> ConfigResult<Transformer> {
        let fields = FieldSet::compile(&self.fields).map_err(|e| invalid(e.to_string()))?;
        Ok(Transformer::new(fields, self.key_prefix()))
    }

    pub fn build_source(&self) -> ConfigResult<Arc<dyn RecordSource>> {
        match &self.source {
            SourceConfig::Postgres(sql) => {
                let url = std::env::var(&sql.url_env).map_err(|_| {
                    invalid(format!("environment variable {} is not set", sql.url_env))
                })?;
                let source =
                    SqlSource::connect_lazy(sql.clone(), &url).map_err(|e| invalid(e.to_string()))?;
                Ok(Arc::new(source))
            }
            SourceConfig::Memory { records, fields } => {
                let records = records
                    .iter()
                    .map(InlineRecord::to_record)
                    .collect::<ConfigResult<Vec<_>>>()?;
                let source = MemorySource::with_records(records);
                if let Some(fields) = fields {
                    source.set_fields(fields.clone());
                }
                Ok(Arc::new(source))
            }
        }
    }

    pub fn build_target(&self) -> ConfigResult<Arc<dyn DeliveryTarget>> {
        match &self.target {
            TargetConfig::Http(http) => {
                let target = HttpTarget::from_env(http).map_err(|e| invalid(e.to_string()))?;
                Ok(Arc::new(target))
            }
            TargetConfig::Memory => Ok(Arc::new(MemoryTarget::new())),
        }
    }

    pub fn watermark_store(&self) -> FileWatermarkStore {
        FileWatermarkStore::in_dir(&self.state_dir, self.sync.initial_position())
    }

    /// Refresh cursor; same document format as the watermark
    pub fn refresh_store(&self) -> FileWatermarkStore {
        FileWatermarkStore::new(
            self.state_dir.join(REFRESH_CURSOR_FILE),
            self.sync.initial_position(),
        )
    }

    /// Create the state directory if needed
    pub fn ensure_state_dir(&self) -> ConfigResult<()> {
        fs::create_dir_all(&self.state_dir).map_err(|e| {
            invalid(format!(
                "failed to create state_dir {}: {}",
                self.state_dir.display(),
                e
            ))
        })
    }

    pub fn open_journal(&self) -> ConfigResult<Option<FileSkipJournal>> {
        if !self.journal {
            return Ok(None);
        }
        FileSkipJournal::in_dir(&self.state_dir)
            .map(Some)
            .map_err(|e| invalid(format!("failed to open skip journal: {}", e)))
    }
}
