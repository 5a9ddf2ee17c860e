//! PostgreSQL record source
//!
//! Wraps a configured base query:
//!
//! ```text
//! SELECT * FROM (<query>) AS src
//!   WHERE src."<position_column>" > $1
//!   ORDER BY src."<position_column>" ASC
//!   LIMIT $2
//! ```
//!
//! A timestamp position column is compared, ordered and decoded through a
//! single epoch-millisecond expression computed by the server, so the
//! stored watermark and the filter never disagree on precision.
//!
//! Columns are decoded by their declared kind. A row whose position or any
//! declared column fails to decode becomes a `RowDefect`.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row as _};

use crate::position::Position;
use crate::value::Value;

use super::errors::{RowDefect, SourceError, SourceResult};
use super::record::SourceRecord;
use super::{RecordSource, Row};

/// How a declared column is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Number,
    Timestamp,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// How the position column maps to a `Position`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    /// Auto-increment integer id
    #[default]
    Integer,
    /// Timestamp column, truncated to epoch milliseconds by the server.
    /// Rows must still be unique at millisecond precision.
    TimestampMillis,
}

/// Result column carrying the server-computed millisecond position
pub const POSITION_MILLIS_COLUMN: &str = "chronosync_position_ms";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlSourceConfig {
    /// Environment variable holding the connection URL
    #[serde(default = "default_url_env")]
    pub url_env: String,
    /// Base query, run as a subquery filtered and ordered on the position column
    pub query: String,
    pub position_column: String,
    #[serde(default)]
    pub position_kind: PositionKind,
    pub columns: Vec<ColumnSpec>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_url_env() -> String {
    "CHRONOSYNC_DATABASE_URL".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();

fn is_identifier(name: &str) -> bool {
    match IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok()) {
        Some(re) => re.is_match(name),
        None => false,
    }
}

impl SqlSourceConfig {
    pub fn validate(&self) -> SourceResult<()> {
        if self.query.trim().is_empty() {
            return Err(SourceError::configuration("query is empty"));
        }
        if self.query.trim_end().ends_with(';') {
            return Err(SourceError::configuration(
                "query must not end with ';'",
            ));
        }
        if !is_identifier(&self.position_column) {
            return Err(SourceError::configuration(format!(
                "invalid position column '{}'",
                self.position_column
            )));
        }
        if self.columns.is_empty() {
            return Err(SourceError::configuration("no columns declared"));
        }
        for column in &self.columns {
            if !is_identifier(&column.name) {
                return Err(SourceError::configuration(format!(
                    "invalid column name '{}'",
                    column.name
                )));
            }
        }
        if self.max_connections == 0 {
            return Err(SourceError::configuration("max_connections must be > 0"));
        }
        Ok(())
    }

    /// Statement used by `fetch_rows`
    pub fn fetch_sql(&self) -> String {
        let query = self.query.trim();
        match self.position_kind {
            PositionKind::Integer => format!(
                "SELECT * FROM ({query}) AS src WHERE src.\"{pos}\" > $1 ORDER BY src.\"{pos}\" ASC LIMIT $2",
                query = query,
                pos = self.position_column,
            ),
            PositionKind::TimestampMillis => {
                let key = format!(
                    "floor(extract(epoch from src.\"{}\") * 1000)::bigint",
                    self.position_column
                );
                format!(
                    "SELECT src.*, {key} AS \"{alias}\" FROM ({query}) AS src WHERE {key} > $1 ORDER BY {key} ASC LIMIT $2",
                    key = key,
                    alias = POSITION_MILLIS_COLUMN,
                    query = query,
                )
            }
        }
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM ({}) AS src", self.query.trim())
    }

    fn sample_sql(&self) -> String {
        format!("SELECT * FROM ({}) AS src LIMIT 1", self.query.trim())
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Build a row from an already-decoded position and cells.
///
/// The first failure wins; the defect keeps the position when it decoded.
pub fn assemble_record(
    position: Result<Position, String>,
    cells: Vec<(String, Result<Value, String>)>,
) -> Row {
    let position = position.map_err(|e| RowDefect::new(None, format!("position: {}", e)))?;
    let mut fields = std::collections::BTreeMap::new();
    for (name, cell) in cells {
        match cell {
            Ok(value) => {
                fields.insert(name, value);
            }
            Err(e) => {
                return Err(RowDefect::new(
                    Some(position),
                    format!("column '{}': {}", name, e),
                ))
            }
        }
    }
    Ok(SourceRecord::new(position, fields))
}

pub struct SqlSource {
    config: SqlSourceConfig,
    pool: PgPool,
}

impl SqlSource {
    /// Create a source with a lazily connecting pool.
    ///
    /// No connection is made until the first query.
    pub fn connect_lazy(config: SqlSourceConfig, url: &str) -> SourceResult<Self> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(url)
            .map_err(|e| SourceError::configuration(format!("invalid database url: {}", e)))?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &SqlSourceConfig {
        &self.config
    }

    fn decode_position(&self, row: &PgRow) -> Result<Position, String> {
        let column = self.config.position_column.as_str();
        match self.config.position_kind {
            PositionKind::Integer => {
                let value = match row.try_get::<Option<i64>, _>(column) {
                    Ok(v) => v,
                    Err(_) => row
                        .try_get::<Option<i32>, _>(column)
                        .map(|v| v.map(i64::from))
                        .map_err(|e| e.to_string())?,
                };
                value.map(Position::new).ok_or_else(|| "null".to_string())
            }
            PositionKind::TimestampMillis => row
                .try_get::<Option<i64>, _>(POSITION_MILLIS_COLUMN)
                .map_err(|e| e.to_string())?
                .map(Position::new)
                .ok_or_else(|| "null".to_string()),
        }
    }

    fn decode_row(&self, row: &PgRow) -> Row {
        let position = self.decode_position(row);
        let cells = self
            .config
            .columns
            .iter()
            .map(|spec| (spec.name.clone(), decode_cell(row, spec)))
            .collect();
        assemble_record(position, cells)
    }
}

fn decode_timestamp(row: &PgRow, column: &str) -> Result<Option<DateTime<Utc>>, String> {
    match row.try_get::<Option<DateTime<Utc>>, _>(column) {
        Ok(v) => Ok(v),
        Err(_) => row
            .try_get::<Option<NaiveDateTime>, _>(column)
            .map(|v| v.map(|naive| Utc.from_utc_datetime(&naive)))
            .map_err(|e| e.to_string()),
    }
}

fn decode_cell(row: &PgRow, spec: &ColumnSpec) -> Result<Value, String> {
    let column = spec.name.as_str();
    let value = match spec.kind {
        ColumnKind::Text => row
            .try_get::<Option<String>, _>(column)
            .map_err(|e| e.to_string())?
            .map(Value::Text),
        ColumnKind::Bool => row
            .try_get::<Option<bool>, _>(column)
            .map_err(|e| e.to_string())?
            .map(Value::Bool),
        ColumnKind::Timestamp => decode_timestamp(row, column)?.map(Value::Timestamp),
        ColumnKind::Number => decode_number(row, column)?.map(Value::Number),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode_number(row: &PgRow, column: &str) -> Result<Option<Decimal>, String> {
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(column) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(column) {
        return Ok(v.map(Decimal::from));
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(column) {
        return Ok(v.map(Decimal::from));
    }
    match row.try_get::<Option<f64>, _>(column) {
        Ok(None) => Ok(None),
        Ok(Some(f)) => Decimal::from_f64(f)
            .map(Some)
            .ok_or_else(|| format!("{} is not a finite decimal", f)),
        Err(e) => Err(e.to_string()),
    }
}

/// Map a driver error onto the source taxonomy.
///
/// Connectivity problems and server-side resource or shutdown conditions
/// are retryable; everything else points at the query or configuration.
fn classify(err: sqlx::Error) -> SourceError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SourceError::unavailable(err.to_string()),
        sqlx::Error::Database(db) => {
            let class = db.code().map(|c| c.chars().take(2).collect::<String>());
            match class.as_deref() {
                Some("08") | Some("53") | Some("57") | Some("40") => {
                    SourceError::unavailable(err.to_string())
                }
                _ => SourceError::configuration(err.to_string()),
            }
        }
        _ => SourceError::configuration(err.to_string()),
    }
}

#[async_trait]
impl RecordSource for SqlSource {
    async fn fetch_rows(&self, after: Position, limit: usize) -> SourceResult<Vec<Row>> {
        let limit = i64::try_from(limit)
            .map_err(|_| SourceError::configuration("batch limit out of range"))?;
        let rows: Vec<PgRow> = sqlx::query(&self.config.fetch_sql())
            .bind(after.value())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        Ok(rows.iter().map(|row| self.decode_row(row)).collect())
    }

    async fn health_check(&self) -> SourceResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn count(&self) -> SourceResult<u64> {
        let n: i64 = sqlx::query_scalar(&self.config.count_sql())
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(n.max(0) as u64)
    }

    async fn describe_fields(&self) -> SourceResult<Option<Vec<String>>> {
        let sample: Option<PgRow> = sqlx::query(&self.config.sample_sql())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        let declared = self.config.column_names();
        let fields = match sample {
            Some(row) => {
                let present: Vec<String> =
                    row.columns().iter().map(|c| c.name().to_string()).collect();
                declared
                    .into_iter()
                    .filter(|name| present.contains(name))
                    .collect()
            }
            None => declared,
        };
        Ok(Some(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SqlSourceConfig {
        SqlSourceConfig {
            url_env: default_url_env(),
            query: "SELECT case_id, case_number, catchword FROM pat_case".to_string(),
            position_column: "case_id".to_string(),
            position_kind: PositionKind::Integer,
            columns: vec![
                ColumnSpec {
                    name: "case_number".to_string(),
                    kind: ColumnKind::Text,
                },
                ColumnSpec {
                    name: "catchword".to_string(),
                    kind: ColumnKind::Text,
                },
            ],
            max_connections: 4,
            acquire_timeout_secs: 10,
        }
    }

    #[test]
    fn test_fetch_sql_wraps_base_query() {
        assert_eq!(
            config().fetch_sql(),
            "SELECT * FROM (SELECT case_id, case_number, catchword FROM pat_case) AS src \
             WHERE src.\"case_id\" > $1 ORDER BY src.\"case_id\" ASC LIMIT $2"
        );
    }

    #[test]
    fn test_timestamp_position_filters_at_millisecond_precision() {
        let mut cfg = config();
        cfg.position_column = "updated_at".to_string();
        cfg.position_kind = PositionKind::TimestampMillis;

        let key = "floor(extract(epoch from src.\"updated_at\") * 1000)::bigint";
        assert_eq!(
            cfg.fetch_sql(),
            format!(
                "SELECT src.*, {key} AS \"chronosync_position_ms\" \
                 FROM (SELECT case_id, case_number, catchword FROM pat_case) AS src \
                 WHERE {key} > $1 ORDER BY {key} ASC LIMIT $2",
                key = key
            )
        );
        // the full-precision column is never compared against the watermark
        assert!(!cfg.fetch_sql().contains("src.\"updated_at\" >"));
        assert!(!cfg.fetch_sql().contains("to_timestamp"));
    }

    #[test]
    fn test_validate_rejects_injection_in_identifiers() {
        let mut cfg = config();
        cfg.position_column = "id; DROP TABLE pat_case".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(SourceError::Configuration { .. })
        ));

        let mut cfg = config();
        cfg.query = "SELECT 1;".to_string();
        assert!(cfg.validate().is_err());

        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_assemble_record() {
        let row = assemble_record(
            Ok(Position::new(7)),
            vec![
                ("case_number".to_string(), Ok(Value::from("P-7"))),
                ("catchword".to_string(), Ok(Value::Null)),
            ],
        )
        .unwrap();
        assert_eq!(row.position(), Position::new(7));
        assert_eq!(row.get("catchword"), Some(&Value::Null));
    }

    #[test]
    fn test_assemble_record_defects() {
        let defect = assemble_record(Err("null".to_string()), vec![]).unwrap_err();
        assert_eq!(defect.position, None);

        let defect = assemble_record(
            Ok(Position::new(8)),
            vec![("hours".to_string(), Err("mismatched types".to_string()))],
        )
        .unwrap_err();
        assert_eq!(defect.position, Some(Position::new(8)));
        assert!(defect.reason.contains("hours"));
    }

    #[test]
    fn test_pool_errors_are_retryable() {
        assert!(classify(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!classify(sqlx::Error::RowNotFound).is_retryable());
    }
}
