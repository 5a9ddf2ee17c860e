//! Source records and batches

use std::collections::BTreeMap;

use crate::position::Position;
use crate::value::{Bindings, Value};

use super::errors::RowDefect;

/// A record read from the source store. Immutable once fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    position: Position,
    fields: BTreeMap<String, Value>,
}

impl SourceRecord {
    pub fn new(position: Position, fields: BTreeMap<String, Value>) -> Self {
        Self { position, fields }
    }

    /// Build a record from `(name, value)` pairs
    pub fn from_pairs<I, K>(position: Position, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let fields = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self { position, fields }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl Bindings for SourceRecord {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// One fetch worth of records, ascending by position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Well-formed records in position order
    pub records: Vec<SourceRecord>,
    /// Malformed rows skipped under the skip integrity policy
    pub skipped: Vec<RowDefect>,
    /// True when the source returned exactly `limit` rows
    pub capped: bool,
    /// Highest position observed, including skipped rows
    pub high: Option<Position>,
}

impl Batch {
    /// True when the source returned no rows at all
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.skipped.is_empty()
    }

    /// Rows returned by the source, well-formed or not
    pub fn rows_seen(&self) -> usize {
        self.records.len() + self.skipped.len()
    }
}
