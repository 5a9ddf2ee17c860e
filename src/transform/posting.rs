//! Transformed postings
//!
//! A posting is the target-ready form of one source record. Its
//! fingerprint is the SHA-256 of its canonical JSON: keys sorted, numbers
//! as decimal strings, no whitespace.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::position::Position;
use crate::value::Value;

use super::errors::{TransformError, TransformResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedPosting {
    pub idempotency_key: String,
    pub source_position: Position,
    pub fingerprint: String,
    pub fields: BTreeMap<String, Value>,
    /// Optional fields that could not be produced
    #[serde(skip)]
    pub omitted: Vec<String>,
}

#[derive(Serialize)]
struct Canonical<'a> {
    fields: &'a BTreeMap<String, Value>,
    idempotency_key: &'a str,
    omitted: &'a [String],
    source_position: Position,
}

impl TransformedPosting {
    /// Build a posting and compute its fingerprint
    pub fn new(
        idempotency_key: String,
        source_position: Position,
        fields: BTreeMap<String, Value>,
        omitted: Vec<String>,
    ) -> TransformResult<Self> {
        let canonical = canonical_json(&idempotency_key, source_position, &fields, &omitted)?;
        Ok(Self {
            fingerprint: fingerprint(&canonical),
            idempotency_key,
            source_position,
            fields,
            omitted,
        })
    }

    /// Canonical JSON of the posting content
    pub fn canonical_json(&self) -> TransformResult<String> {
        canonical_json(
            &self.idempotency_key,
            self.source_position,
            &self.fields,
            &self.omitted,
        )
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

fn canonical_json(
    idempotency_key: &str,
    source_position: Position,
    fields: &BTreeMap<String, Value>,
    omitted: &[String],
) -> TransformResult<String> {
    let canonical = Canonical {
        fields,
        idempotency_key,
        omitted,
        source_position,
    };
    serde_json::to_string(&canonical).map_err(|e| TransformError::Encoding(e.to_string()))
}

fn fingerprint(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn posting(amount: &str) -> TransformedPosting {
        let mut fields = BTreeMap::new();
        fields.insert(
            "amount".to_string(),
            Value::Number(Decimal::from_str(amount).unwrap()),
        );
        fields.insert("narrative".to_string(), Value::from("P-1: drafting"));
        TransformedPosting::new("cases:101".into(), Position::new(101), fields, vec![]).unwrap()
    }

    #[test]
    fn test_canonical_json_is_sorted() {
        let p = posting("11.0");
        assert_eq!(
            p.canonical_json().unwrap(),
            r#"{"fields":{"amount":"11.0","narrative":"P-1: drafting"},"idempotency_key":"cases:101","omitted":[],"source_position":101}"#
        );
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        assert_eq!(posting("11.0").fingerprint, posting("11.0").fingerprint);
        assert_ne!(posting("11.0").fingerprint, posting("11.1").fingerprint);
        assert_eq!(posting("11.0").fingerprint.len(), 64);
    }

    #[test]
    fn test_wire_body() {
        let body = serde_json::to_value(posting("22")).unwrap();
        assert_eq!(body["idempotency_key"], "cases:101");
        assert_eq!(body["source_position"], 101);
        assert_eq!(body["fields"]["amount"], "22");
        assert!(body.get("omitted").is_none());
    }
}
