//! Transform determinism tests
//!
//! The same record and field set must always produce the same posting,
//! byte for byte, so that resubmissions after a crash carry the same
//! idempotency key and fingerprint.

use std::str::FromStr;

use chrono::{TimeZone, Utc};
use chronosync::position::Position;
use chronosync::source::SourceRecord;
use chronosync::transform::{FieldSet, FieldSpec, TransformError, Transformer};
use chronosync::value::Value;
use rust_decimal::Decimal;

fn dec(s: &str) -> Value {
    Value::Number(Decimal::from_str(s).unwrap())
}

fn billing_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::formula("amount", "rate * hours").with_scale(2),
        FieldSpec::formula("billed", "round(amount * (1 - discount), 2)"),
        FieldSpec::template("narrative", "${matter}: ${description} (${hours}h)"),
        FieldSpec::template("reference", "${invoice?}").optional(),
    ]
}

fn transformer() -> Transformer {
    Transformer::new(FieldSet::compile(&billing_fields()).unwrap(), "clio")
}

fn activity(position: i64) -> SourceRecord {
    SourceRecord::from_pairs(
        Position::new(position),
        [
            ("rate", dec("275.00")),
            ("hours", dec("1.25")),
            ("discount", dec("0.10")),
            ("matter", Value::from("Smith v Jones")),
            ("description", Value::from("Draft motion")),
            (
                "performed_at",
                Value::Timestamp(Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap()),
            ),
        ],
    )
}

#[test]
fn test_same_record_same_posting() {
    let a = transformer().transform(&activity(101)).unwrap();
    let b = transformer().transform(&activity(101)).unwrap();

    assert_eq!(a, b);
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.canonical_json().unwrap(), b.canonical_json().unwrap());
    assert_eq!(a.idempotency_key, "clio:101");
}

#[test]
fn test_derived_values() {
    let posting = transformer().transform(&activity(7)).unwrap();

    assert_eq!(posting.get("amount"), Some(&dec("343.75")));
    assert_eq!(posting.get("billed"), Some(&dec("309.38")));
    assert_eq!(
        posting.get("narrative"),
        Some(&Value::from("Smith v Jones: Draft motion (1.25h)"))
    );
    // optional template with an absent optional placeholder renders empty
    assert_eq!(posting.get("reference"), Some(&Value::from("")));
}

#[test]
fn test_fingerprint_changes_with_content_not_identity() {
    let t = transformer();
    let base = t.transform(&activity(5)).unwrap();

    let original = activity(5);
    let changed = SourceRecord::from_pairs(
        original.position(),
        original
            .fields()
            .iter()
            .map(|(k, v)| {
                let v = if k == "hours" { dec("1.50") } else { v.clone() };
                (k.clone(), v)
            })
            .collect::<Vec<_>>(),
    );
    let edited = t.transform(&changed).unwrap();

    assert_eq!(base.idempotency_key, edited.idempotency_key);
    assert_ne!(base.fingerprint, edited.fingerprint);
}

#[test]
fn test_field_declaration_order_does_not_change_json_order() {
    let reordered = vec![
        FieldSpec::template("narrative", "${matter}: ${description} (${hours}h)"),
        FieldSpec::formula("amount", "rate * hours").with_scale(2),
        FieldSpec::formula("billed", "round(amount * (1 - discount), 2)"),
        FieldSpec::template("reference", "${invoice?}").optional(),
    ];
    let other = Transformer::new(FieldSet::compile(&reordered).unwrap(), "clio");

    let a = transformer().transform(&activity(9)).unwrap();
    let b = other.transform(&activity(9)).unwrap();
    assert_eq!(a.canonical_json().unwrap(), b.canonical_json().unwrap());
}

#[test]
fn test_canonical_json_shape() {
    let posting = transformer().transform(&activity(3)).unwrap();
    let json = posting.canonical_json().unwrap();

    assert!(json.starts_with(r#"{"fields":{"amount":"343.75","#));
    assert!(json.contains(r#""idempotency_key":"clio:3""#));
    assert!(json.ends_with(r#""source_position":3}"#));
    assert_eq!(posting.fingerprint.len(), 64);
}

#[test]
fn test_missing_required_input_is_record_error() {
    let record = SourceRecord::from_pairs(
        Position::new(11),
        [("rate", dec("100")), ("matter", Value::from("M-1"))],
    );
    let err = transformer().transform(&record).unwrap_err();

    assert!(err.is_record_level());
    match err {
        TransformError::Field { field, .. } => assert_eq!(field, "amount"),
        other => panic!("unexpected error {:?}", other),
    }
}
