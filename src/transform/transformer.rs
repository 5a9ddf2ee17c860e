//! Record → posting transformation
//!
//! Fields are evaluated in declaration order. Each field sees the record's
//! own fields plus every derived field produced before it.

use std::collections::BTreeMap;

use rust_decimal::RoundingStrategy;

use crate::observability::{log_event_at, Event, Severity};
use crate::source::SourceRecord;
use crate::value::{Layered, Value};

use super::errors::{EvaluationError, TransformError, TransformResult};
use super::fields::{DerivedField, FieldKind, FieldSet};
use super::posting::TransformedPosting;

#[derive(Debug, Clone)]
pub struct Transformer {
    fields: FieldSet,
    key_prefix: String,
}

impl Transformer {
    pub fn new(fields: FieldSet, key_prefix: impl Into<String>) -> Self {
        Self {
            fields,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn field_set(&self) -> &FieldSet {
        &self.fields
    }

    /// Idempotency key for a record: `{key_prefix}:{position}`
    pub fn idempotency_key(&self, record: &SourceRecord) -> String {
        format!("{}:{}", self.key_prefix, record.position())
    }

    pub fn transform(&self, record: &SourceRecord) -> TransformResult<TransformedPosting> {
        let mut derived: BTreeMap<String, Value> = BTreeMap::new();
        let mut omitted = Vec::new();

        for field in self.fields.fields() {
            if record.get(&field.name).is_some() {
                return Err(TransformError::Shadowed {
                    field: field.name.clone(),
                });
            }

            match evaluate_field(field, &derived, record) {
                Ok(value) => {
                    derived.insert(field.name.clone(), value);
                }
                Err(source) if field.required => {
                    return Err(TransformError::Field {
                        field: field.name.clone(),
                        source,
                    });
                }
                Err(reason) => {
                    log_event_at(
                        Severity::Trace,
                        Event::FieldOmitted,
                        &[
                            ("field", &field.name),
                            ("position", &record.position().to_string()),
                            ("code", reason.code()),
                        ],
                    );
                    omitted.push(field.name.clone());
                }
            }
        }

        TransformedPosting::new(
            self.idempotency_key(record),
            record.position(),
            derived,
            omitted,
        )
    }
}

fn evaluate_field(
    field: &DerivedField,
    derived: &BTreeMap<String, Value>,
    record: &SourceRecord,
) -> Result<Value, EvaluationError> {
    let bindings = Layered::new(derived, record);
    let value = match &field.kind {
        FieldKind::Formula(formula) => formula.evaluate(&bindings)?,
        FieldKind::Template(template) => Value::Text(template.render(&bindings)?),
    };

    match (field.scale, value) {
        (None, value) => Ok(value),
        (Some(dp), Value::Number(n)) => Ok(Value::Number(
            n.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        )),
        (Some(_), other) => Err(EvaluationError::Scale {
            found: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaError;
    use crate::position::Position;
    use crate::transform::FieldSpec;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Value {
        Value::Number(Decimal::from_str(s).unwrap())
    }

    fn transformer(specs: &[FieldSpec]) -> Transformer {
        Transformer::new(FieldSet::compile(specs).unwrap(), "billing")
    }

    fn record(p: i64, pairs: Vec<(&str, Value)>) -> SourceRecord {
        SourceRecord::from_pairs(Position::new(p), pairs)
    }

    #[test]
    fn test_markup_and_key() {
        let t = transformer(&[FieldSpec::formula("billed", "amount * 1.1")]);
        let posting = t.transform(&record(101, vec![("amount", dec("10"))])).unwrap();
        assert_eq!(posting.idempotency_key, "billing:101");
        assert_eq!(posting.get("billed"), Some(&dec("11")));
        assert_eq!(posting.source_position, Position::new(101));
    }

    #[test]
    fn test_later_fields_read_earlier_ones() {
        let t = transformer(&[
            FieldSpec::formula("fee", "rate * hours").with_scale(2),
            FieldSpec::template("narrative", "${case_number}: ${fee}"),
        ]);
        let posting = t
            .transform(&record(
                7,
                vec![
                    ("rate", dec("123.45")),
                    ("hours", dec("0.25")),
                    ("case_number", Value::from("P-7")),
                ],
            ))
            .unwrap();
        assert_eq!(posting.get("fee"), Some(&dec("30.86")));
        assert_eq!(posting.get("narrative"), Some(&Value::from("P-7: 30.86")));
    }

    #[test]
    fn test_scale_rounds_half_up() {
        let t = transformer(&[FieldSpec::formula("x", "v").with_scale(1)]);
        let posting = t.transform(&record(1, vec![("v", dec("0.25"))])).unwrap();
        assert_eq!(posting.get("x").map(|v| v.render()), Some("0.3".to_string()));
    }

    #[test]
    fn test_required_failure_is_field_error() {
        let t = transformer(&[FieldSpec::formula("fee", "rate * hours")]);
        let err = t.transform(&record(1, vec![("rate", dec("100"))])).unwrap_err();
        assert_eq!(
            err,
            TransformError::Field {
                field: "fee".into(),
                source: FormulaError::UnknownField("hours".into()).into(),
            }
        );
    }

    #[test]
    fn test_optional_failure_is_omitted() {
        let t = transformer(&[
            FieldSpec::formula("fee", "rate * hours").optional(),
            FieldSpec::template("narrative", "${case_number}"),
        ]);
        let posting = t
            .transform(&record(
                1,
                vec![("rate", dec("100")), ("case_number", Value::from("P-1"))],
            ))
            .unwrap();
        assert_eq!(posting.omitted, vec!["fee".to_string()]);
        assert!(posting.get("fee").is_none());
        assert_eq!(posting.get("narrative"), Some(&Value::from("P-1")));
    }

    #[test]
    fn test_shadowing_source_field_is_error() {
        let t = transformer(&[FieldSpec::formula("amount", "1")]);
        let err = t.transform(&record(1, vec![("amount", dec("5"))])).unwrap_err();
        assert!(matches!(err, TransformError::Shadowed { .. }));
    }

    #[test]
    fn test_scale_on_text_is_error() {
        let t = transformer(&[FieldSpec::template("n", "${a}").with_scale(2)]);
        let err = t.transform(&record(1, vec![("a", Value::from("x"))])).unwrap_err();
        assert!(matches!(
            err,
            TransformError::Field {
                source: EvaluationError::Scale { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let t = transformer(&[FieldSpec::formula("billed", "round(amount * 1.175, 2)")]);
        let r = record(3, vec![("amount", dec("19.99"))]);
        let a = t.transform(&r).unwrap();
        let b = t.transform(&r).unwrap();
        assert_eq!(a.canonical_json().unwrap(), b.canonical_json().unwrap());
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
