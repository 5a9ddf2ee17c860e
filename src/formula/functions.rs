//! Built-in formula functions
//!
//! The table is closed: formulas cannot reach anything not listed here.
//! All functions are pure.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::value::Value;

use super::errors::{FormulaError, FormulaResult};
use super::eval::bounded_text;

/// Highest number of decimal places `round` accepts
pub const MAX_ROUND_DP: u32 = 28;

#[derive(Debug, Clone, Copy)]
enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }

    fn describe(&self) -> String {
        match *self {
            Arity::Exact(k) => k.to_string(),
            Arity::AtLeast(k) => format!("at least {}", k),
        }
    }
}

const FUNCTIONS: &[(&str, Arity)] = &[
    ("round", Arity::Exact(2)),
    ("floor", Arity::Exact(1)),
    ("ceil", Arity::Exact(1)),
    ("abs", Arity::Exact(1)),
    ("min", Arity::AtLeast(1)),
    ("max", Arity::AtLeast(1)),
    ("if", Arity::Exact(3)),
    ("coalesce", Arity::AtLeast(1)),
    ("upper", Arity::Exact(1)),
    ("lower", Arity::Exact(1)),
    ("trim", Arity::Exact(1)),
    ("len", Arity::Exact(1)),
    ("text", Arity::Exact(1)),
    ("date", Arity::Exact(1)),
];

/// Validate a call at parse time: the function must exist and accept
/// `argc` arguments.
pub fn check_call(name: &str, argc: usize) -> FormulaResult<()> {
    let (_, arity) = FUNCTIONS
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;

    if !arity.accepts(argc) {
        return Err(FormulaError::Arity {
            name: name.to_string(),
            expected: arity.describe(),
            found: argc,
        });
    }
    Ok(())
}

/// Names of all built-in functions
pub fn names() -> impl Iterator<Item = &'static str> {
    FUNCTIONS.iter().map(|(n, _)| *n)
}

/// Apply an eagerly evaluated function. `if` and `coalesce` are lazy and
/// handled by the evaluator.
pub fn apply(name: &str, args: Vec<Value>) -> FormulaResult<Value> {
    match name {
        "round" => {
            let x = number(name, &args[0])?;
            let dp = decimal_places(&args[1])?;
            Ok(Value::Number(
                x.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
            ))
        }
        "floor" => Ok(Value::Number(number(name, &args[0])?.floor())),
        "ceil" => Ok(Value::Number(number(name, &args[0])?.ceil())),
        "abs" => Ok(Value::Number(number(name, &args[0])?.abs())),
        "min" | "max" => {
            let mut best = number(name, &args[0])?;
            for arg in &args[1..] {
                let n = number(name, arg)?;
                let better = if name == "min" { n < best } else { n > best };
                if better {
                    best = n;
                }
            }
            Ok(Value::Number(best))
        }
        "upper" => bounded_text(text(name, &args[0])?.to_uppercase()),
        "lower" => bounded_text(text(name, &args[0])?.to_lowercase()),
        "trim" => bounded_text(text(name, &args[0])?.trim().to_string()),
        "len" => Ok(Value::Number(Decimal::from(
            text(name, &args[0])?.chars().count() as u64,
        ))),
        "text" => match &args[0] {
            Value::Null => Err(FormulaError::mismatch("text", "null")),
            other => bounded_text(other.render()),
        },
        "date" => match &args[0] {
            Value::Timestamp(ts) => Ok(Value::Text(ts.format("%Y-%m-%d").to_string())),
            other => Err(FormulaError::mismatch("date", other.type_name())),
        },
        other => Err(FormulaError::UnknownFunction(other.to_string())),
    }
}

fn number(function: &str, value: &Value) -> FormulaResult<Decimal> {
    value
        .as_number()
        .ok_or_else(|| FormulaError::mismatch(function, value.type_name()))
}

fn text<'a>(function: &str, value: &'a Value) -> FormulaResult<&'a str> {
    value
        .as_text()
        .ok_or_else(|| FormulaError::mismatch(function, value.type_name()))
}

fn decimal_places(value: &Value) -> FormulaResult<u32> {
    let n = number("round", value)?;
    if n.fract() != Decimal::ZERO || n < Decimal::ZERO || n > Decimal::from(MAX_ROUND_DP) {
        return Err(FormulaError::mismatch(
            "round",
            format!("decimal places {}", n),
        ));
    }
    n.to_u32()
        .ok_or_else(|| FormulaError::mismatch("round", format!("decimal places {}", n)))
}
