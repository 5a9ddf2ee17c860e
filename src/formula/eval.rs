//! Tree-walking formula interpreter

use std::cmp::Ordering;

use rust_decimal::Decimal;

use crate::value::{Bindings, Value};

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::errors::{FormulaError, FormulaResult};
use super::functions;

/// Longest string a formula may produce, in bytes
pub const MAX_STRING_BYTES: usize = 64 * 1024;

/// Evaluate a parsed expression against the given bindings
pub fn eval(expr: &Expr, bindings: &dyn Bindings) -> FormulaResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Text(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Field(name) => bindings
            .lookup(name)
            .cloned()
            .ok_or_else(|| FormulaError::UnknownField(name.clone())),
        Expr::Unary(op, inner) => unary(*op, eval(inner, bindings)?),
        Expr::Binary(op, left, right) => {
            let l = eval(left, bindings)?;
            let r = eval(right, bindings)?;
            binary(*op, l, r)
        }
        Expr::Call(name, args) => call(name, args, bindings),
    }
}

fn call(name: &str, args: &[Expr], bindings: &dyn Bindings) -> FormulaResult<Value> {
    match name {
        "if" => match eval(&args[0], bindings)? {
            Value::Bool(true) => eval(&args[1], bindings),
            Value::Bool(false) => eval(&args[2], bindings),
            other => Err(FormulaError::mismatch("if condition", other.type_name())),
        },
        "coalesce" => {
            for arg in args {
                let value = eval(arg, bindings)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
        _ => {
            let values = args
                .iter()
                .map(|a| eval(a, bindings))
                .collect::<FormulaResult<Vec<_>>>()?;
            functions::apply(name, values)
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> FormulaResult<Value> {
    match (op, value) {
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, other) => Err(FormulaError::mismatch("unary '-'", other.type_name())),
        (UnaryOp::Not, other) => Err(FormulaError::mismatch("'!'", other.type_name())),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> FormulaResult<Value> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, &left, &right)
        }
        BinaryOp::Concat => concat(&left, &right),
        BinaryOp::Eq => equals(&left, &right).map(Value::Bool),
        BinaryOp::Ne => equals(&left, &right).map(|eq| Value::Bool(!eq)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(op, &left, &right)?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> FormulaResult<Value> {
    let (a, b) = match (left, right) {
        (Value::Number(a), Value::Number(b)) => (*a, *b),
        _ => {
            return Err(FormulaError::mismatch(
                format!("'{}'", op.symbol()),
                format!("{} and {}", left.type_name(), right.type_name()),
            ))
        }
    };

    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b.is_zero() {
        return Err(FormulaError::DivisionByZero);
    }

    let result: Option<Decimal> = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        _ => a.checked_rem(b),
    };

    result
        .map(Value::Number)
        .ok_or_else(|| FormulaError::Overflow(format!("'{}'", op.symbol())))
}

fn concat(left: &Value, right: &Value) -> FormulaResult<Value> {
    if left.is_null() || right.is_null() {
        return Err(FormulaError::mismatch(
            "'&'",
            format!("{} and {}", left.type_name(), right.type_name()),
        ));
    }
    let mut out = left.render();
    out.push_str(&right.render());
    bounded_text(out)
}

/// Every string a formula produces goes through here
pub(super) fn bounded_text(out: String) -> FormulaResult<Value> {
    if out.len() > MAX_STRING_BYTES {
        return Err(FormulaError::LimitExceeded(format!(
            "string result longer than {} bytes",
            MAX_STRING_BYTES
        )));
    }
    Ok(Value::Text(out))
}

fn equals(left: &Value, right: &Value) -> FormulaResult<bool> {
    match (left, right) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Number(a), Value::Number(b)) => Ok(a == b),
        (Value::Text(a), Value::Text(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a == b),
        _ => Err(FormulaError::mismatch(
            "'=='",
            format!("{} and {}", left.type_name(), right.type_name()),
        )),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> FormulaResult<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a.cmp(b)),
        _ => Err(FormulaError::mismatch(
            format!("'{}'", op.symbol()),
            format!("{} and {}", left.type_name(), right.type_name()),
        )),
    }
}
