//! Formula language
//!
//! A small, sandboxed expression language evaluated against a record's
//! field values. Formulas are parsed once and evaluated many times.
//!
//! - Numbers are decimals; arithmetic is checked
//! - Only the built-in functions are callable
//! - Parse-time limits bound text size, nesting depth and node count
//! - Evaluation has no I/O and no access to the clock

mod ast;
mod errors;
mod eval;
mod functions;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use errors::{FormulaError, FormulaResult};
pub use eval::MAX_STRING_BYTES;
pub use functions::MAX_ROUND_DP;
pub use parser::{MAX_DEPTH, MAX_FORMULA_BYTES, MAX_NODES};

use crate::value::{Bindings, Value};

/// A parsed formula ready for evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
    fields: Vec<String>,
}

impl Formula {
    /// Parse formula text
    pub fn parse(text: &str) -> FormulaResult<Self> {
        let expr = parser::parse(text)?;
        let mut fields = Vec::new();
        expr.fields(&mut fields);
        Ok(Self {
            source: text.to_string(),
            expr,
            fields,
        })
    }

    /// Evaluate against the given bindings
    pub fn evaluate(&self, bindings: &dyn Bindings) -> FormulaResult<Value> {
        eval::eval(&self.expr, bindings)
    }

    /// Field names the formula reads, in first-seen order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Original formula text
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// Parse and evaluate in one step
pub fn evaluate(text: &str, bindings: &dyn Bindings) -> FormulaResult<Value> {
    Formula::parse(text)?.evaluate(bindings)
}
