//! Transformation of source records into postings
//!
//! A `FieldSet` is compiled once at startup; the `Transformer` applies it
//! to each record. Identical record and field set always produce the same
//! canonical posting.

mod errors;
mod fields;
mod posting;
mod transformer;

pub use errors::{EvaluationError, TransformError, TransformResult};
pub use fields::{DerivedField, FieldKind, FieldSet, FieldSpec};
pub use posting::TransformedPosting;
pub use transformer::Transformer;
