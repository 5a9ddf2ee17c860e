//! chronosync - incremental record sync connector
//!
//! Reads new records from a practice-management store, derives postings
//! with a small sandboxed formula and template language, delivers them
//! idempotently to a time-tracking target and advances a durable
//! watermark only after confirmed delivery.

pub mod cli;
pub mod config;
pub mod crash_point;
pub mod delivery;
pub mod formula;
pub mod observability;
pub mod position;
pub mod source;
pub mod sync;
pub mod template;
pub mod transform;
pub mod value;
pub mod watermark;
