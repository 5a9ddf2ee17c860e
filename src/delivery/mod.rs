//! Delivery of postings to the time-tracking service
//!
//! Every attempt ends in a `DeliveryOutcome`; nothing here retries. Retry
//! policy belongs to the sync coordinator. Every request carries the
//! posting's idempotency key, so resubmission is always safe.

mod classify;
mod errors;
mod http;
mod memory;

pub use classify::{
    classify_status, conflict_outcome, outcome_for_status, parse_retry_after, StatusClass,
};
pub use errors::{DeliveryError, DeliveryResult};
pub use http::{HttpTarget, HttpTargetConfig};
pub use memory::MemoryTarget;

use std::time::Duration;

use async_trait::async_trait;

use crate::transform::TransformedPosting;

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The target holds the posting
    Delivered,
    /// Expected to succeed later; the batch is retried from the watermark
    RetryableFailure {
        reason: String,
        retry_after: Option<Duration>,
    },
    /// Will not succeed without intervention
    PermanentFailure { reason: String },
}

impl DeliveryOutcome {
    pub fn retryable(reason: impl Into<String>) -> Self {
        DeliveryOutcome::RetryableFailure {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        DeliveryOutcome::PermanentFailure {
            reason: reason.into(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Write capability towards the target service
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    async fn deliver(&self, posting: &TransformedPosting) -> DeliveryOutcome;
}
