//! In-memory delivery target
//!
//! Keeps a ledger keyed by idempotency key. Resubmitting a key with the
//! same fingerprint is acknowledged without a second entry; a different
//! fingerprint under the same key is a permanent conflict. Outcomes can be
//! scripted per position to simulate target failures.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::position::Position;
use crate::transform::TransformedPosting;

use super::{DeliveryOutcome, DeliveryTarget};

#[derive(Debug, Default)]
struct Ledger {
    by_key: BTreeMap<String, TransformedPosting>,
    order: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryTarget {
    ledger: Mutex<Ledger>,
    scripts: Mutex<HashMap<Position, VecDeque<DeliveryOutcome>>>,
    attempts: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next attempt at `position`.
    ///
    /// A scripted `Delivered` still records the posting.
    pub fn script(&self, position: Position, outcome: DeliveryOutcome) {
        lock(&self.scripts)
            .entry(position)
            .or_default()
            .push_back(outcome);
    }

    /// Accepted postings in the order they first arrived
    pub fn delivered(&self) -> Vec<TransformedPosting> {
        let ledger = lock(&self.ledger);
        ledger
            .order
            .iter()
            .filter_map(|key| ledger.by_key.get(key).cloned())
            .collect()
    }

    /// Positions of accepted postings, in arrival order
    pub fn delivered_positions(&self) -> Vec<Position> {
        self.delivered()
            .iter()
            .map(|p| p.source_position)
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        lock(&self.ledger).by_key.contains_key(key)
    }

    /// Every `deliver` call so far, including failed and duplicate ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn accept(&self, posting: &TransformedPosting) -> DeliveryOutcome {
        let mut ledger = lock(&self.ledger);
        match ledger.by_key.get(&posting.idempotency_key) {
            Some(existing) if existing.fingerprint == posting.fingerprint => {
                DeliveryOutcome::Delivered
            }
            Some(_) => DeliveryOutcome::permanent(format!(
                "idempotency key {} already holds different content",
                posting.idempotency_key
            )),
            None => {
                ledger.order.push(posting.idempotency_key.clone());
                ledger
                    .by_key
                    .insert(posting.idempotency_key.clone(), posting.clone());
                DeliveryOutcome::Delivered
            }
        }
    }
}

#[async_trait]
impl DeliveryTarget for MemoryTarget {
    async fn deliver(&self, posting: &TransformedPosting) -> DeliveryOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let scripted = lock(&self.scripts)
            .get_mut(&posting.source_position)
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(DeliveryOutcome::Delivered) | None => self.accept(posting),
            Some(failure) => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn posting(p: i64, note: &str) -> TransformedPosting {
        let mut fields = BTreeMap::new();
        fields.insert("note".to_string(), Value::from(note));
        TransformedPosting::new(format!("k:{}", p), Position::new(p), fields, vec![]).unwrap()
    }

    #[tokio::test]
    async fn test_resubmission_is_deduplicated() {
        let target = MemoryTarget::new();
        assert!(target.deliver(&posting(1, "a")).await.is_delivered());
        assert!(target.deliver(&posting(1, "a")).await.is_delivered());
        assert_eq!(target.delivered().len(), 1);
        assert_eq!(target.attempts(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_content_is_permanent() {
        let target = MemoryTarget::new();
        target.deliver(&posting(1, "a")).await;
        let outcome = target.deliver(&posting(1, "b")).await;
        assert!(matches!(outcome, DeliveryOutcome::PermanentFailure { .. }));
    }

    #[tokio::test]
    async fn test_scripted_outcomes_are_consumed() {
        let target = MemoryTarget::new();
        target.script(Position::new(2), DeliveryOutcome::retryable("503"));

        let first = target.deliver(&posting(2, "x")).await;
        assert!(matches!(first, DeliveryOutcome::RetryableFailure { .. }));
        assert!(!target.contains_key("k:2"));

        assert!(target.deliver(&posting(2, "x")).await.is_delivered());
        assert_eq!(target.delivered_positions(), vec![Position::new(2)]);
    }
}
