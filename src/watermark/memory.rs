//! In-memory watermark store
//!
//! Clones share state, so a test can hand one clone to the coordinator
//! and inspect another.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::position::Position;

use super::errors::{WatermarkError, WatermarkResult};
use super::WatermarkStore;

#[derive(Debug, Default)]
struct Shared {
    persisted: Mutex<Option<Position>>,
    failing: AtomicBool,
    commits: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct MemoryWatermarkStore {
    shared: Arc<Shared>,
    initial: Position,
}

impl MemoryWatermarkStore {
    pub fn new(initial: Position) -> Self {
        Self {
            shared: Arc::default(),
            initial,
        }
    }

    /// Store that already holds a committed position
    pub fn with_committed(position: Position) -> Self {
        let store = Self::new(Position::ZERO);
        *store.slot() = Some(position);
        store
    }

    /// Make every following load and commit fail
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    /// Last committed position, `None` before the first commit
    pub fn persisted(&self) -> Option<Position> {
        *self.slot()
    }

    /// Number of successful commits
    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Position>> {
        self.shared
            .persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> WatermarkResult<()> {
        if self.shared.failing.load(Ordering::SeqCst) {
            return Err(WatermarkError::Unavailable(
                "simulated persistence fault".to_string(),
            ));
        }
        Ok(())
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn load(&self) -> WatermarkResult<Position> {
        self.check()?;
        Ok(self.slot().unwrap_or(self.initial))
    }

    fn commit(&self, position: Position) -> WatermarkResult<()> {
        self.check()?;
        *self.slot() = Some(position);
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let store = MemoryWatermarkStore::new(Position::new(100));
        let handle = store.clone();
        assert_eq!(store.load().unwrap(), Position::new(100));

        store.commit(Position::new(103)).unwrap();
        assert_eq!(handle.persisted(), Some(Position::new(103)));
        assert_eq!(handle.commits(), 1);
    }

    #[test]
    fn test_failure_switch() {
        let store = MemoryWatermarkStore::new(Position::ZERO);
        store.set_failing(true);
        assert!(store.commit(Position::new(1)).is_err());
        assert!(store.load().is_err());
        assert_eq!(store.persisted(), None);
    }
}
