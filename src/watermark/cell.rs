//! Single-owner watermark cell
//!
//! Holds the in-memory watermark next to its store. The value in memory
//! only changes after the store has committed it durably.

use crate::observability::{log_event_with_fields, Event};
use crate::position::Position;

use super::errors::{WatermarkError, WatermarkResult};
use super::WatermarkStore;

pub struct WatermarkCell {
    current: Position,
    store: Box<dyn WatermarkStore>,
}

impl WatermarkCell {
    /// Load the persisted watermark once
    pub fn load(store: Box<dyn WatermarkStore>) -> WatermarkResult<Self> {
        let current = store.load()?;
        log_event_with_fields(
            Event::WatermarkLoaded,
            &[("position", &current.to_string())],
        );
        Ok(Self { current, store })
    }

    pub fn current(&self) -> Position {
        self.current
    }

    /// Durably advance to `position`.
    ///
    /// Returns false when `position` equals the current value. A position
    /// below the current value is rejected.
    pub fn advance(&mut self, position: Position) -> WatermarkResult<bool> {
        if position < self.current {
            return Err(WatermarkError::Regression {
                current: self.current,
                attempted: position,
            });
        }
        if position == self.current {
            return Ok(false);
        }

        self.store.commit(position)?;
        let previous = self.current;
        self.current = position;

        log_event_with_fields(
            Event::WatermarkCommitted,
            &[
                ("from", &previous.to_string()),
                ("position", &position.to_string()),
            ],
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::MemoryWatermarkStore;

    #[test]
    fn test_advance_commits_then_updates() {
        let store = MemoryWatermarkStore::new(Position::new(100));
        let mut cell = WatermarkCell::load(Box::new(store.clone())).unwrap();

        assert!(cell.advance(Position::new(103)).unwrap());
        assert_eq!(cell.current(), Position::new(103));
        assert_eq!(store.persisted(), Some(Position::new(103)));
    }

    #[test]
    fn test_equal_is_noop_and_lower_is_regression() {
        let store = MemoryWatermarkStore::with_committed(Position::new(10));
        let mut cell = WatermarkCell::load(Box::new(store.clone())).unwrap();

        assert!(!cell.advance(Position::new(10)).unwrap());
        assert_eq!(store.commits(), 0);

        let err = cell.advance(Position::new(9)).unwrap_err();
        assert!(matches!(err, WatermarkError::Regression { .. }));
        assert_eq!(cell.current(), Position::new(10));
    }

    #[test]
    fn test_failed_commit_leaves_memory_unchanged() {
        let store = MemoryWatermarkStore::new(Position::new(5));
        let mut cell = WatermarkCell::load(Box::new(store.clone())).unwrap();
        store.set_failing(true);

        assert!(cell.advance(Position::new(6)).is_err());
        assert_eq!(cell.current(), Position::new(5));
    }
}
