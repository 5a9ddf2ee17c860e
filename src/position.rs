//! Position - Totally ordered source cursor
//!
//! A position is either an auto-increment id or a timestamp encoded as
//! epoch milliseconds. The engine never interprets it beyond ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A totally ordered position in the source store.
///
/// The watermark is a position meaning "everything up to and including
/// this position has been delivered".
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(i64);

impl Position {
    /// Lowest position a fresh connector starts from by default
    pub const ZERO: Position = Position(0);

    #[inline]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[inline]
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for Position {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ordering() {
        assert!(Position::new(100) < Position::new(101));
        assert!(Position::new(-1) < Position::ZERO);
        assert_eq!(Position::from(7), Position::new(7));
    }

    #[test]
    fn test_position_serializes_as_integer() {
        let json = serde_json::to_string(&Position::new(103)).unwrap();
        assert_eq!(json, "103");
        let back: Position = serde_json::from_str("103").unwrap();
        assert_eq!(back, Position::new(103));
    }
}
