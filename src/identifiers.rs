//! Type-safe identifiers.
//!
//! [`ReqSeq`] correlates a request frame with its reply. Values come from a
//! [`ReqSeqGenerator`] owned by one router, so they are strictly increasing
//! for that router's lifetime and never reused.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// ReqSeq
// ============================================================================

/// Client-assigned request sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReqSeq(u64);

impl ReqSeq {
    /// Wraps a raw sequence number.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReqSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ReqSeq {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// ReqSeqGenerator
// ============================================================================

/// Allocates [`ReqSeq`] values starting at 1.
#[derive(Debug, Default)]
pub struct ReqSeqGenerator {
    last: AtomicU64,
}

impl ReqSeqGenerator {
    /// Creates a generator whose first value is 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence number.
    #[inline]
    pub fn next(&self) -> ReqSeq {
        ReqSeq(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_first_value_is_one() {
        let generator = ReqSeqGenerator::new();
        assert_eq!(generator.next(), ReqSeq::new(1));
        assert_eq!(generator.next(), ReqSeq::new(2));
    }

    #[test]
    fn test_display() {
        assert_eq!(ReqSeq::new(42).to_string(), "42");
    }

    #[test]
    fn test_generators_are_independent() {
        let a = ReqSeqGenerator::new();
        let b = ReqSeqGenerator::new();
        a.next();
        a.next();
        assert_eq!(b.next(), ReqSeq::new(1));
    }

    proptest! {
        #[test]
        fn prop_strictly_increasing(count in 1usize..500) {
            let generator = ReqSeqGenerator::new();
            let values: Vec<ReqSeq> = (0..count).map(|_| generator.next()).collect();
            for pair in values.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
