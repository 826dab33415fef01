//! Timestamp type used throughout the pipeline.
//!
//! Timestamps are Unix epoch milliseconds (UTC). Millisecond precision is
//! required because settled jobs record their duration in milliseconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in milliseconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64;
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    /// Milliseconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Whether this timestamp lies strictly before `now`.
    pub fn is_before(&self, now: Timestamp) -> bool {
        self.0 < now.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_saturates_for_future_timestamps() {
        let later = Timestamp::new(5000);
        let earlier = Timestamp::new(1000);
        assert_eq!(earlier.elapsed_since(later), 4000);
        assert_eq!(later.elapsed_since(earlier), 0);
    }

    #[test]
    fn seconds_truncate_milliseconds() {
        assert_eq!(Timestamp::new(1999).as_secs(), 1);
        assert_eq!(Timestamp::new(2000).as_secs(), 2);
    }

    #[test]
    fn is_before_is_strict() {
        let t = Timestamp::new(100);
        assert!(Timestamp::new(99).is_before(t));
        assert!(!t.is_before(t));
    }
}
