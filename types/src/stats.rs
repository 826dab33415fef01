//! Daily aggregate counters, keyed by UTC calendar day.

use serde::{Deserialize, Serialize};

/// Success/fail/total counts for one UTC day (`date` = "YYYY-MM-DD").
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: String,
    pub success_count: u64,
    pub fail_count: u64,
    pub total_count: u64,
}

impl DailyStats {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            success_count: 0,
            fail_count: 0,
            total_count: 0,
        }
    }

    /// Record one settled outcome.
    pub fn record(&mut self, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.fail_count += 1;
        }
        self.total_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_splits_success_and_fail() {
        let mut stats = DailyStats::new("2026-08-06");
        stats.record(true);
        stats.record(false);
        stats.record(false);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.fail_count, 2);
        assert_eq!(stats.total_count, 3);
    }
}
