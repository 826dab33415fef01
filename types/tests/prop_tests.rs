use proptest::prelude::*;

use verikey_types::{CardKey, DailyStats, JobStatus, KeyStatus, Timestamp};

proptest! {
    /// Timestamp ordering mirrors the underlying millisecond ordering.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// elapsed_since never underflows and is exact when now >= then.
    #[test]
    fn timestamp_elapsed_saturating(then in 0u64..u64::MAX, delta in 0u64..1_000_000u64) {
        let start = Timestamp::new(then);
        let now = Timestamp::new(then.saturating_add(delta));
        prop_assert_eq!(start.elapsed_since(now), now.as_millis() - then);
        prop_assert_eq!(now.elapsed_since(start), 0u64);
    }

    /// CardKey bincode roundtrip preserves every field.
    #[test]
    fn card_key_bincode_roundtrip(
        code in "[A-Za-z0-9]{8,24}",
        max_uses in 1u32..100,
        used in 0u32..100,
        expires in proptest::option::of(0u64..u64::MAX / 2),
    ) {
        let mut key = CardKey::new(code, max_uses, Timestamp::new(1));
        key.used_count = used.min(max_uses);
        key.expires_at = expires.map(Timestamp::new);
        let encoded = bincode::serialize(&key).unwrap();
        let decoded: CardKey = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, key);
    }

    /// remaining_uses never underflows, even for corrupt counts.
    #[test]
    fn remaining_uses_saturates(max_uses in 0u32..100, used in 0u32..200) {
        let mut key = CardKey::new("k", max_uses, Timestamp::EPOCH);
        key.used_count = used;
        prop_assert_eq!(key.remaining_uses(), max_uses.saturating_sub(used));
    }

    /// DailyStats totals always equal success + fail.
    #[test]
    fn daily_stats_totals_consistent(outcomes in proptest::collection::vec(any::<bool>(), 0..50)) {
        let mut stats = DailyStats::new("2026-01-01");
        for ok in &outcomes {
            stats.record(*ok);
        }
        prop_assert_eq!(stats.total_count, outcomes.len() as u64);
        prop_assert_eq!(stats.success_count + stats.fail_count, stats.total_count);
    }
}

#[test]
fn status_json_matches_wire_representation() {
    for (status, wire) in [
        (JobStatus::Queued, "\"QUEUED\""),
        (JobStatus::Processing, "\"PROCESSING\""),
        (JobStatus::Pending, "\"PENDING\""),
        (JobStatus::Success, "\"SUCCESS\""),
        (JobStatus::Fail, "\"FAIL\""),
        (JobStatus::Error, "\"ERROR\""),
        (JobStatus::Timeout, "\"TIMEOUT\""),
    ] {
        assert_eq!(serde_json::to_string(&status).unwrap(), wire);
    }
    assert_eq!(
        serde_json::to_string(&KeyStatus::Consumed).unwrap(),
        "\"CONSUMED\""
    );
}
