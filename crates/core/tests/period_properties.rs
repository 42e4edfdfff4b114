//! Property tests for Period laws

use proptest::prelude::*;
use tempora_core::{Period, TemporaError};

fn period_strategy() -> impl Strategy<Value = Period> {
    prop_oneof![
        Just(Period::eternal()),
        (0u64..1_000).prop_map(|l| Period::create_open_ended_range(l).unwrap()),
        (0u64..1_000, 1u64..1_000).prop_map(|(l, len)| Period::create_range(l, l + len).unwrap()),
    ]
}

proptest! {
    #[test]
    fn empty_contains_nothing(p in period_strategy()) {
        prop_assert!(!Period::empty().contains_period(&p));
        prop_assert!(!Period::empty().contains_period(&Period::empty()));
        prop_assert!(!Period::empty().overlaps(&p));
    }

    #[test]
    fn eternal_contains_every_non_empty_period(p in period_strategy()) {
        prop_assert!(Period::eternal().contains_period(&p));
    }

    #[test]
    fn set_upper_bound_at_or_below_lower_fails(p in period_strategy(), delta in 0u64..10) {
        let requested = p.lower_bound().saturating_sub(delta);
        let is_invalid_period = matches!(
            p.set_upper_bound(requested),
            Err(TemporaError::InvalidPeriod { .. })
        );
        prop_assert!(is_invalid_period);
    }

    #[test]
    fn never_adjacent_to_itself(p in period_strategy()) {
        prop_assert!(!p.is_adjacent_to(&p));
    }

    #[test]
    fn adjacency_excludes_overlap(a in period_strategy(), b in period_strategy()) {
        if a.is_adjacent_to(&b) {
            prop_assert!(!a.overlaps(&b));
            prop_assert!(b.is_adjacent_to(&a));
        }
    }

    #[test]
    fn trimming_keeps_lower_bound(p in period_strategy(), cut in 1u64..1_000) {
        let requested = p.lower_bound() + cut;
        if requested <= p.upper_bound() {
            let trimmed = p.set_upper_bound(requested).unwrap();
            prop_assert_eq!(trimmed.lower_bound(), p.lower_bound());
            prop_assert_eq!(trimmed.length(), cut);
            prop_assert!(p.contains_period(&trimmed));
        }
    }
}
