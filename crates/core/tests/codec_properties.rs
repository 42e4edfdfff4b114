//! Property tests for the temporal key codecs
//!
//! - Encoded order matches logical order (key-first and timestamp-first)
//! - decode(encode(x)) == x

use proptest::prelude::*;
use tempora_core::{InverseTemporalKey, TemporalKey};

/// Keys biased towards the characters the escaping scheme cares about
fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-c]{0,4}",
        proptest::collection::vec(
            prop_oneof![
                Just('\0'),
                Just('\u{1}'),
                Just('\u{2}'),
                Just('a'),
                Just('z'),
                Just('é'),
            ],
            0..6
        )
        .prop_map(|chars| chars.into_iter().collect()),
        any::<String>(),
    ]
}

fn timestamp_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0u64), Just(u64::MAX), 0u64..1_000, any::<u64>()]
}

proptest! {
    #[test]
    fn temporal_key_round_trip(key in key_strategy(), ts in timestamp_strategy()) {
        let tk = TemporalKey::new(key, ts);
        prop_assert_eq!(TemporalKey::decode(&tk.encode()).unwrap(), tk);
    }

    #[test]
    fn inverse_key_round_trip(key in key_strategy(), ts in timestamp_strategy()) {
        let ik = InverseTemporalKey::new(ts, key);
        prop_assert_eq!(InverseTemporalKey::decode(&ik.encode()).unwrap(), ik);
    }

    #[test]
    fn temporal_key_order_preserved(
        k1 in key_strategy(),
        t1 in timestamp_strategy(),
        k2 in key_strategy(),
        t2 in timestamp_strategy(),
    ) {
        let a = TemporalKey::new(k1, t1);
        let b = TemporalKey::new(k2, t2);
        prop_assert_eq!(a.cmp(&b), a.encode().cmp(&b.encode()));
    }

    #[test]
    fn inverse_key_order_preserved(
        k1 in key_strategy(),
        t1 in timestamp_strategy(),
        k2 in key_strategy(),
        t2 in timestamp_strategy(),
    ) {
        let a = InverseTemporalKey::new(t1, k1);
        let b = InverseTemporalKey::new(t2, k2);
        prop_assert_eq!(a.cmp(&b), a.encode().cmp(&b.encode()));
    }

    #[test]
    fn empty_key_is_scan_lower_bound(key in key_strategy(), ts in 0u64..u64::MAX) {
        let bound = InverseTemporalKey::create_min_inclusive(ts).encode();
        let entry = InverseTemporalKey::new(ts, key.clone()).encode();
        prop_assert!(bound <= entry);
        prop_assert_eq!(bound == entry, key.is_empty());
        prop_assert!(entry < InverseTemporalKey::create_max_exclusive(ts).encode());
    }

    #[test]
    fn decode_never_panics(input in any::<String>()) {
        let _ = TemporalKey::decode(&input);
        let _ = InverseTemporalKey::decode(&input);
    }
}
