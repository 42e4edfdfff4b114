//! Property tests for key-set modification determinism

use proptest::prelude::*;
use std::collections::BTreeSet;
use tempora_core::KeySetModifications;

proptest! {
    #[test]
    fn key_set_latest_entry_wins(ops in proptest::collection::vec(any::<bool>(), 1..20)) {
        // true = put, false = tombstone; applied in order to the same key
        let mut mods = KeySetModifications::new();
        for &is_put in &ops {
            if is_put {
                mods.record_addition("k");
            } else {
                mods.record_removal("k");
            }
        }
        let last = *ops.last().unwrap();
        prop_assert_eq!(mods.additions().contains("k"), last);
        prop_assert_eq!(mods.removals().contains("k"), !last);

        let mut base: BTreeSet<String> = BTreeSet::new();
        mods.apply(&mut base);
        prop_assert_eq!(base.contains("k"), last);
    }
}
