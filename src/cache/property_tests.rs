//! Property-Based Tests for Cache Module
//!
//! Uses proptest against the `CachePort` implementation, driving the async
//! calls with `tokio_test::block_on`.

use proptest::prelude::*;
use std::collections::HashSet;

use crate::cache::{pattern_matches, CachePort, MemoryCache};

// == Strategies ==
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}:(list:)?[a-z0-9]{1,8}".prop_map(|s| s)
}

fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,64}".prop_map(|s| s)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // A value written and read back within its TTL is unchanged.
    #[test]
    fn prop_roundtrip_within_ttl(key in valid_key_strategy(), value in valid_value_strategy()) {
        let cache = MemoryCache::new();
        let read = tokio_test::block_on(async {
            cache.set(&key, value.clone(), 300).await.unwrap();
            cache.get(&key).await.unwrap()
        });
        prop_assert_eq!(read, Some(value));
    }

    // Pattern deletion removes exactly the keys the pattern matches.
    #[test]
    fn prop_delete_by_pattern_is_exact(
        keys in prop::collection::hash_set(valid_key_strategy(), 1..30),
        prefix in "[a-z]{1,6}",
    ) {
        let cache = MemoryCache::new();
        let pattern = format!("{}:list:*", prefix);
        let expected_removed: HashSet<&String> =
            keys.iter().filter(|k| pattern_matches(&pattern, k)).collect();

        let removed = tokio_test::block_on(async {
            for key in &keys {
                cache.set(key, "v".to_string(), 300).await.unwrap();
            }
            cache.delete_by_pattern(&pattern).await.unwrap()
        });

        prop_assert_eq!(removed as usize, expected_removed.len());
        for key in &keys {
            let present = tokio_test::block_on(cache.contains(key));
            prop_assert_eq!(present, !expected_removed.contains(key));
        }
    }
}
