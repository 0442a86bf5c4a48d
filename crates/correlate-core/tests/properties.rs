//! Property-based coverage of the universal invariants over random small
//! datasets. Follows the workspace's `proptest_config()` convention: cases
//! and seed are overridable via `PROPTEST_CASES`/`PROPTEST_SEED`, and
//! failure persistence is disabled to keep integration-test runs quiet.

use std::collections::HashSet;

use correlate_core::{str_to_keys_default, CorrelateOptions, Dataset, Engine};
use proptest::prelude::*;
use proptest::test_runner::{Config, RngSeed};

fn proptest_config() -> Config {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(256);

    let mut config = Config::with_cases(cases);
    config.failure_persistence = None;

    if let Some(seed) = std::env::var("PROPTEST_SEED")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.rng_seed = RngSeed::Fixed(seed);
    }

    config
}

/// A small (key, value) mapping: `key` and `value` are drawn from a tiny
/// alphabet so datasets overlap often enough to exercise real candidates.
fn mapping() -> impl Strategy<Value = (String, String)> {
    (0..4usize, 0..4usize).prop_map(|(k, v)| (format!("k{k}"), format!("v{v}")))
}

fn mappings() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(mapping(), 1..10)
}

fn minimum_score() -> impl Strategy<Value = f64> {
    (0..20u32).prop_map(|n| f64::from(n) / 10.0)
}

fn build_dataset(id: &'static str, mappings: &[(String, String)]) -> Dataset<String> {
    let mut dataset: Dataset<String> = Dataset::new(id, 1.0);
    for (key, value) in mappings {
        dataset.set(key.clone(), value.clone(), None);
    }
    dataset
}

fn distinct_values(mappings: &[(String, String)]) -> HashSet<String> {
    mappings.iter().map(|(_, v)| v.clone()).collect()
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn uniqueness_ordering_partition_and_threshold(
        a_mappings in mappings(),
        b_mappings in mappings(),
        minimum_score in minimum_score(),
    ) {
        let a = build_dataset("a", &a_mappings);
        let b = build_dataset("b", &b_mappings);
        let engine = Engine::new(a, b);
        let options = CorrelateOptions { minimum_score, ..CorrelateOptions::default() };
        let result = engine.correlate(&options).unwrap();

        // Uniqueness: no value repeats on either side (reuse is off by default).
        let mut seen_a = HashSet::new();
        let mut seen_b = HashSet::new();
        for m in &result.matches {
            prop_assert!(seen_a.insert(m.value_a.clone()), "value_a repeated: {}", m.value_a);
            prop_assert!(seen_b.insert(m.value_b.clone()), "value_b repeated: {}", m.value_b);
        }

        // Ordering: non-ascending by score.
        for window in result.matches.windows(2) {
            prop_assert!(window[0].score >= window[1].score);
        }

        // Threshold: every surviving match clears the floor strictly.
        for m in &result.matches {
            prop_assert!(m.score > options.minimum_score);
        }

        // Partition: matched ∪ unmatched reconstructs every distinct value,
        // with no value in both.
        let matched_a: HashSet<String> = result.matches.iter().map(|m| m.value_a.clone()).collect();
        let matched_b: HashSet<String> = result.matches.iter().map(|m| m.value_b.clone()).collect();
        let unmatched_a: HashSet<String> = result.unmatched_a.iter().cloned().collect();
        let unmatched_b: HashSet<String> = result.unmatched_b.iter().cloned().collect();

        prop_assert!(matched_a.is_disjoint(&unmatched_a));
        prop_assert!(matched_b.is_disjoint(&unmatched_b));
        prop_assert_eq!(
            matched_a.union(&unmatched_a).cloned().collect::<HashSet<_>>(),
            distinct_values(&a_mappings)
        );
        prop_assert_eq!(
            matched_b.union(&unmatched_b).cloned().collect::<HashSet<_>>(),
            distinct_values(&b_mappings)
        );
    }

    #[test]
    fn determinism(a_mappings in mappings(), b_mappings in mappings()) {
        let options = CorrelateOptions::default();

        let a1 = build_dataset("a", &a_mappings);
        let b1 = build_dataset("b", &b_mappings);
        let first = Engine::new(a1, b1).correlate(&options).unwrap();

        let a2 = build_dataset("a", &a_mappings);
        let b2 = build_dataset("b", &b_mappings);
        let second = Engine::new(a2, b2).correlate(&options).unwrap();

        prop_assert_eq!(first.matches.len(), second.matches.len());
        for (m1, m2) in first.matches.iter().zip(second.matches.iter()) {
            prop_assert_eq!(&m1.value_a, &m2.value_a);
            prop_assert_eq!(&m1.value_b, &m2.value_b);
            prop_assert_eq!(m1.score, m2.score);
        }
        prop_assert_eq!(first.unmatched_a, second.unmatched_a);
        prop_assert_eq!(first.unmatched_b, second.unmatched_b);
    }

    #[test]
    fn normalization_lands_in_unit_range(
        a_mappings in mappings(),
        b_mappings in mappings(),
        minimum_score in minimum_score(),
    ) {
        let a = build_dataset("a", &a_mappings);
        let b = build_dataset("b", &b_mappings);
        let options = CorrelateOptions { minimum_score, ..CorrelateOptions::default() };
        let mut result = Engine::new(a, b).correlate(&options).unwrap();
        result.normalize(None, None);

        for m in &result.matches {
            prop_assert!(m.score >= 0.0 && m.score <= 1.0);
        }
        if let Some(top) = result.matches.first() {
            prop_assert!(top.score >= 0.0 && top.score <= 1.0);
        }
    }

    #[test]
    fn symmetry_of_swap_preserves_total_score_and_counts(
        a_mappings in mappings(),
        b_mappings in mappings(),
    ) {
        let options = CorrelateOptions::default();

        let a = build_dataset("a", &a_mappings);
        let b = build_dataset("b", &b_mappings);
        let forward = Engine::new(a, b).correlate(&options).unwrap();

        let b_as_a = build_dataset("a", &b_mappings);
        let a_as_b = build_dataset("b", &a_mappings);
        let swapped = Engine::new(b_as_a, a_as_b).correlate(&options).unwrap();

        prop_assert_eq!(forward.matches.len(), swapped.matches.len());
        prop_assert_eq!(forward.unmatched_a.len(), swapped.unmatched_b.len());
        prop_assert_eq!(forward.unmatched_b.len(), swapped.unmatched_a.len());

        let forward_total: f64 = forward.matches.iter().map(|m| m.score).sum();
        let swapped_total: f64 = swapped.matches.iter().map(|m| m.score).sum();
        prop_assert!((forward_total - swapped_total).abs() < 1e-9);
    }

    #[test]
    fn tokenizing_twice_is_idempotent(input in "[a-zA-Z0-9 ?!@#$%^&*:,_-]{0,40}") {
        let once = str_to_keys_default(&input);
        let twice = str_to_keys_default(&once.join(" "));
        prop_assert_eq!(once, twice);
    }
}
