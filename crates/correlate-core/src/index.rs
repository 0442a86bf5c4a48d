//! The streamlined index (C2): a derived, read-only representation built
//! once per `correlate()` call, giving fast per-value per-round
//! key→(weight, other-side-count) lookups for the scoring pipeline.

use std::any::TypeId;
use std::collections::HashSet;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::dataset::Dataset;
use crate::fuzzy::{FuzzyKeyHandle, FuzzyKeyId};

/// One round's worth of exact-key data for a single value: the keys it
/// owns at this round, and for each key, its weight together with how
/// many values on the *opposite* side own that same key at that round.
#[derive(Debug, Default)]
pub struct ExactRound<K> {
    pub keys: HashSet<K>,
    pub data: std::collections::HashMap<K, (f64, usize)>,
}

/// A single fuzzy-key use: the key itself, its weight at this round, the
/// round number, and the key-reuse penalty already raised to this round's
/// power (`1.0` at round 0).
#[derive(Debug, Clone)]
pub struct FuzzyEntry {
    pub handle: FuzzyKeyHandle,
    pub weight: f64,
    pub round: usize,
    pub penalty: f64,
}

/// Round-0 and round-≥1 fuzzy-key uses for one fuzzy type, for a single
/// value.
#[derive(Debug, Default)]
pub struct FuzzyTypeRounds {
    pub round0: IndexMap<FuzzyKeyId, FuzzyEntry>,
    pub rounds_ge1: IndexMap<FuzzyKeyId, Vec<FuzzyEntry>>,
}

/// The full derived index for one dataset, built against the opposite
/// dataset's round-occupancy counts.
#[derive(Debug)]
pub struct StreamlinedIndex<K> {
    pub all_exact_keys: HashSet<K>,
    pub all_fuzzy_keys: IndexMap<TypeId, IndexMap<FuzzyKeyId, FuzzyKeyHandle>>,
    pub exact_rounds: Vec<Vec<ExactRound<K>>>,
    pub fuzzy_rounds: Vec<IndexMap<TypeId, FuzzyTypeRounds>>,
    pub total_keys: Vec<usize>,
}

impl<K: Eq + Hash + Clone> StreamlinedIndex<K> {
    /// Build the streamlined index for `dataset`, looking up other-side
    /// occurrence counts in `other`. `key_reuse_penalty_factor` is the
    /// base raised to each round's power for the fuzzy penalty.
    pub fn build<V>(
        dataset: &Dataset<V, K>,
        other: &Dataset<V, K>,
        key_reuse_penalty_factor: f64,
    ) -> Self
    where
        V: Eq + Hash + Clone,
        K: Ord,
    {
        let mut all_exact_keys = HashSet::new();
        let mut all_fuzzy_keys: IndexMap<TypeId, IndexMap<FuzzyKeyId, FuzzyKeyHandle>> =
            IndexMap::new();
        let mut exact_rounds = Vec::with_capacity(dataset.keys_by_value.len());
        let mut fuzzy_rounds = Vec::with_capacity(dataset.keys_by_value.len());
        let mut total_keys = Vec::with_capacity(dataset.keys_by_value.len());

        for value_keys in &dataset.keys_by_value {
            let mut key_uses = 0usize;

            let mut rounds: Vec<ExactRound<K>> = Vec::new();
            if !value_keys.exact.is_empty() {
                let max_round = value_keys.exact.values().map(Vec::len).max().unwrap_or(0);
                rounds.resize_with(max_round, ExactRound::default);
                for (key, weights) in &value_keys.exact {
                    all_exact_keys.insert(key.clone());
                    key_uses += weights.len();
                    for (round, &weight) in weights.iter().enumerate() {
                        let other_count = other
                            .exact_key_to_index
                            .get(key)
                            .and_then(|r| r.get(round))
                            .map_or(0, HashSet::len);
                        rounds[round].keys.insert(key.clone());
                        rounds[round].data.insert(key.clone(), (weight, other_count));
                    }
                }
            }
            exact_rounds.push(rounds);

            let mut fr: IndexMap<TypeId, FuzzyTypeRounds> = IndexMap::new();
            for (&ty, keys) in &value_keys.fuzzy {
                let type_registry = all_fuzzy_keys.entry(ty).or_default();
                let mut type_rounds = FuzzyTypeRounds::default();
                for (&key_id, (handle, weights)) in keys {
                    type_registry.insert(key_id, handle.clone());
                    key_uses += weights.len();

                    type_rounds.round0.insert(
                        key_id,
                        FuzzyEntry {
                            handle: handle.clone(),
                            weight: weights[0],
                            round: 0,
                            penalty: 1.0,
                        },
                    );

                    if weights.len() > 1 {
                        let entries = weights[1..]
                            .iter()
                            .enumerate()
                            .map(|(offset, &weight)| {
                                let round = offset + 1;
                                FuzzyEntry {
                                    handle: handle.clone(),
                                    weight,
                                    round,
                                    penalty: key_reuse_penalty_factor.powi(round as i32),
                                }
                            })
                            .collect();
                        type_rounds.rounds_ge1.insert(key_id, entries);
                    }
                }
                fr.insert(ty, type_rounds);
            }
            fuzzy_rounds.push(fr);

            total_keys.push(key_uses);
        }

        Self {
            all_exact_keys,
            all_fuzzy_keys,
            exact_rounds,
            fuzzy_rounds,
            total_keys,
        }
    }
}
