//! The dataset store (C1): holds values, their keys (exact and fuzzy),
//! per-use weights, and optional numeric rankings for one side ("A" or
//! "B") of a correlation.

use std::collections::HashMap;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::CorrelateError;
use crate::fuzzy::{FuzzyKeyHandle, FuzzyKeyId};

/// Per-value key bookkeeping: every exact key mapped to this value, with
/// its weight list in mapping order (re-sorted non-ascending after every
/// `set`), and the same per fuzzy type.
#[derive(Debug, Default)]
pub(crate) struct ValueKeys<K> {
    pub(crate) exact: IndexMap<K, Vec<f64>>,
    pub(crate) fuzzy: IndexMap<std::any::TypeId, IndexMap<FuzzyKeyId, (FuzzyKeyHandle, Vec<f64>)>>,
}

/// One side of a correlation: values, their keys, and optional rankings.
///
/// `V` is the opaque value type the caller is correlating (must be
/// `Eq + Hash + Clone`; see `DESIGN.md` for why this crate does not model
/// the "unhashable value falls back to linear scan" duck-typed behavior of
/// the system this was distilled from). `K` is the exact-key type, `String`
/// by default.
#[derive(Debug)]
pub struct Dataset<V, K = String> {
    pub(crate) id: &'static str,
    pub(crate) default_weight: f64,
    pub(crate) values: Vec<V>,
    pub(crate) value_to_index: HashMap<V, usize>,
    pub(crate) keys_by_value: Vec<ValueKeys<K>>,
    pub(crate) exact_key_to_index: IndexMap<K, Vec<std::collections::HashSet<usize>>>,
    pub(crate) fuzzy_key_to_index:
        IndexMap<std::any::TypeId, IndexMap<FuzzyKeyId, Vec<std::collections::HashSet<usize>>>>,
    pub(crate) rankings: Vec<Option<f64>>,
    pub(crate) lowest_ranking: f64,
    pub(crate) highest_ranking: f64,
    pub(crate) ranked_count: usize,
}

impl<V, K> Dataset<V, K>
where
    V: Eq + Hash + Clone,
    K: Eq + Hash + Clone + Ord,
{
    /// Create an empty dataset. `id` is a short label (`"a"`, `"b"`) used
    /// only in logging and `Debug` output.
    #[must_use]
    pub fn new(id: &'static str, default_weight: f64) -> Self {
        Self {
            id,
            default_weight,
            values: Vec::new(),
            value_to_index: HashMap::new(),
            keys_by_value: Vec::new(),
            exact_key_to_index: IndexMap::new(),
            fuzzy_key_to_index: IndexMap::new(),
            rankings: Vec::new(),
            lowest_ranking: f64::INFINITY,
            highest_ranking: f64::NEG_INFINITY,
            ranked_count: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> &'static str {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn value_at(&self, index: usize) -> &V {
        &self.values[index]
    }

    /// Resolve `value`'s dense index, creating it if this is the first
    /// time it has been seen.
    fn value_index(&mut self, value: V) -> usize {
        if let Some(&index) = self.value_to_index.get(&value) {
            return index;
        }
        let index = self.values.len();
        self.values.push(value.clone());
        self.keys_by_value.push(ValueKeys::default());
        self.value_to_index.insert(value, index);
        index
    }

    /// Map an exact `key` to `value`, appending `weight` (or the dataset's
    /// default) to the (key, value) weight list and re-sorting it
    /// non-ascending. Returns the value's index.
    pub fn set(&mut self, key: K, value: V, weight: Option<f64>) -> usize {
        let weight = weight.unwrap_or(self.default_weight);
        let index = self.value_index(value);

        let weights = self.keys_by_value[index]
            .exact
            .entry(key.clone())
            .or_default();
        let round = weights.len();
        weights.push(weight);
        weights.sort_by(|a, b| b.partial_cmp(a).expect("weights are never NaN"));

        // `exact_key_to_index[key]` is shared across every value that maps
        // this key, so its round count only ever needs to grow to match
        // the highest round any value has reached so far.
        let rounds = self.exact_key_to_index.entry(key).or_default();
        debug_assert!(rounds.len() >= round, "round may not skip ahead of the key's round table");
        if rounds.len() == round {
            rounds.push(std::collections::HashSet::new());
        }
        rounds[round].insert(index);

        index
    }

    /// Convenience for mapping several exact keys to the same value.
    pub fn set_keys(
        &mut self,
        keys: impl IntoIterator<Item = K>,
        value: V,
        weight: Option<f64>,
    ) -> usize {
        let mut index = 0;
        let mut first = true;
        for key in keys {
            index = self.set(key, value.clone(), weight);
            first = false;
        }
        if first {
            // No keys at all: still register the value so later `value()`
            // calls and residual accounting see it.
            index = self.value_index(value);
        }
        index
    }

    /// Map a fuzzy `key` (already wrapped as a [`FuzzyKeyHandle`]) to
    /// `value`.
    pub fn set_fuzzy(&mut self, key: FuzzyKeyHandle, value: V, weight: Option<f64>) -> usize {
        let weight = weight.unwrap_or(self.default_weight);
        let index = self.value_index(value);
        let ty = key.fuzzy_type();
        let id = key.id();

        let by_type = self.keys_by_value[index].fuzzy.entry(ty).or_default();
        let (_, weights) = by_type.entry(id).or_insert_with(|| (key.clone(), Vec::new()));
        let round = weights.len();
        weights.push(weight);
        weights.sort_by(|a, b| b.partial_cmp(a).expect("weights are never NaN"));

        let rounds = self
            .fuzzy_key_to_index
            .entry(ty)
            .or_default()
            .entry(id)
            .or_default();
        debug_assert!(rounds.len() >= round, "round may not skip ahead of the key's round table");
        if rounds.len() == round {
            rounds.push(std::collections::HashSet::new());
        }
        rounds[round].insert(index);

        index
    }

    /// Resolve or create `value`'s index and record its ranking. Returns
    /// [`CorrelateError::InvalidArgument`] if `ranking` is provided but not
    /// finite.
    pub fn value(&mut self, value: V, ranking: Option<f64>) -> Result<usize, CorrelateError> {
        if let Some(r) = ranking
            && !r.is_finite()
        {
            return Err(CorrelateError::invalid_argument(format!(
                "ranking must be a finite number, got {r}"
            )));
        }

        let index = self.value_index(value);
        if self.rankings.len() <= index {
            self.rankings.resize(index + 1, None);
        }
        self.rankings[index] = ranking;

        if let Some(r) = ranking {
            self.lowest_ranking = self.lowest_ranking.min(r);
            self.highest_ranking = self.highest_ranking.max(r);
            self.ranked_count += 1;
        }

        Ok(index)
    }

    #[must_use]
    pub fn ranking(&self, index: usize) -> Option<f64> {
        self.rankings.get(index).copied().flatten()
    }

    #[must_use]
    pub fn ranking_range(&self) -> f64 {
        self.highest_ranking - self.lowest_ranking
    }

    #[must_use]
    pub fn ranked_count(&self) -> usize {
        self.ranked_count
    }

    #[must_use]
    pub fn lowest_ranking(&self) -> f64 {
        self.lowest_ranking
    }

    #[must_use]
    pub fn highest_ranking(&self) -> f64 {
        self.highest_ranking
    }

    /// Checks the invariants spec §3 names: no duplicate values, weight
    /// lists sorted non-ascending, round sets nested (round N is a subset
    /// of round N-1's owners), and every value owns at least one key.
    /// Failure here means a bug inside this crate, not caller error (see
    /// `SPEC_FULL.md` §3.1) — `Dataset`'s own public API cannot produce a
    /// state that violates these.
    pub(crate) fn validate(&self) -> Result<(), CorrelateError> {
        for (index, vk) in self.keys_by_value.iter().enumerate() {
            if vk.exact.is_empty() && vk.fuzzy.is_empty() {
                return Err(CorrelateError::invariant_violation(format!(
                    "dataset '{}' value index {index} has no mapped keys",
                    self.id
                )));
            }
            for weights in vk.exact.values() {
                if !is_non_ascending(weights) {
                    return Err(CorrelateError::invariant_violation(format!(
                        "dataset '{}' value index {index} has non-sorted exact weights",
                        self.id
                    )));
                }
            }
            for (_, weights) in vk.fuzzy.values() {
                if !is_non_ascending(weights) {
                    return Err(CorrelateError::invariant_violation(format!(
                        "dataset '{}' value index {index} has non-sorted fuzzy weights",
                        self.id
                    )));
                }
            }
        }

        for rounds in self.exact_key_to_index.values() {
            for window in rounds.windows(2) {
                if let [earlier, later] = window
                    && !later.is_subset(earlier)
                {
                    return Err(CorrelateError::invariant_violation(format!(
                        "dataset '{}' has a round whose owners are not a subset of the previous round",
                        self.id
                    )));
                }
            }
        }

        Ok(())
    }
}

fn is_non_ascending(weights: &[f64]) -> bool {
    weights.windows(2).all(|w| w[0] >= w[1])
}
