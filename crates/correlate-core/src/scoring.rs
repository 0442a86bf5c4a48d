//! Passes 1 and 2 of the scoring pipeline (C4): candidate-pair
//! enumeration, exact-key intersection scoring, and fuzzy-key scoring
//! (which needs a second pass once every candidate's cumulative fuzzy
//! usage is known).

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use crate::dataset::Dataset;
use crate::error::CorrelateError;
use crate::fuzzy::FuzzyKeyId;
use crate::index::{FuzzyEntry, FuzzyTypeRounds, StreamlinedIndex};

/// Identifies one fuzzy-key use: which value owns it, which key instance,
/// and at which round. Used as the accumulation bucket for a fuzzy key's
/// cumulative score across every candidate pair it participates in.
type FuzzyTuple = (usize, FuzzyKeyId, usize);

/// A fully-scored candidate pair, ready for pass 3.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PairScore {
    pub index_a: usize,
    pub index_b: usize,
    pub score: f64,
    pub cumulative_possible_exact_score: f64,
}

enum Pending {
    Final(f64),
    Fuzzy {
        exact_scores: Vec<f64>,
        fuzzy: Vec<(f64, f64, FuzzyTuple, FuzzyTuple)>,
    },
}

struct Draft {
    index_a: usize,
    index_b: usize,
    cumulative_possible_exact_score: f64,
    pending: Pending,
}

/// Enumerate every candidate `(index_a, index_b)` pair that shares at
/// least one exact key (at round 0) or a fuzzy key with positive
/// similarity, then run passes 1 and 2 over them, returning one
/// finalized [`PairScore`] per candidate.
///
/// Candidates are deduplicated through a `BTreeSet`, matching the
/// original engine's `sort()` + dedup over the raw candidate list: this
/// is a deliberate determinism guarantee, not an implementation detail,
/// so later passes (and their tie-breaking) see candidates in the same
/// order on every run.
///
/// `fuzzy_similarity_cache` is the engine-owned, cross-call cache (spec
/// §3 "Lifecycle", §5): a similarity already computed for a given pair of
/// fuzzy-key instances on an earlier `correlate()` call is reused rather
/// than re-invoking the user's `compare()` oracle.
pub(crate) fn score_candidates<V, K>(
    a: &Dataset<V, K>,
    b: &Dataset<V, K>,
    index_a: &StreamlinedIndex<K>,
    index_b: &StreamlinedIndex<K>,
    key_reuse_penalty_factor: f64,
    fuzzy_similarity_cache: &RefCell<HashMap<(FuzzyKeyId, FuzzyKeyId), f64>>,
) -> Result<Vec<PairScore>, CorrelateError>
where
    V: Eq + Hash + Clone,
    K: Eq + Hash + Clone + Ord,
{
    let (candidates, fuzzy_cache) =
        enumerate_candidates(a, b, index_a, index_b, fuzzy_similarity_cache)?;

    let mut cumulative_a: HashMap<FuzzyTuple, f64> = HashMap::new();
    let mut cumulative_b: HashMap<FuzzyTuple, f64> = HashMap::new();
    let mut drafts = Vec::with_capacity(candidates.len());

    for (idx_a, idx_b) in candidates {
        drafts.push(score_pair_pass_one(
            idx_a,
            idx_b,
            index_a,
            index_b,
            &fuzzy_cache,
            key_reuse_penalty_factor,
            &mut cumulative_a,
            &mut cumulative_b,
        ));
    }

    let results = drafts
        .into_iter()
        .map(|draft| finalize_pass_two(draft, &cumulative_a, &cumulative_b))
        .collect();
    Ok(results)
}

/// Build the candidate pair set and this call's local fuzzy similarity
/// snapshot, keyed by `(key instance from A, key instance from B)`. Every
/// lookup consults `fuzzy_similarity_cache` first and only invokes the
/// user's `compare()` oracle (via `FuzzyKeyHandle::similarity`) on a miss,
/// writing the result back so later `correlate()` calls on the same
/// engine skip it too.
fn enumerate_candidates<V, K>(
    a: &Dataset<V, K>,
    b: &Dataset<V, K>,
    index_a: &StreamlinedIndex<K>,
    index_b: &StreamlinedIndex<K>,
    fuzzy_similarity_cache: &RefCell<HashMap<(FuzzyKeyId, FuzzyKeyId), f64>>,
) -> Result<(BTreeSet<(usize, usize)>, HashMap<(FuzzyKeyId, FuzzyKeyId), f64>), CorrelateError>
where
    V: Eq + Hash + Clone,
    K: Eq + Hash + Clone + Ord,
{
    let mut candidates = BTreeSet::new();

    for key in index_a.all_exact_keys.intersection(&index_b.all_exact_keys) {
        let Some(owners_a) = a.exact_key_to_index.get(key).and_then(|r| r.first()) else {
            continue;
        };
        let Some(owners_b) = b.exact_key_to_index.get(key).and_then(|r| r.first()) else {
            continue;
        };
        for &ia in owners_a {
            for &ib in owners_b {
                candidates.insert((ia, ib));
            }
        }
    }

    let mut fuzzy_cache = HashMap::new();
    for (ty, keys_a) in &index_a.all_fuzzy_keys {
        let Some(keys_b) = index_b.all_fuzzy_keys.get(ty) else {
            continue;
        };
        for (&id_a, handle_a) in keys_a {
            for (&id_b, handle_b) in keys_b {
                let cached = fuzzy_similarity_cache.borrow().get(&(id_a, id_b)).copied();
                let score = match cached {
                    Some(score) => score,
                    None => {
                        let score = handle_a.similarity(handle_b)?;
                        fuzzy_similarity_cache
                            .borrow_mut()
                            .insert((id_a, id_b), score);
                        score
                    }
                };
                fuzzy_cache.insert((id_a, id_b), score);
                if score > 0.0 {
                    let owners_a = a
                        .fuzzy_key_to_index
                        .get(ty)
                        .and_then(|m| m.get(&id_a))
                        .and_then(|r| r.first());
                    let owners_b = b
                        .fuzzy_key_to_index
                        .get(ty)
                        .and_then(|m| m.get(&id_b))
                        .and_then(|r| r.first());
                    if let (Some(owners_a), Some(owners_b)) = (owners_a, owners_b) {
                        for &ia in owners_a {
                            for &ib in owners_b {
                                candidates.insert((ia, ib));
                            }
                        }
                    }
                }
            }
        }
    }

    Ok((candidates, fuzzy_cache))
}

#[allow(clippy::too_many_arguments)]
fn score_pair_pass_one<K: Eq + Hash + Clone + Ord>(
    idx_a: usize,
    idx_b: usize,
    index_a: &StreamlinedIndex<K>,
    index_b: &StreamlinedIndex<K>,
    fuzzy_cache: &HashMap<(FuzzyKeyId, FuzzyKeyId), f64>,
    key_reuse_penalty_factor: f64,
    cumulative_a: &mut HashMap<FuzzyTuple, f64>,
    cumulative_b: &mut HashMap<FuzzyTuple, f64>,
) -> Draft {
    let mut cumulative_possible_exact_score = 0.0;
    let mut exact_scores = Vec::new();

    let rounds_a = &index_a.exact_rounds[idx_a];
    let rounds_b = &index_b.exact_rounds[idx_b];
    for (i, (round_a, round_b)) in rounds_a.iter().zip(rounds_b.iter()).enumerate() {
        let mut intersection: Vec<&K> = round_a.keys.intersection(&round_b.keys).collect();
        if intersection.is_empty() {
            break;
        }
        // Sorting the intersection removes the last bit of nondeterminism
        // from hash-set iteration order; it doesn't change the score.
        intersection.sort();

        let round_factor = key_reuse_penalty_factor.powi((2 * i) as i32);
        cumulative_possible_exact_score += intersection.len() as f64 * 2.0;

        let mut scored = false;
        for key in intersection {
            let (weight_a, count_a) = round_a.data[key];
            let (weight_b, count_b) = round_b.data[key];
            let score = (weight_a * weight_b * round_factor) / (count_a as f64 * count_b as f64);
            if score != 0.0 {
                scored = true;
                exact_scores.push(score);
            }
        }
        if !scored {
            break;
        }
    }

    let fuzzy_semifinal = score_fuzzy_for_pair(
        idx_a,
        idx_b,
        index_a,
        index_b,
        fuzzy_cache,
        cumulative_a,
        cumulative_b,
    );

    let pending = if fuzzy_semifinal.is_empty() {
        exact_scores.sort_by(f64::total_cmp);
        Pending::Final(exact_scores.into_iter().sum())
    } else {
        Pending::Fuzzy {
            exact_scores,
            fuzzy: fuzzy_semifinal,
        }
    };

    Draft {
        index_a: idx_a,
        index_b: idx_b,
        cumulative_possible_exact_score,
        pending,
    }
}

/// Run the nested match boiler over every fuzzy type the two values share,
/// returning each surviving pair's `(fuzzy_score, semi_final_score,
/// tuple_a, tuple_b)`, and updating the running per-key cumulative-score
/// maps used to finalize scores in pass 2.
fn score_fuzzy_for_pair<K>(
    idx_a: usize,
    idx_b: usize,
    index_a: &StreamlinedIndex<K>,
    index_b: &StreamlinedIndex<K>,
    fuzzy_cache: &HashMap<(FuzzyKeyId, FuzzyKeyId), f64>,
    cumulative_a: &mut HashMap<FuzzyTuple, f64>,
    cumulative_b: &mut HashMap<FuzzyTuple, f64>,
) -> Vec<(f64, f64, FuzzyTuple, FuzzyTuple)> {
    use crate::boiler::{boil, BoilItem};

    let types_a = &index_a.fuzzy_rounds[idx_a];
    let types_b = &index_b.fuzzy_rounds[idx_b];

    let mut semifinal = Vec::new();

    for (ty, rounds_a) in types_a {
        let Some(rounds_b) = types_b.get(ty) else {
            continue;
        };

        let entries_a = all_entries(rounds_a);
        let entries_b = all_entries(rounds_b);

        let mut items = Vec::new();
        let mut semi_final_scores: HashMap<((FuzzyKeyId, usize), (FuzzyKeyId, usize)), f64> =
            HashMap::new();

        for &(id_a, entry_a) in &entries_a {
            for &(id_b, entry_b) in &entries_b {
                let fuzzy_score = fuzzy_cache.get(&(id_a, id_b)).copied().unwrap_or(0.0);
                if fuzzy_score <= 0.0 {
                    continue;
                }
                let fuzzy_score_cubed = fuzzy_score.powi(3);
                let semi_final_score = entry_a.weight
                    * entry_b.weight
                    * (fuzzy_score_cubed * (entry_a.penalty * entry_b.penalty));

                let value_a = (id_a, entry_a.round);
                let value_b = (id_b, entry_b.round);
                semi_final_scores.insert((value_a, value_b), semi_final_score);

                items.push(BoilItem {
                    score: fuzzy_score,
                    value_a,
                    value_b,
                });
            }
        }

        if items.is_empty() {
            continue;
        }

        items.sort_by(|x, y| {
            let lowest_x = -(x.value_a.1.min(x.value_b.1) as i64);
            let highest_x = -(x.value_a.1.max(x.value_b.1) as i64);
            let lowest_y = -(y.value_a.1.min(y.value_b.1) as i64);
            let highest_y = -(y.value_a.1.max(y.value_b.1) as i64);
            x.score
                .total_cmp(&y.score)
                .then(lowest_x.cmp(&lowest_y))
                .then(highest_x.cmp(&highest_y))
        });

        let (results, _, _) = boil(items, false, false);
        for item in results {
            let fuzzy_score = item.score;
            let tuple_a: FuzzyTuple = (idx_a, item.value_a.0, item.value_a.1);
            let tuple_b: FuzzyTuple = (idx_b, item.value_b.0, item.value_b.1);
            *cumulative_a.entry(tuple_a).or_insert(0.0) += fuzzy_score;
            *cumulative_b.entry(tuple_b).or_insert(0.0) += fuzzy_score;
            let semi_final_score = semi_final_scores[&(item.value_a, item.value_b)];
            semifinal.push((fuzzy_score, semi_final_score, tuple_a, tuple_b));
        }
    }

    semifinal
}

fn all_entries(rounds: &FuzzyTypeRounds) -> Vec<(FuzzyKeyId, &FuzzyEntry)> {
    let mut entries: Vec<(FuzzyKeyId, &FuzzyEntry)> =
        rounds.round0.iter().map(|(&id, e)| (id, e)).collect();
    for (&id, list) in &rounds.rounds_ge1 {
        for e in list {
            entries.push((id, e));
        }
    }
    entries
}

fn finalize_pass_two(
    draft: Draft,
    cumulative_a: &HashMap<FuzzyTuple, f64>,
    cumulative_b: &HashMap<FuzzyTuple, f64>,
) -> PairScore {
    let Draft {
        index_a,
        index_b,
        mut cumulative_possible_exact_score,
        pending,
    } = draft;

    let score = match pending {
        Pending::Final(score) => score,
        Pending::Fuzzy {
            mut exact_scores,
            fuzzy,
        } => {
            for (fuzzy_score, semi_final_score, tuple_a, tuple_b) in fuzzy {
                let hits_in_a = cumulative_a[&tuple_a];
                let hits_in_b = cumulative_b[&tuple_b];
                cumulative_possible_exact_score += fuzzy_score * 2.0;
                exact_scores.push(semi_final_score / (hits_in_a * hits_in_b));
            }
            exact_scores.sort_by(f64::total_cmp);
            exact_scores.into_iter().sum()
        }
    };

    PairScore {
        index_a,
        index_b,
        score,
        cumulative_possible_exact_score,
    }
}
