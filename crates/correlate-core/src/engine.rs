//! The engine (C5): owns the two datasets and runs `correlate()` —
//! passes 3 (ratio bonus, ranking) and 4 (final boil, channel
//! selection) on top of `scoring.rs`'s passes 1-2.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use tracing::debug;

use crate::boiler::{boil, BoilItem};
use crate::dataset::Dataset;
use crate::error::CorrelateError;
use crate::fuzzy::FuzzyKeyId;
use crate::index::StreamlinedIndex;
use crate::options::{CorrelateOptions, RankingApproach};
use crate::result::{CorrelateResult, Match};
use crate::scoring::score_candidates;

/// Owns both sides of a correlation and runs the scoring pipeline over
/// them. `V` is the value type, `K` the exact-key type (`String` by
/// default).
///
/// The fuzzy-similarity cache (spec §3 "Lifecycle", §5) lives here rather
/// than inside a single `correlate()` call: it is the one piece of state
/// that survives across repeated calls on the same engine instance, so a
/// fuzzy key's `compare()` oracle is never invoked twice for the same pair
/// of key instances.
#[derive(Debug)]
pub struct Engine<V, K = String> {
    pub a: Dataset<V, K>,
    pub b: Dataset<V, K>,
    fuzzy_similarity_cache: RefCell<HashMap<(FuzzyKeyId, FuzzyKeyId), f64>>,
}

impl<V, K> Engine<V, K>
where
    V: Eq + Hash + Clone,
    K: Eq + Hash + Clone + Ord,
{
    #[must_use]
    pub fn new(a: Dataset<V, K>, b: Dataset<V, K>) -> Self {
        Self {
            a,
            b,
            fuzzy_similarity_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Run the full four-pass correlation pipeline and return the
    /// highest-scoring ranking channel's matches, plus each side's
    /// unmatched residual values.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelateError::InvalidArgument`] if `options` is
    /// malformed (negative `minimum_score`, or both `ranking_factor` and
    /// `ranking_bonus` set), and [`CorrelateError::InvariantViolation`]
    /// if either dataset fails its internal consistency checks.
    pub fn correlate(
        &self,
        options: &CorrelateOptions,
    ) -> Result<CorrelateResult<V>, CorrelateError> {
        validate_options(options)?;
        self.a.validate()?;
        self.b.validate()?;

        let index_a = StreamlinedIndex::build(&self.a, &self.b, options.key_reuse_penalty_factor);
        let index_b = StreamlinedIndex::build(&self.b, &self.a, options.key_reuse_penalty_factor);

        let pairs = score_candidates(
            &self.a,
            &self.b,
            &index_a,
            &index_b,
            options.key_reuse_penalty_factor,
            &self.fuzzy_similarity_cache,
        )?;
        debug!(candidates = pairs.len(), "scored candidate pairs");

        let using_rankings = (options.ranking_factor != 0.0 || options.ranking_bonus != 0.0)
            && self.a.ranked_count() > 1
            && self.b.ranked_count() > 1;

        let mut channels = build_channels(using_rankings, options.ranking);

        let ranking_range_a = self.a.ranking_range();
        let ranking_range_b = self.b.ranking_range();
        let widest_ranking_range = ranking_range_a.max(ranking_range_b);
        let one_minus_ranking_factor = 1.0 - options.ranking_factor;

        for pair in &pairs {
            let mut score = pair.score;
            if options.score_ratio_bonus != 0.0 {
                let total_keys = index_a.total_keys[pair.index_a] + index_b.total_keys[pair.index_b];
                if total_keys == 0 {
                    // A candidate pair only exists because at least one side
                    // contributed a key (see scoring.rs's candidate
                    // enumeration), so this is unreachable in practice; it's
                    // guarded rather than left as a silent division so a
                    // future bug upstream surfaces as a clean error instead
                    // of a NaN/inf folded into the score.
                    return Err(CorrelateError::invariant_violation(format!(
                        "candidate pair (a={}, b={}) has zero total keys on both sides",
                        pair.index_a, pair.index_b
                    )));
                }
                score += (options.score_ratio_bonus * pair.cumulative_possible_exact_score)
                    / total_keys as f64;
            }

            if !using_rankings {
                channels[0].push(pair.index_a, pair.index_b, score);
                continue;
            }

            let mut absolute_score = score;
            let mut relative_score = score;
            let ranking_a = self.a.ranking(pair.index_a);
            let ranking_b = self.b.ranking(pair.index_b);

            if let (Some(ranking_a), Some(ranking_b)) = (ranking_a, ranking_b) {
                let relative_a = ranking_a / ranking_range_a;
                let relative_b = ranking_b / ranking_range_b;
                let relative_distance_factor = 1.0 - (relative_a - relative_b).abs();
                let absolute_distance_factor =
                    1.0 - ((ranking_a - ranking_b).abs() / widest_ranking_range);

                if options.ranking_factor != 0.0 {
                    absolute_score *=
                        one_minus_ranking_factor + (options.ranking_factor * absolute_distance_factor);
                    relative_score *=
                        one_minus_ranking_factor + (options.ranking_factor * relative_distance_factor);
                } else if options.ranking_bonus != 0.0 {
                    absolute_score += options.ranking_bonus * absolute_distance_factor;
                    relative_score += options.ranking_bonus * relative_distance_factor;
                }
            } else if options.ranking_factor != 0.0 {
                // Neither value has a usable ranking: discount both
                // channels so ranked matches outweigh unranked ones.
                absolute_score *= one_minus_ranking_factor;
                relative_score *= one_minus_ranking_factor;
            }

            for channel in &mut channels {
                let score = match channel.kind {
                    ChannelKind::Absolute => absolute_score,
                    ChannelKind::Relative => relative_score,
                    ChannelKind::Unified => {
                        unreachable!("a unified channel never coexists with ranking channels")
                    }
                };
                channel.push(pair.index_a, pair.index_b, score);
            }
        }

        self.resolve_channels(channels, options)
    }

    fn resolve_channels(
        &self,
        channels: Vec<Channel>,
        options: &CorrelateOptions,
    ) -> Result<CorrelateResult<V>, CorrelateError> {
        let mut best: Option<(f64, Vec<BoilItem<usize, usize>>, HashSet<usize>, HashSet<usize>)> =
            None;

        for mut channel in channels {
            channel
                .matches
                .sort_by(|x, y| x.score.total_cmp(&y.score));
            let (boiled, seen_a, seen_b) = boil(channel.matches, options.reuse_a, options.reuse_b);

            let mut cumulative_score = 0.0;
            let mut matches = boiled;
            let mut truncate_at = None;
            for (i, item) in matches.iter().enumerate() {
                cumulative_score += item.score;
                if item.score <= options.minimum_score {
                    truncate_at = Some(i);
                    break;
                }
            }
            if let Some(i) = truncate_at {
                matches.truncate(i);
            }

            if matches.is_empty() {
                continue;
            }

            debug!(channel = ?channel.kind, cumulative_score, matches = matches.len(), "channel survived truncation");

            let replace = best
                .as_ref()
                .is_none_or(|(best_score, ..)| cumulative_score >= *best_score);
            if replace {
                best = Some((cumulative_score, matches, seen_a, seen_b));
            }
        }

        let Some((_, matches, seen_a, seen_b)) = best else {
            debug!("no channel produced a surviving match; returning all values unmatched");
            return Ok(CorrelateResult {
                matches: Vec::new(),
                unmatched_a: self.a.values.clone(),
                unmatched_b: self.b.values.clone(),
                minimum_score: options.minimum_score,
            });
        };

        let matches = matches
            .into_iter()
            .map(|item| Match {
                value_a: self.a.value_at(item.value_a).clone(),
                value_b: self.b.value_at(item.value_b).clone(),
                score: item.score,
            })
            .collect();
        let unmatched_a = (0..self.a.len())
            .filter(|i| !seen_a.contains(i))
            .map(|i| self.a.value_at(i).clone())
            .collect();
        let unmatched_b = (0..self.b.len())
            .filter(|i| !seen_b.contains(i))
            .map(|i| self.b.value_at(i).clone())
            .collect();

        Ok(CorrelateResult {
            matches,
            unmatched_a,
            unmatched_b,
            minimum_score: options.minimum_score,
        })
    }
}

fn validate_options(options: &CorrelateOptions) -> Result<(), CorrelateError> {
    if options.minimum_score < 0.0 {
        return Err(CorrelateError::invalid_argument(format!(
            "minimum_score must be >= 0, got {}",
            options.minimum_score
        )));
    }
    if options.ranking_factor != 0.0 && options.ranking_bonus != 0.0 {
        return Err(CorrelateError::invalid_argument_with_hint(
            "ranking_factor and ranking_bonus cannot both be set",
            "set only one of ranking_factor/ranking_bonus",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelKind {
    Unified,
    Absolute,
    Relative,
}

struct Channel {
    kind: ChannelKind,
    matches: Vec<BoilItem<usize, usize>>,
}

impl Channel {
    fn push(&mut self, index_a: usize, index_b: usize, score: f64) {
        self.matches.push(BoilItem {
            score,
            value_a: index_a,
            value_b: index_b,
        });
    }
}

/// Build the set of ranking channels to compute, in registration order
/// (absolute before relative). Channel-selection ties favor the
/// later-registered channel, so this order also determines tie-breaking
/// between absolute and relative scores.
fn build_channels(using_rankings: bool, ranking: RankingApproach) -> Vec<Channel> {
    if !using_rankings {
        return vec![Channel {
            kind: ChannelKind::Unified,
            matches: Vec::new(),
        }];
    }

    let mut channels = Vec::with_capacity(2);
    if matches!(ranking, RankingApproach::Absolute | RankingApproach::Best) {
        channels.push(Channel {
            kind: ChannelKind::Absolute,
            matches: Vec::new(),
        });
    }
    if matches!(ranking, RankingApproach::Relative | RankingApproach::Best) {
        channels.push(Channel {
            kind: ChannelKind::Relative,
            matches: Vec::new(),
        });
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_exact_match_engine() -> Engine<String> {
        let mut a: Dataset<String> = Dataset::new("a", 1.0);
        a.set("k".to_string(), "alpha".to_string(), None);
        let mut b: Dataset<String> = Dataset::new("b", 1.0);
        b.set("k".to_string(), "beta".to_string(), None);
        Engine::new(a, b)
    }

    #[test]
    fn single_shared_key_produces_one_match() {
        let engine = single_exact_match_engine();
        let result = engine.correlate(&CorrelateOptions::default()).unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].value_a, "alpha");
        assert_eq!(result.matches[0].value_b, "beta");
        assert!(result.unmatched_a.is_empty());
        assert!(result.unmatched_b.is_empty());
    }

    #[test]
    fn no_shared_keys_leaves_everything_unmatched() {
        let mut a: Dataset<String> = Dataset::new("a", 1.0);
        a.set("k1".to_string(), "alpha".to_string(), None);
        let mut b: Dataset<String> = Dataset::new("b", 1.0);
        b.set("k2".to_string(), "beta".to_string(), None);
        let engine = Engine::new(a, b);

        let result = engine.correlate(&CorrelateOptions::default()).unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_a, vec!["alpha".to_string()]);
        assert_eq!(result.unmatched_b, vec!["beta".to_string()]);
    }

    #[test]
    fn negative_minimum_score_is_rejected() {
        let engine = single_exact_match_engine();
        let options = CorrelateOptions {
            minimum_score: -1.0,
            ..CorrelateOptions::default()
        };
        let err = engine.correlate(&options).unwrap_err();
        assert!(matches!(err, CorrelateError::InvalidArgument { .. }));
    }

    #[test]
    fn ranking_factor_and_bonus_are_mutually_exclusive() {
        let engine = single_exact_match_engine();
        let options = CorrelateOptions {
            ranking_factor: 0.5,
            ranking_bonus: 0.5,
            ..CorrelateOptions::default()
        };
        let err = engine.correlate(&options).unwrap_err();
        assert!(matches!(err, CorrelateError::InvalidArgument { .. }));
    }

    #[test]
    fn minimum_score_truncates_weak_matches() {
        let mut a: Dataset<String> = Dataset::new("a", 1.0);
        a.set("k".to_string(), "alpha".to_string(), None);
        let mut b: Dataset<String> = Dataset::new("b", 1.0);
        b.set("k".to_string(), "beta1".to_string(), None);
        b.set("k".to_string(), "beta2".to_string(), None);
        let engine = Engine::new(a, b);

        let options = CorrelateOptions {
            minimum_score: 0.6,
            score_ratio_bonus: 0.0,
            ..CorrelateOptions::default()
        };
        let result = engine.correlate(&options).unwrap();
        assert!(result.matches.is_empty());
        // Both b-values remain unseen since the boiler could only ever
        // keep one of them, and that one fell below the threshold.
        assert_eq!(result.unmatched_a.len(), 1);
    }

    #[test]
    fn ranking_bonus_prefers_the_closer_ranked_pairing() {
        // Four equally-scored exact candidates (every value shares key
        // "k"); only the ranking bonus distinguishes them. a1/b1 and
        // a2/b2 are the close-ranked pairing and should win over
        // a1/b2 and a2/b1.
        let mut a: Dataset<String> = Dataset::new("a", 1.0);
        a.set("k".to_string(), "a1".to_string(), None);
        a.value("a1".to_string(), Some(1.0)).unwrap();
        a.set("k".to_string(), "a2".to_string(), None);
        a.value("a2".to_string(), Some(10.0)).unwrap();

        let mut b: Dataset<String> = Dataset::new("b", 1.0);
        b.set("k".to_string(), "b1".to_string(), None);
        b.value("b1".to_string(), Some(1.5)).unwrap();
        b.set("k".to_string(), "b2".to_string(), None);
        b.value("b2".to_string(), Some(9.5)).unwrap();

        let engine = Engine::new(a, b);
        let options = CorrelateOptions {
            ranking: RankingApproach::Absolute,
            ranking_bonus: 1.0,
            ..CorrelateOptions::default()
        };
        let result = engine.correlate(&options).unwrap();
        assert_eq!(result.matches.len(), 2);
        let paired: std::collections::HashSet<(String, String)> = result
            .matches
            .iter()
            .map(|m| (m.value_a.clone(), m.value_b.clone()))
            .collect();
        assert!(paired.contains(&("a1".to_string(), "b1".to_string())));
        assert!(paired.contains(&("a2".to_string(), "b2".to_string())));
    }

    #[test]
    fn fuzzy_similarity_cache_persists_across_correlate_calls() {
        use crate::fuzzy::{FuzzyKey, FuzzyKeyHandle};
        use std::cell::Cell;
        use std::rc::Rc;

        #[derive(Debug)]
        struct CountingKey {
            calls: Rc<Cell<usize>>,
        }

        impl FuzzyKey for CountingKey {
            fn compare(&self, _other: &dyn FuzzyKey) -> Option<f64> {
                self.calls.set(self.calls.get() + 1);
                Some(0.7)
            }
        }

        let calls = Rc::new(Cell::new(0));
        let key_a = FuzzyKeyHandle::new(CountingKey { calls: calls.clone() });
        let key_b = FuzzyKeyHandle::new(CountingKey { calls: calls.clone() });

        let mut a: Dataset<String> = Dataset::new("a", 1.0);
        a.set_fuzzy(key_a, "alpha".to_string(), None);
        let mut b: Dataset<String> = Dataset::new("b", 1.0);
        b.set_fuzzy(key_b, "beta".to_string(), None);

        let engine = Engine::new(a, b);
        let options = CorrelateOptions::default();

        engine.correlate(&options).unwrap();
        let calls_after_first = calls.get();
        assert!(calls_after_first > 0, "compare() should run on the first call");

        engine.correlate(&options).unwrap();
        assert_eq!(
            calls.get(),
            calls_after_first,
            "a second correlate() call must reuse the cached similarity, not recompute it"
        );
    }
}
