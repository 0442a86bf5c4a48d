//! The match boiler (C3): a stable, greedy, uniqueness-preserving reducer
//! that turns a score-sorted candidate list into a one-to-one pairing,
//! recursively exploring ties to maximize cumulative score.
//!
//! Used twice: once inside fuzzy scoring, over `(fuzzy key, round)`
//! candidates with no reuse on either side, and once at the end of the
//! scoring pipeline, over `(value index A, value index B)` candidates
//! honoring the caller's `reuse_a`/`reuse_b` flags.

use std::collections::HashSet;
use std::hash::Hash;

/// A single scored candidate pairing fed into [`boil`].
#[derive(Debug, Clone)]
pub struct BoilItem<A, B> {
    pub score: f64,
    pub value_a: A,
    pub value_b: B,
}

/// Reduce `matches` (which **must** be sorted ascending by score, highest
/// last) to a uniqueness-respecting subset, returning it highest-score
/// first along with the set of `value_a`/`value_b` it consumed.
///
/// When both `reuse_a` and `reuse_b` are true every item is kept (just
/// reversed into highest-first order). Otherwise the boiler pops the
/// highest-scoring item, absorbs any items tied with it that don't
/// conflict with already-accepted values, and for genuinely ambiguous
/// (connected) ties recursively tries each tied item as the provisional
/// winner, keeping whichever choice yields the highest total score. Ties
/// between equally-good choices are broken in favor of the first one
/// introduced (see the experiment ordering in [`resolve_connected`]).
#[must_use]
pub fn boil<A, B>(
    matches: Vec<BoilItem<A, B>>,
    reuse_a: bool,
    reuse_b: bool,
) -> (Vec<BoilItem<A, B>>, HashSet<A>, HashSet<B>)
where
    A: Eq + Hash + Clone,
    B: Eq + Hash + Clone,
{
    debug_assert!(is_ascending(&matches), "boil() input must be ascending-sorted by score");

    if reuse_a && reuse_b {
        let mut seen_a = HashSet::with_capacity(matches.len());
        let mut seen_b = HashSet::with_capacity(matches.len());
        let mut results = Vec::with_capacity(matches.len());
        for item in matches.into_iter().rev() {
            seen_a.insert(item.value_a.clone());
            seen_b.insert(item.value_b.clone());
            results.push(item);
        }
        return (results, seen_a, seen_b);
    }

    run(matches, reuse_a, reuse_b, HashSet::new(), HashSet::new())
}

fn is_ascending<A, B>(matches: &[BoilItem<A, B>]) -> bool {
    matches.windows(2).all(|w| w[0].score <= w[1].score)
}

/// Core recursive reducer. `matches` must be ascending-sorted; `seen_a`/
/// `seen_b` hold values already committed by an enclosing call.
fn run<A, B>(
    mut matches: Vec<BoilItem<A, B>>,
    reuse_a: bool,
    reuse_b: bool,
    mut seen_a: HashSet<A>,
    mut seen_b: HashSet<B>,
) -> (Vec<BoilItem<A, B>>, HashSet<A>, HashSet<B>)
where
    A: Eq + Hash + Clone,
    B: Eq + Hash + Clone,
{
    let mut results = Vec::new();

    while let Some(top) = matches.pop() {
        if conflicts(&top, reuse_a, reuse_b, &seen_a, &seen_b) {
            continue;
        }
        let top_score = top.score;

        let mut tied = vec![top];
        while matches.last().is_some_and(|m| m.score == top_score) {
            let candidate = matches.pop().expect("checked via last() above");
            if conflicts(&candidate, reuse_a, reuse_b, &seen_a, &seen_b) {
                continue;
            }
            tied.push(candidate);
        }

        if tied.len() == 1 {
            let item = tied.pop().expect("len checked above");
            seen_a.insert(item.value_a.clone());
            seen_b.insert(item.value_b.clone());
            results.push(item);
            continue;
        }

        // `tied` was accumulated by repeated pop() from the tail of an
        // ascending list, so it is currently in reverse insertion order;
        // restore original order before partitioning so isolated items
        // are accepted, and experiments are tried, in a stable sequence.
        tied.reverse();

        let (isolated, connected) = partition_by_connectivity(tied);
        for item in isolated {
            seen_a.insert(item.value_a.clone());
            seen_b.insert(item.value_b.clone());
            results.push(item);
        }

        if connected.is_empty() {
            continue;
        }
        debug_assert!(connected.len() >= 2, "a lone connected item cannot exist");

        let (item, recursive_results, next_seen_a, next_seen_b) =
            resolve_connected(connected, matches, reuse_a, reuse_b, seen_a, seen_b);
        seen_a = next_seen_a;
        seen_b = next_seen_b;
        results.push(item);
        results.extend(recursive_results);
        // The recursive call already consumed everything below this tie.
        return (results, seen_a, seen_b);
    }

    (results, seen_a, seen_b)
}

fn conflicts<A: Eq + Hash, B: Eq + Hash>(
    item: &BoilItem<A, B>,
    reuse_a: bool,
    reuse_b: bool,
    seen_a: &HashSet<A>,
    seen_b: &HashSet<B>,
) -> bool {
    (!reuse_a && seen_a.contains(&item.value_a)) || (!reuse_b && seen_b.contains(&item.value_b))
}

/// Split a batch of equally-scored items into those whose `value_a` and
/// `value_b` each appear in exactly one item (isolated — no ambiguity in
/// accepting them) and those that share a side with another tied item
/// (connected — accepting one forecloses others, so the choice matters).
fn partition_by_connectivity<A, B>(
    items: Vec<BoilItem<A, B>>,
) -> (Vec<BoilItem<A, B>>, Vec<BoilItem<A, B>>)
where
    A: Eq + Hash + Clone,
    B: Eq + Hash + Clone,
{
    let mut count_a: std::collections::HashMap<A, usize> = std::collections::HashMap::new();
    let mut count_b: std::collections::HashMap<B, usize> = std::collections::HashMap::new();
    for item in &items {
        *count_a.entry(item.value_a.clone()).or_insert(0) += 1;
        *count_b.entry(item.value_b.clone()).or_insert(0) += 1;
    }

    let mut isolated = Vec::new();
    let mut connected = Vec::new();
    for item in items {
        if count_a[&item.value_a] == 1 && count_b[&item.value_b] == 1 {
            isolated.push(item);
        } else {
            connected.push(item);
        }
    }
    (isolated, connected)
}

/// Try each connected item as the provisional winner, recursively boiling
/// the remainder, and keep the experiment with the highest cumulative
/// score. Experiments are built from the last connected item to the
/// first; the subsequent stable sort-by-score-descending means ties
/// between experiments favor whichever was tried first in that order,
/// i.e. the last connected item — matching the original implementation's
/// tie-break exactly (see `SPEC_FULL.md` §4.3).
#[allow(clippy::type_complexity)]
fn resolve_connected<A, B>(
    connected: Vec<BoilItem<A, B>>,
    remaining_lower_scored: Vec<BoilItem<A, B>>,
    reuse_a: bool,
    reuse_b: bool,
    seen_a: HashSet<A>,
    seen_b: HashSet<B>,
) -> (BoilItem<A, B>, Vec<BoilItem<A, B>>, HashSet<A>, HashSet<B>)
where
    A: Eq + Hash + Clone,
    B: Eq + Hash + Clone,
{
    let mut experiments: Vec<(f64, BoilItem<A, B>, Vec<BoilItem<A, B>>, HashSet<A>, HashSet<B>)> =
        Vec::with_capacity(connected.len());

    for i in (0..connected.len()).rev() {
        let mut siblings = connected.clone();
        let item = siblings.remove(i);

        if !reuse_a {
            siblings.retain(|m| m.value_a != item.value_a);
        }
        if !reuse_b {
            siblings.retain(|m| m.value_b != item.value_b);
        }

        // `siblings` all share `item.score`, which is >= every score in
        // `remaining_lower_scored` (those were strictly below the tied
        // batch), so appending keeps the list ascending.
        let mut experiment_matches = remaining_lower_scored.clone();
        experiment_matches.extend(siblings);

        let mut experiment_seen_a = seen_a.clone();
        let mut experiment_seen_b = seen_b.clone();
        experiment_seen_a.insert(item.value_a.clone());
        experiment_seen_b.insert(item.value_b.clone());

        let (experiment_results, final_seen_a, final_seen_b) = run(
            experiment_matches,
            reuse_a,
            reuse_b,
            experiment_seen_a,
            experiment_seen_b,
        );
        let experiment_score =
            item.score + experiment_results.iter().map(|m| m.score).sum::<f64>();

        experiments.push((experiment_score, item, experiment_results, final_seen_a, final_seen_b));
    }

    experiments.sort_by(|a, b| b.0.partial_cmp(&a.0).expect("scores are never NaN"));
    let (_, item, experiment_results, final_seen_a, final_seen_b) =
        experiments.into_iter().next().expect("connected has >= 2 items");
    (item, experiment_results, final_seen_a, final_seen_b)
}
