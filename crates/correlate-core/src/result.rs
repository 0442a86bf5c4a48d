//! The result object (C6): matches, unmatched residuals, and score
//! normalization.

/// A single pairing between a value from dataset A and dataset B.
#[derive(Debug, Clone, PartialEq)]
pub struct Match<V> {
    pub value_a: V,
    pub value_b: V,
    pub score: f64,
}

/// The outcome of a `correlate()` call: matches sorted highest-score
/// first, plus the values from each side that were not matched.
#[derive(Debug, Clone)]
pub struct CorrelateResult<V> {
    pub matches: Vec<Match<V>>,
    pub unmatched_a: Vec<V>,
    pub unmatched_b: Vec<V>,
    pub minimum_score: f64,
}

impl<V> CorrelateResult<V> {
    /// Rescale every match's score into `[0, 1]` in place:
    /// `score' = (score - low) / (high - low)`. `high` defaults to the top
    /// match's score, `low` defaults to `minimum_score`. If the resulting
    /// range is degenerate (`high == low`), scores are left at `0.0`
    /// rather than dividing by zero.
    pub fn normalize(&mut self, high: Option<f64>, low: Option<f64>) {
        let high = high.unwrap_or_else(|| {
            self.matches
                .first()
                .map_or(self.minimum_score, |m| m.score)
        });
        let low = low.unwrap_or(self.minimum_score);
        let range = high - low;

        for m in &mut self.matches {
            m.score = if range == 0.0 {
                0.0
            } else {
                (m.score - low) / range
            };
        }
    }
}
