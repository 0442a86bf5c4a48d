//! Tuning parameters for `Engine::correlate`, following the
//! `#[serde(default = "fn")]` + matching `impl Default` pattern used
//! throughout the workspace's config structs (see `bones-core`'s
//! `SearchConfig` and `bones-search`'s own `SearchConfig`).

use serde::{Deserialize, Serialize};

/// Which rank-based channels `correlate()` should compute.
///
/// A direct translation of the source system's `CorrelatorRankingApproach`
/// enumeration, dropping its numeric discriminants (nothing serializes
/// this as a raw integer; the string form is the idiomatic default here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingApproach {
    /// Compute both the absolute and relative channels and keep whichever
    /// scores higher.
    Best,
    /// Compute only the absolute-distance channel.
    Absolute,
    /// Compute only the relative-distance channel.
    Relative,
}

impl Default for RankingApproach {
    fn default() -> Self {
        Self::Best
    }
}

/// Tuning parameters for [`crate::engine::Engine::correlate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelateOptions {
    /// Drop matches at or below this raw score. Must be `>= 0`.
    #[serde(default = "default_minimum_score")]
    pub minimum_score: f64,

    /// Multiplier for the key-coverage ("ratio") bonus; `0` disables it.
    #[serde(default = "default_score_ratio_bonus")]
    pub score_ratio_bonus: f64,

    /// Which rank channel(s) to compute when ranking is in effect.
    #[serde(default)]
    pub ranking: RankingApproach,

    /// Additive ranking-proximity bonus. Mutually exclusive with
    /// `ranking_factor` — supplying both is an `InvalidArgument` error.
    #[serde(default)]
    pub ranking_bonus: f64,

    /// Multiplicative ranking-proximity interpolation, in `[0, 1]`.
    /// Mutually exclusive with `ranking_bonus`.
    #[serde(default)]
    pub ranking_factor: f64,

    /// Base for the per-round key-reuse discount (`factor.powi(round)`).
    /// Defaults to `1.0` (no discount).
    ///
    /// Kept for compatibility with the system this engine's design was
    /// distilled from, even though rounds already encode redundancy and
    /// this factor risks double-discounting it; see `DESIGN.md`'s Open
    /// Question 1 for the full reasoning. New callers that don't need
    /// backward-compatible scores should leave this at its default.
    #[serde(default = "default_key_reuse_penalty_factor")]
    pub key_reuse_penalty_factor: f64,

    /// Permit a value from dataset A to appear in more than one match.
    #[serde(default)]
    pub reuse_a: bool,

    /// Permit a value from dataset B to appear in more than one match.
    #[serde(default)]
    pub reuse_b: bool,
}

impl Default for CorrelateOptions {
    fn default() -> Self {
        Self {
            minimum_score: default_minimum_score(),
            score_ratio_bonus: default_score_ratio_bonus(),
            ranking: RankingApproach::default(),
            ranking_bonus: 0.0,
            ranking_factor: 0.0,
            key_reuse_penalty_factor: default_key_reuse_penalty_factor(),
            reuse_a: false,
            reuse_b: false,
        }
    }
}

const fn default_minimum_score() -> f64 {
    0.0
}

const fn default_score_ratio_bonus() -> f64 {
    1.0
}

const fn default_key_reuse_penalty_factor() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let opts = CorrelateOptions::default();
        assert_eq!(opts.minimum_score, 0.0);
        assert_eq!(opts.score_ratio_bonus, 1.0);
        assert_eq!(opts.ranking, RankingApproach::Best);
        assert_eq!(opts.ranking_bonus, 0.0);
        assert_eq!(opts.ranking_factor, 0.0);
        assert_eq!(opts.key_reuse_penalty_factor, 1.0);
        assert!(!opts.reuse_a);
        assert!(!opts.reuse_b);
    }

    #[test]
    fn deserializes_from_a_partial_document() {
        let opts: CorrelateOptions = serde_json::from_str(r#"{"minimum_score": 0.2}"#)
            .expect("partial document should fill in defaults");
        assert_eq!(opts.minimum_score, 0.2);
        assert_eq!(opts.score_ratio_bonus, 1.0);
    }
}
