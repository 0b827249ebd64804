//! Shared scoring helpers: weighted composites, decline from a baseline and
//! the evidence-based confidence used by the budget recommender.

use serde::{Deserialize, Serialize};

/// Arithmetic mean; 0 for an empty input.
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Σ value × weight.
pub fn weighted_sum(components: &[(f64, f64)]) -> f64 {
    components.iter().map(|(v, w)| v * w).sum()
}

/// Fractional drop from `baseline` to `current`, floored at 0. A zero baseline
/// cannot decline.
pub fn decline(baseline: f64, current: f64) -> f64 {
    if baseline <= 0.0 {
        return 0.0;
    }
    ((baseline - current) / baseline).max(0.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub ctr: f64,
    pub engagement_rate: f64,
    pub save_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FatigueWeights {
    pub ctr: f64,
    pub engagement: f64,
    pub save_rate: f64,
}

impl Default for FatigueWeights {
    fn default() -> Self {
        Self {
            ctr: 0.5,
            engagement: 0.3,
            save_rate: 0.2,
        }
    }
}

/// Weighted decline of the three rates scaled to 0..=100.
pub fn fatigue_score(baseline: Rates, current: Rates, weights: &FatigueWeights) -> i32 {
    let raw = weighted_sum(&[
        (decline(baseline.ctr, current.ctr), weights.ctr),
        (
            decline(baseline.engagement_rate, current.engagement_rate),
            weights.engagement,
        ),
        (decline(baseline.save_rate, current.save_rate), weights.save_rate),
    ]);
    ((raw * 100.0).round() as i32).clamp(0, 100)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixWeights {
    pub ctr: f64,
    pub save_rate: f64,
    pub winner_rate: f64,
}

impl Default for MixWeights {
    fn default() -> Self {
        Self {
            ctr: 0.3,
            save_rate: 0.4,
            winner_rate: 0.3,
        }
    }
}

/// `ctr` and `save_rate` are fractions, `winner_percentage` is already 0..=100.
pub fn pillar_score(ctr: f64, save_rate: f64, winner_percentage: f64, weights: &MixWeights) -> f64 {
    weighted_sum(&[
        (ctr * 100.0, weights.ctr),
        (save_rate * 100.0, weights.save_rate),
        (winner_percentage, weights.winner_rate),
    ])
}

/// Confidence in a budget recommendation from how much evidence backs it.
pub fn evidence_confidence(days_active: i32, conversions: i64) -> i32 {
    let mut score = 50;

    if days_active >= 14 {
        score += 20;
    } else if days_active >= 7 {
        score += 10;
    }

    if conversions >= 10 {
        score += 20;
    } else if conversions >= 5 {
        score += 10;
    } else if conversions >= 3 {
        score += 5;
    }

    // Consistency is not measured yet; every campaign gets the bonus.
    score += 10;

    score.min(100)
}

/// `base + 2 * count`, capped.
pub fn volume_confidence(base: i32, count: i64, cap: i32) -> i32 {
    let bonus = count.saturating_mul(2).min(i64::from(cap));
    (base + bonus as i32).min(cap)
}
