use anyhow::Context;

use crate::scoring::{FatigueWeights, MixWeights};

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetThresholds {
    pub cpa_excellent: f64,
    pub cpa_acceptable: f64,
    pub cpa_poor: f64,
    pub roas_excellent: f64,
    pub roas_good: f64,
    pub min_spend: f64,
    pub min_conversions: i64,
    /// Days a campaign must run before a pause is considered.
    pub min_days_for_pause: i32,
    pub increase_pct: f64,
    pub decrease_pct: f64,
    pub average_order_value: f64,
    /// Currency units → platform units (dollars → micros).
    pub platform_unit_multiplier: f64,
}

impl Default for BudgetThresholds {
    fn default() -> Self {
        Self {
            cpa_excellent: 8.0,
            cpa_acceptable: 12.0,
            cpa_poor: 15.0,
            roas_excellent: 3.0,
            roas_good: 2.0,
            min_spend: 50.0,
            min_conversions: 3,
            min_days_for_pause: 14,
            increase_pct: 25.0,
            decrease_pct: 20.0,
            average_order_value: 15.0,
            platform_unit_multiplier: 1_000_000.0,
        }
    }
}

/// Upper bounds (exclusive) of the fatigue status bands; scores at or above
/// `fatigued` are critical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusBands {
    pub healthy: i32,
    pub declining: i32,
    pub fatigued: i32,
}

impl Default for StatusBands {
    fn default() -> Self {
        Self {
            healthy: 25,
            declining: 50,
            fatigued: 75,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FatigueConfig {
    pub weights: FatigueWeights,
    pub bands: StatusBands,
    pub baseline_min_days: usize,
    pub baseline_min_impressions: i64,
    /// Trailing days averaged into the "current" rates.
    pub current_window_days: usize,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            weights: FatigueWeights::default(),
            bands: StatusBands::default(),
            baseline_min_days: 7,
            baseline_min_impressions: 1000,
            current_window_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixConfig {
    pub weights: MixWeights,
    pub min_content_for_confidence: i64,
    pub min_percentage: i32,
    pub max_percentage: i32,
    /// Floor for pillars without enough content to judge.
    pub exploration_percentage: i32,
    pub high_performer_ratio: f64,
    pub low_performer_ratio: f64,
    pub validity_days: i64,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            weights: MixWeights::default(),
            min_content_for_confidence: 5,
            min_percentage: 5,
            max_percentage: 40,
            exploration_percentage: 15,
            high_performer_ratio: 1.5,
            low_performer_ratio: 0.5,
            validity_days: 7,
        }
    }
}

/// Tunables for every engine. Built once per process and passed by reference
/// into each call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub budget: BudgetThresholds,
    pub fatigue: FatigueConfig,
    pub mix: MixConfig,
}

impl EngineConfig {
    /// Defaults overridden by any engine variables set in the environment. A
    /// variable that is set but does not parse is an error.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut out = Self::default();

        if let Some(v) = parse_override::<f64>("BUDGET_AVERAGE_ORDER_VALUE", &lookup)? {
            out.budget.average_order_value = v;
        }
        if let Some(v) = parse_override::<f64>("BUDGET_CPA_EXCELLENT", &lookup)? {
            out.budget.cpa_excellent = v;
        }
        if let Some(v) = parse_override::<f64>("BUDGET_CPA_ACCEPTABLE", &lookup)? {
            out.budget.cpa_acceptable = v;
        }
        if let Some(v) = parse_override::<f64>("BUDGET_CPA_POOR", &lookup)? {
            out.budget.cpa_poor = v;
        }
        if let Some(v) = parse_override::<f64>("BUDGET_MIN_SPEND", &lookup)? {
            out.budget.min_spend = v;
        }

        if let Some(v) = parse_override::<i32>("FATIGUE_BAND_HEALTHY", &lookup)? {
            out.fatigue.bands.healthy = v;
        }
        if let Some(v) = parse_override::<i32>("FATIGUE_BAND_DECLINING", &lookup)? {
            out.fatigue.bands.declining = v;
        }
        if let Some(v) = parse_override::<i32>("FATIGUE_BAND_FATIGUED", &lookup)? {
            out.fatigue.bands.fatigued = v;
        }
        if let Some(v) = parse_override::<i64>("FATIGUE_BASELINE_MIN_IMPRESSIONS", &lookup)? {
            out.fatigue.baseline_min_impressions = v;
        }

        if let Some(v) = parse_override::<i64>("MIX_MIN_CONTENT", &lookup)? {
            out.mix.min_content_for_confidence = v;
        }

        Ok(out)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let b = &self.fatigue.bands;
        anyhow::ensure!(
            0 < b.healthy && b.healthy < b.declining && b.declining < b.fatigued && b.fatigued <= 100,
            "fatigue bands must be increasing within 0..=100 (got {b:?})"
        );
        anyhow::ensure!(
            self.fatigue.baseline_min_days >= 1 && self.fatigue.current_window_days >= 1,
            "fatigue windows must be at least one day"
        );
        anyhow::ensure!(
            self.mix.min_percentage <= self.mix.max_percentage,
            "mix min_percentage exceeds max_percentage"
        );
        anyhow::ensure!(
            self.budget.cpa_excellent < self.budget.cpa_acceptable
                && self.budget.cpa_acceptable < self.budget.cpa_poor,
            "CPA thresholds must be increasing"
        );
        Ok(())
    }
}

fn parse_override<T>(key: &str, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let Some(raw) = lookup(key).filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .with_context(|| format!("invalid {key}: {raw}"))
}
