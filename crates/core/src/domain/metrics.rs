use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-entity counters for one date, as written by the external collectors.
/// Engines only read these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetricSnapshot {
    pub entity_id: Uuid,
    pub as_of_date: NaiveDate,
    pub spend: f64,
    pub conversions: i64,
    pub clicks: i64,
    pub impressions: i64,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: i64,
}

impl MetricSnapshot {
    pub fn ctr(&self) -> f64 {
        ratio(self.clicks, self.impressions)
    }

    /// Clicks and saves over impressions.
    pub fn engagement_rate(&self) -> f64 {
        ratio(self.clicks + self.saves, self.impressions)
    }

    pub fn save_rate(&self) -> f64 {
        ratio(self.saves, self.impressions)
    }

    pub fn cpa(&self) -> Option<f64> {
        (self.conversions > 0).then(|| self.spend / self.conversions as f64)
    }
}

fn ratio(num: i64, den: i64) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Campaign-level view handed to the rule evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignMetrics {
    pub campaign_id: Uuid,
    pub platform_campaign_id: String,
    pub spend: f64,
    pub conversions: i64,
    pub clicks: i64,
    pub impressions: i64,
    pub days_active: i32,
    pub daily_budget: f64,
    /// Average order value used to derive ROAS.
    pub average_order_value: f64,
}

impl CampaignMetrics {
    /// `None` until the campaign has at least one conversion.
    pub fn cpa(&self) -> Option<f64> {
        (self.conversions > 0).then(|| self.spend / self.conversions as f64)
    }

    pub fn roas(&self) -> Option<f64> {
        (self.spend > 0.0)
            .then(|| self.conversions as f64 * self.average_order_value / self.spend)
    }

    pub fn ctr(&self) -> Option<f64> {
        (self.impressions > 0).then(|| self.clicks as f64 / self.impressions as f64)
    }

    pub fn conversion_rate(&self) -> Option<f64> {
        (self.clicks > 0).then(|| self.conversions as f64 / self.clicks as f64)
    }
}

/// Metrics a performance rule can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cpa,
    Roas,
    Ctr,
    ConversionRate,
    Spend,
    Conversions,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpa => "cpa",
            Self::Roas => "roas",
            Self::Ctr => "ctr",
            Self::ConversionRate => "conversion_rate",
            Self::Spend => "spend",
            Self::Conversions => "conversions",
        }
    }

    /// Reads the metric off a campaign. Ratios with an empty denominator are
    /// undefined and yield `None`.
    pub fn value(self, m: &CampaignMetrics) -> Option<f64> {
        match self {
            Self::Cpa => m.cpa(),
            Self::Roas => m.roas(),
            Self::Ctr => m.ctr(),
            Self::ConversionRate => m.conversion_rate(),
            Self::Spend => Some(m.spend),
            Self::Conversions => Some(m.conversions as f64),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "cpa" => Self::Cpa,
            "roas" => Self::Roas,
            "ctr" => Self::Ctr,
            "conversion_rate" => Self::ConversionRate,
            "spend" => Self::Spend,
            "conversions" => Self::Conversions,
            other => anyhow::bail!("unknown metric: {other}"),
        })
    }
}
