use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Increase,
    Decrease,
    Pause,
    Maintain,
    TestIncrease,
    FlagWinner,
}

impl RecommendationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Pause => "pause",
            Self::Maintain => "maintain",
            Self::TestIncrease => "test_increase",
            Self::FlagWinner => "flag_winner",
        }
    }

    /// Types whose application changes the daily budget on the platform.
    pub fn is_budget_change(self) -> bool {
        matches!(self, Self::Increase | Self::Decrease | Self::TestIncrease)
    }
}

impl std::str::FromStr for RecommendationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "increase" => Self::Increase,
            "decrease" => Self::Decrease,
            "pause" => Self::Pause,
            "maintain" => Self::Maintain,
            "test_increase" => Self::TestIncrease,
            "flag_winner" => Self::FlagWinner,
            other => anyhow::bail!("unknown recommendation_type: {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Pending,
    Applied,
    Rejected,
    Superseded,
}

impl RecommendationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
            Self::Superseded => "superseded",
        }
    }
}

impl fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecommendationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "pending" => Self::Pending,
            "applied" => Self::Applied,
            "rejected" => Self::Rejected,
            "superseded" => Self::Superseded,
            other => anyhow::bail!("unknown recommendation status: {other}"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    pub primary: String,
    pub supporting: Vec<String>,
    pub risks: Vec<String>,
}

/// Spend caps configured by the user. Missing caps are never checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Guardrails {
    #[serde(default)]
    pub weekly_cap: Option<f64>,
    #[serde(default)]
    pub monthly_cap: Option<f64>,
}

/// Trailing seven-day view of one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CampaignPerformance {
    pub id: Uuid,
    pub platform_campaign_id: String,
    pub name: String,
    pub daily_budget: f64,
    pub spend_7d: f64,
    pub conversions_7d: i64,
    pub clicks_7d: i64,
    pub impressions_7d: i64,
    pub days_active: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRecommendation {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub current_daily_budget: f64,
    pub current_cpa: Option<f64>,
    pub current_roas: Option<f64>,
    pub current_spend_7d: f64,
    pub recommendation_type: RecommendationType,
    pub recommended_daily_budget: f64,
    pub recommended_change_percentage: f64,
    pub confidence_score: i32,
    pub reasoning: Reasoning,
    pub projected_additional_spend: f64,
    pub projected_additional_conversions: Option<i64>,
    pub projected_new_cpa: Option<f64>,
    pub status: RecommendationStatus,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BudgetRecommendationRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub current_daily_budget: f64,
    pub current_cpa: Option<f64>,
    pub current_roas: Option<f64>,
    pub current_spend_7d: f64,
    pub recommendation_type: String,
    pub recommended_daily_budget: f64,
    pub recommended_change_percentage: f64,
    pub confidence_score: i32,
    pub reasoning: sqlx::types::Json<Reasoning>,
    pub projected_additional_spend: f64,
    pub projected_additional_conversions: Option<i64>,
    pub projected_new_cpa: Option<f64>,
    pub status: String,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<BudgetRecommendationRow> for BudgetRecommendation {
    type Error = anyhow::Error;

    fn try_from(row: BudgetRecommendationRow) -> anyhow::Result<Self> {
        Ok(Self {
            id: row.id,
            campaign_id: row.campaign_id,
            campaign_name: row.campaign_name,
            current_daily_budget: row.current_daily_budget,
            current_cpa: row.current_cpa,
            current_roas: row.current_roas,
            current_spend_7d: row.current_spend_7d,
            recommendation_type: row.recommendation_type.parse()?,
            recommended_daily_budget: row.recommended_daily_budget,
            recommended_change_percentage: row.recommended_change_percentage,
            confidence_score: row.confidence_score,
            reasoning: row.reasoning.0,
            projected_additional_spend: row.projected_additional_spend,
            projected_additional_conversions: row.projected_additional_conversions,
            projected_new_cpa: row.projected_new_cpa,
            status: row.status.parse()?,
            valid_until: row.valid_until,
            created_at: row.created_at,
        })
    }
}
