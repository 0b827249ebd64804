use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentPillar {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Static default share of the content mix.
    pub recommended_percentage: i32,
    pub display_order: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Week,
    Month,
    Quarter,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
        }
    }
}

impl std::str::FromStr for PeriodType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "week" => Self::Week,
            "month" => Self::Month,
            "quarter" => Self::Quarter,
            other => anyhow::bail!("unknown period type: {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub period_type: PeriodType,
    pub start: NaiveDate,
}

/// Aggregates for one pillar over one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PillarPerformance {
    pub pillar_id: Uuid,
    pub content_count: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub saves: i64,
    pub avg_ctr: Option<f64>,
    pub avg_save_rate: Option<f64>,
    pub winner_count: i64,
    pub winner_percentage: Option<f64>,
    pub current_percentage: Option<f64>,
}

/// Period totals for one published content item, tagged with its pillar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentItemMetrics {
    pub content_id: Uuid,
    pub pillar_id: Option<Uuid>,
    pub impressions: i64,
    pub clicks: i64,
    pub saves: i64,
    pub is_winner: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixReasoning {
    pub primary: String,
    pub factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixRecommendation {
    pub pillar_id: Uuid,
    pub pillar_name: String,
    pub platform: String,
    pub recommended_percentage: i32,
    pub current_percentage: Option<i32>,
    pub reasoning: MixReasoning,
    pub confidence_score: i32,
    pub generated_at: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MixRecommendationRow {
    pub pillar_id: Uuid,
    pub pillar_name: String,
    pub platform: String,
    pub recommended_percentage: i32,
    pub current_percentage: Option<i32>,
    pub reasoning: sqlx::types::Json<MixReasoning>,
    pub confidence_score: i32,
    pub generated_at: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl From<MixRecommendationRow> for MixRecommendation {
    fn from(row: MixRecommendationRow) -> Self {
        Self {
            pillar_id: row.pillar_id,
            pillar_name: row.pillar_name,
            platform: row.platform,
            recommended_percentage: row.recommended_percentage,
            current_percentage: row.current_percentage,
            reasoning: row.reasoning.0,
            confidence_score: row.confidence_score,
            generated_at: row.generated_at,
            valid_until: row.valid_until,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapDirection {
    Increase,
    Decrease,
    Maintain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapAction {
    pub pillar_id: Uuid,
    pub pillar_name: String,
    pub action: GapDirection,
    pub gap: i32,
    pub priority: Priority,
    pub suggestion: String,
}
