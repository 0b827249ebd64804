use crate::domain::metrics::{CampaignMetrics, Metric};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "comparison", rename_all = "snake_case")]
pub enum Comparison {
    Lt { threshold: f64 },
    Lte { threshold: f64 },
    Gt { threshold: f64 },
    Gte { threshold: f64 },
    /// Inclusive at both ends.
    Between { min: f64, max: f64 },
}

impl Comparison {
    pub fn matches(self, value: f64) -> bool {
        match self {
            Self::Lt { threshold } => value < threshold,
            Self::Lte { threshold } => value <= threshold,
            Self::Gt { threshold } => value > threshold,
            Self::Gte { threshold } => value >= threshold,
            Self::Between { min, max } => min <= value && value <= max,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt { .. } => "lt",
            Self::Lte { .. } => "lte",
            Self::Gt { .. } => "gt",
            Self::Gte { .. } => "gte",
            Self::Between { .. } => "between",
        }
    }

    /// Column layout used by `performance_rules`: (threshold_value, threshold_min, threshold_max).
    pub fn thresholds(self) -> (Option<f64>, Option<f64>, Option<f64>) {
        match self {
            Self::Lt { threshold }
            | Self::Lte { threshold }
            | Self::Gt { threshold }
            | Self::Gte { threshold } => (Some(threshold), None, None),
            Self::Between { min, max } => (None, Some(min), Some(max)),
        }
    }

    fn from_columns(
        comparison: &str,
        value: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    ) -> anyhow::Result<Self> {
        let single = || value.with_context(|| format!("{comparison} rule needs threshold_value"));
        Ok(match comparison {
            "lt" | "less_than" => Self::Lt { threshold: single()? },
            "lte" => Self::Lte { threshold: single()? },
            "gt" | "greater_than" => Self::Gt { threshold: single()? },
            "gte" => Self::Gte { threshold: single()? },
            "between" => {
                let min = min.context("between rule needs threshold_min")?;
                let max = max.context("between rule needs threshold_max")?;
                anyhow::ensure!(min <= max, "threshold_min {min} exceeds threshold_max {max}");
                Self::Between { min, max }
            }
            other => anyhow::bail!("unknown comparison: {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    IncreaseBudget,
    DecreaseBudget,
    Pause,
    FlagWinner,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncreaseBudget => "increase_budget",
            Self::DecreaseBudget => "decrease_budget",
            Self::Pause => "pause",
            Self::FlagWinner => "flag_winner",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "increase_budget" => Self::IncreaseBudget,
            "decrease_budget" => Self::DecreaseBudget,
            "pause" => Self::Pause,
            "flag_winner" => Self::FlagWinner,
            other => anyhow::bail!("unknown action_type: {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_daily: Option<f64>,
}

/// Minimum evidence a campaign needs before a rule is considered at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGuard {
    pub min_spend: f64,
    pub min_days_active: i32,
    pub min_conversions: i64,
}

impl RuleGuard {
    pub fn admits(&self, m: &CampaignMetrics) -> bool {
        m.spend >= self.min_spend
            && m.days_active >= self.min_days_active
            && m.conversions >= self.min_conversions
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
    pub metric: Metric,
    #[serde(flatten)]
    pub comparison: Comparison,
    pub action_type: ActionType,
    #[serde(default)]
    pub action_config: ActionConfig,
    pub guard: RuleGuard,
    pub priority: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RuleRow {
    pub id: Uuid,
    pub name: String,
    pub metric: String,
    pub comparison: String,
    pub threshold_value: Option<f64>,
    pub threshold_min: Option<f64>,
    pub threshold_max: Option<f64>,
    pub action_type: String,
    pub action_config: serde_json::Value,
    pub min_spend: f64,
    pub min_days_active: i32,
    pub min_conversions: i64,
    pub priority: i32,
}

impl TryFrom<RuleRow> for Rule {
    type Error = anyhow::Error;

    fn try_from(row: RuleRow) -> anyhow::Result<Self> {
        let comparison = Comparison::from_columns(
            &row.comparison,
            row.threshold_value,
            row.threshold_min,
            row.threshold_max,
        )
        .with_context(|| format!("invalid thresholds on rule {}", row.id))?;
        let action_config = if row.action_config.is_null() {
            ActionConfig::default()
        } else {
            serde_json::from_value(row.action_config)
                .with_context(|| format!("invalid action_config on rule {}", row.id))?
        };

        Ok(Self {
            id: row.id,
            name: row.name,
            metric: row.metric.parse()?,
            comparison,
            action_type: row.action_type.parse()?,
            action_config,
            guard: RuleGuard {
                min_spend: row.min_spend,
                min_days_active: row.min_days_active,
                min_conversions: row.min_conversions,
            },
            priority: row.priority,
        })
    }
}

/// A matched, non-winner rule for one campaign. Persisting or applying it is
/// the caller's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub rule_id: Uuid,
    pub campaign_id: Uuid,
    pub platform_campaign_id: String,
    pub action_type: ActionType,
    pub action_config: ActionConfig,
    pub metrics_snapshot: CampaignMetrics,
    pub current_budget: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub actions: Vec<Action>,
    pub is_winner: bool,
}

/// Rules a new account starts with.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: Uuid::new_v4(),
            name: "Scale Winners (CPA < $8)".to_string(),
            metric: Metric::Cpa,
            comparison: Comparison::Lt { threshold: 8.0 },
            action_type: ActionType::IncreaseBudget,
            action_config: ActionConfig {
                percentage: Some(25.0),
                max_daily: Some(50.0),
            },
            guard: RuleGuard {
                min_spend: 50.0,
                min_days_active: 7,
                min_conversions: 5,
            },
            priority: 1,
        },
        Rule {
            id: Uuid::new_v4(),
            name: "Flag Winners (ROAS > 3)".to_string(),
            metric: Metric::Roas,
            comparison: Comparison::Gt { threshold: 3.0 },
            action_type: ActionType::FlagWinner,
            action_config: ActionConfig::default(),
            guard: RuleGuard {
                min_spend: 50.0,
                min_days_active: 7,
                min_conversions: 3,
            },
            priority: 2,
        },
        Rule {
            id: Uuid::new_v4(),
            name: "Reduce Budget (CPA $12-15)".to_string(),
            metric: Metric::Cpa,
            comparison: Comparison::Between {
                min: 12.0,
                max: 15.0,
            },
            action_type: ActionType::DecreaseBudget,
            action_config: ActionConfig {
                percentage: Some(20.0),
                max_daily: None,
            },
            guard: RuleGuard {
                min_spend: 75.0,
                min_days_active: 14,
                min_conversions: 3,
            },
            priority: 5,
        },
        Rule {
            id: Uuid::new_v4(),
            name: "Pause Underperformers (CPA > $15)".to_string(),
            metric: Metric::Cpa,
            comparison: Comparison::Gt { threshold: 15.0 },
            action_type: ActionType::Pause,
            action_config: ActionConfig::default(),
            guard: RuleGuard {
                min_spend: 75.0,
                min_days_active: 14,
                min_conversions: 0,
            },
            priority: 10,
        },
    ]
}
