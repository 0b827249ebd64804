use crate::domain::rule::Action;
use crate::engine::rules::PlannedChange;
use anyhow::Context;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Pending,
    Applied,
    Failed,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Failed => "failed",
        }
    }
}

fn values(change: Option<PlannedChange>) -> (Option<serde_json::Value>, Option<serde_json::Value>) {
    match change {
        Some(PlannedChange::DailyBudget { from, to }) => (
            Some(json!({ "daily_budget": from })),
            Some(json!({ "daily_budget": to })),
        ),
        Some(PlannedChange::Pause) => (
            Some(json!({ "status": "ACTIVE" })),
            Some(json!({ "status": "PAUSED" })),
        ),
        None => (None, None),
    }
}

/// Audit row for one rule-driven action.
pub async fn record(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    action: &Action,
    change: Option<PlannedChange>,
    status: ActionStatus,
    error_message: Option<&str>,
) -> anyhow::Result<Uuid> {
    let (previous_value, new_value) = values(change);
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO performance_actions (user_id, rule_id, campaign_id, action_type, previous_value, \
         new_value, metrics_snapshot, status, requires_approval, error_message, executed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, CASE WHEN $8 = 'applied' THEN now() END) \
         RETURNING id",
    )
    .bind(user_id)
    .bind(action.rule_id)
    .bind(action.campaign_id)
    .bind(action.action_type.as_str())
    .bind(previous_value)
    .bind(new_value)
    .bind(sqlx::types::Json(&action.metrics_snapshot))
    .bind(status.as_str())
    .bind(status == ActionStatus::Pending)
    .bind(error_message)
    .fetch_one(pool)
    .await
    .context("insert performance_actions failed")?;
    Ok(id)
}

/// Mirrors an applied change onto the local campaign row.
pub async fn apply_locally(
    pool: &sqlx::PgPool,
    campaign_id: Uuid,
    change: PlannedChange,
) -> anyhow::Result<()> {
    let q = match change {
        PlannedChange::DailyBudget { to, .. } => {
            sqlx::query("UPDATE ad_campaigns SET daily_budget = $2 WHERE id = $1")
                .bind(campaign_id)
                .bind(to)
        }
        PlannedChange::Pause => {
            sqlx::query("UPDATE ad_campaigns SET status = 'PAUSED' WHERE id = $1").bind(campaign_id)
        }
    };
    q.execute(pool)
        .await
        .context("update ad_campaigns failed")?;
    Ok(())
}

pub async fn set_winner(pool: &sqlx::PgPool, campaign_id: Uuid, is_winner: bool) -> anyhow::Result<()> {
    sqlx::query("UPDATE ad_campaigns SET is_winner = $2 WHERE id = $1")
        .bind(campaign_id)
        .bind(is_winner)
        .execute(pool)
        .await
        .context("update ad_campaigns.is_winner failed")?;
    Ok(())
}
