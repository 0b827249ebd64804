use crate::ads::{self, AdClientFactory};
use crate::domain::recommendation::{
    BudgetRecommendation, BudgetRecommendationRow, RecommendationStatus,
};
use crate::engine::budget::plan_application;
use crate::engine::config::BudgetThresholds;
use crate::error::{EngineError, EngineResult};
use crate::storage::lock::budget_batch_key;
use anyhow::Context;
use serde::Serialize;
use uuid::Uuid;

const SELECT_RECOMMENDATION: &str = "SELECT r.id, r.campaign_id, c.name AS campaign_name, \
     r.current_daily_budget, r.current_cpa, r.current_roas, r.current_spend_7d, \
     r.recommendation_type, r.recommended_daily_budget, r.recommended_change_percentage, \
     r.confidence_score, r.reasoning, r.projected_additional_spend, \
     r.projected_additional_conversions, r.projected_new_cpa, r.status, r.valid_until, r.created_at \
     FROM budget_recommendations r JOIN ad_campaigns c ON c.id = r.campaign_id";

fn decode(rows: Vec<BudgetRecommendationRow>) -> EngineResult<Vec<BudgetRecommendation>> {
    rows.into_iter()
        .map(|r| BudgetRecommendation::try_from(r).map_err(EngineError::from))
        .collect()
}

/// Supersedes the pending recommendations of every campaign in `recs` and
/// inserts `recs`, in one transaction. Batches for the same user are
/// serialised by a transaction-scoped advisory lock.
pub async fn replace_pending(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    recs: &[BudgetRecommendation],
) -> EngineResult<u64> {
    if recs.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(budget_batch_key(user_id))
        .execute(&mut *tx)
        .await
        .context("budget batch lock failed")?;

    let campaign_ids: Vec<Uuid> = recs.iter().map(|r| r.campaign_id).collect();
    let superseded = sqlx::query(
        "UPDATE budget_recommendations SET status = 'superseded' \
         WHERE user_id = $1 AND status = 'pending' AND campaign_id = ANY($2)",
    )
    .bind(user_id)
    .bind(&campaign_ids)
    .execute(&mut *tx)
    .await
    .context("supersede pending budget_recommendations failed")?
    .rows_affected();

    for rec in recs {
        insert(&mut tx, user_id, rec).await?;
    }

    tx.commit().await.context("commit transaction failed")?;

    tracing::info!(%user_id, inserted = recs.len(), superseded, "budget recommendations replaced");
    Ok(superseded)
}

async fn insert(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    rec: &BudgetRecommendation,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO budget_recommendations (id, user_id, campaign_id, current_daily_budget, current_cpa, \
         current_roas, current_spend_7d, recommendation_type, recommended_daily_budget, \
         recommended_change_percentage, confidence_score, reasoning, projected_additional_spend, \
         projected_additional_conversions, projected_new_cpa, status, valid_until, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 'pending', $16, $17)",
    )
    .bind(rec.id)
    .bind(user_id)
    .bind(rec.campaign_id)
    .bind(rec.current_daily_budget)
    .bind(rec.current_cpa)
    .bind(rec.current_roas)
    .bind(rec.current_spend_7d)
    .bind(rec.recommendation_type.as_str())
    .bind(rec.recommended_daily_budget)
    .bind(rec.recommended_change_percentage)
    .bind(rec.confidence_score)
    .bind(sqlx::types::Json(&rec.reasoning))
    .bind(rec.projected_additional_spend)
    .bind(rec.projected_additional_conversions)
    .bind(rec.projected_new_cpa)
    .bind(rec.valid_until)
    .bind(rec.created_at)
    .execute(&mut **tx)
    .await
    .context("insert budget_recommendations failed")?;
    Ok(())
}

pub async fn pending(pool: &sqlx::PgPool, user_id: Uuid) -> EngineResult<Vec<BudgetRecommendation>> {
    let rows: Vec<BudgetRecommendationRow> = sqlx::query_as(&format!(
        "{SELECT_RECOMMENDATION} WHERE r.user_id = $1 AND r.status = 'pending' \
         ORDER BY r.confidence_score DESC, r.created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select pending budget_recommendations failed")?;
    decode(rows)
}

pub async fn history(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    limit: i64,
) -> EngineResult<Vec<BudgetRecommendation>> {
    let rows: Vec<BudgetRecommendationRow> = sqlx::query_as(&format!(
        "{SELECT_RECOMMENDATION} WHERE r.user_id = $1 AND r.status <> 'pending' \
         ORDER BY r.created_at DESC LIMIT $2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select budget_recommendations history failed")?;
    decode(rows)
}

#[derive(Debug, Clone, Serialize)]
pub struct Applied {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub platform_campaign_id: String,
    pub action: Option<ads::PlatformAction>,
}

#[derive(sqlx::FromRow)]
struct LockedRecommendation {
    #[sqlx(flatten)]
    rec_row: BudgetRecommendationRow,
    platform_campaign_id: String,
}

/// Applies a pending recommendation on the ad platform.
///
/// The row is locked `FOR UPDATE` for the whole call, so of two concurrent
/// applies one waits and then sees a non-pending status. The platform call
/// happens inside the transaction: if it fails the transaction rolls back and
/// the recommendation stays pending.
pub async fn apply(
    pool: &sqlx::PgPool,
    ads_factory: &dyn AdClientFactory,
    cfg: &BudgetThresholds,
    user_id: Uuid,
    id: Uuid,
) -> EngineResult<Applied> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let locked: Option<LockedRecommendation> = sqlx::query_as(
        "SELECT r.id, r.campaign_id, c.name AS campaign_name, \
         r.current_daily_budget, r.current_cpa, r.current_roas, r.current_spend_7d, \
         r.recommendation_type, r.recommended_daily_budget, r.recommended_change_percentage, \
         r.confidence_score, r.reasoning, r.projected_additional_spend, \
         r.projected_additional_conversions, r.projected_new_cpa, r.status, r.valid_until, r.created_at, \
         c.platform_campaign_id \
         FROM budget_recommendations r JOIN ad_campaigns c ON c.id = r.campaign_id \
         WHERE r.id = $1 AND r.user_id = $2 FOR UPDATE OF r",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await
    .context("select budget_recommendation for update failed")?;

    let Some(locked) = locked else {
        return Err(EngineError::not_found("budget_recommendation", id));
    };
    let platform_campaign_id = locked.platform_campaign_id;
    let rec = BudgetRecommendation::try_from(locked.rec_row)?;

    if rec.status != RecommendationStatus::Pending {
        return Err(EngineError::already_processed(
            "budget_recommendation",
            id,
            rec.status,
        ));
    }

    let action = plan_application(&rec, cfg);
    if let Some(action) = action {
        let client = ads_factory.for_user(user_id).await?;
        ads::execute(client.as_ref(), &platform_campaign_id, action).await?;

        let campaign_update = if action == ads::PlatformAction::Pause {
            sqlx::query("UPDATE ad_campaigns SET status = 'PAUSED' WHERE id = $1")
                .bind(rec.campaign_id)
        } else {
            sqlx::query("UPDATE ad_campaigns SET daily_budget = $2 WHERE id = $1")
                .bind(rec.campaign_id)
                .bind(rec.recommended_daily_budget)
        };
        campaign_update
            .execute(&mut *tx)
            .await
            .context("update ad_campaigns after apply failed")?;
    }

    sqlx::query(
        "UPDATE budget_recommendations SET status = 'applied', user_action = 'approved', \
         user_action_at = now(), applied_at = now() WHERE id = $1",
    )
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("mark budget_recommendation applied failed")?;

    tx.commit().await.context("commit transaction failed")?;

    tracing::info!(%user_id, recommendation_id = %id, ?action, "budget recommendation applied");
    Ok(Applied {
        id,
        campaign_id: rec.campaign_id,
        platform_campaign_id,
        action,
    })
}

pub async fn reject(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    id: Uuid,
    reason: Option<&str>,
) -> EngineResult<()> {
    let updated = sqlx::query(
        "UPDATE budget_recommendations SET status = 'rejected', user_action = 'rejected', \
         user_action_at = now(), rejection_reason = $3 \
         WHERE id = $1 AND user_id = $2 AND status = 'pending'",
    )
    .bind(id)
    .bind(user_id)
    .bind(reason)
    .execute(pool)
    .await
    .context("reject budget_recommendation failed")?
    .rows_affected();

    if updated == 1 {
        return Ok(());
    }

    let status: Option<String> = sqlx::query_scalar(
        "SELECT status FROM budget_recommendations WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("select budget_recommendation status failed")?;

    Err(match status {
        Some(status) => EngineError::already_processed("budget_recommendation", id, status),
        None => EngineError::not_found("budget_recommendation", id),
    })
}
