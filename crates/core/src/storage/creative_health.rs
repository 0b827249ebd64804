use crate::domain::creative::{
    ContentType, CreativeHealth, CreativeHealthRow, CreativeMetrics, HealthStatus,
};
use crate::engine::config::FatigueConfig;
use crate::engine::fatigue::{apply_daily_metrics, reset_for_refresh};
use crate::error::{EngineError, EngineResult};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

const HEALTH_COLUMNS: &str = "id, user_id, content_type, content_id, baseline_ctr, \
     baseline_engagement_rate, baseline_save_rate, baseline_impressions, baseline_captured_at, \
     current_ctr, current_engagement_rate, current_save_rate, current_impressions, \
     last_metrics_update, metrics_history, fatigue_score, status, days_active, days_since_baseline, \
     refresh_recommended, refresh_recommended_at, refresh_reason, last_refresh_at, refresh_count";

fn decode(rows: Vec<CreativeHealthRow>) -> EngineResult<Vec<CreativeHealth>> {
    rows.into_iter()
        .map(|r| CreativeHealth::try_from(r).map_err(EngineError::from))
        .collect()
}

async fn load_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    content_type: ContentType,
    content_id: &str,
) -> EngineResult<Option<CreativeHealth>> {
    let row: Option<CreativeHealthRow> = sqlx::query_as(&format!(
        "SELECT {HEALTH_COLUMNS} FROM creative_health \
         WHERE user_id = $1 AND content_type = $2 AND content_id = $3 FOR UPDATE"
    ))
    .bind(user_id)
    .bind(content_type.as_str())
    .bind(content_id)
    .fetch_optional(&mut **tx)
    .await
    .context("select creative_health failed")?;
    Ok(row.map(CreativeHealth::try_from).transpose()?)
}

async fn save(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    h: &CreativeHealth,
) -> anyhow::Result<()> {
    let b = h.baseline;
    let c = h.current;
    sqlx::query(
        "INSERT INTO creative_health (id, user_id, content_type, content_id, baseline_ctr, \
         baseline_engagement_rate, baseline_save_rate, baseline_impressions, baseline_captured_at, \
         current_ctr, current_engagement_rate, current_save_rate, current_impressions, \
         last_metrics_update, metrics_history, fatigue_score, status, days_active, days_since_baseline, \
         refresh_recommended, refresh_recommended_at, refresh_reason, last_refresh_at, refresh_count) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
         $19, $20, $21, $22, $23, $24) \
         ON CONFLICT (user_id, content_type, content_id) DO UPDATE SET \
           baseline_ctr = EXCLUDED.baseline_ctr, \
           baseline_engagement_rate = EXCLUDED.baseline_engagement_rate, \
           baseline_save_rate = EXCLUDED.baseline_save_rate, \
           baseline_impressions = EXCLUDED.baseline_impressions, \
           baseline_captured_at = EXCLUDED.baseline_captured_at, \
           current_ctr = EXCLUDED.current_ctr, \
           current_engagement_rate = EXCLUDED.current_engagement_rate, \
           current_save_rate = EXCLUDED.current_save_rate, \
           current_impressions = EXCLUDED.current_impressions, \
           last_metrics_update = EXCLUDED.last_metrics_update, \
           metrics_history = EXCLUDED.metrics_history, \
           fatigue_score = EXCLUDED.fatigue_score, \
           status = EXCLUDED.status, \
           days_active = EXCLUDED.days_active, \
           days_since_baseline = EXCLUDED.days_since_baseline, \
           refresh_recommended = EXCLUDED.refresh_recommended, \
           refresh_recommended_at = EXCLUDED.refresh_recommended_at, \
           refresh_reason = EXCLUDED.refresh_reason, \
           last_refresh_at = EXCLUDED.last_refresh_at, \
           refresh_count = EXCLUDED.refresh_count, \
           updated_at = now()",
    )
    .bind(h.id)
    .bind(h.user_id)
    .bind(h.content_type.as_str())
    .bind(&h.content_id)
    .bind(b.map(|b| b.ctr))
    .bind(b.map(|b| b.engagement_rate))
    .bind(b.map(|b| b.save_rate))
    .bind(b.map(|b| b.impressions))
    .bind(b.map(|b| b.captured_at))
    .bind(c.map(|c| c.ctr))
    .bind(c.map(|c| c.engagement_rate))
    .bind(c.map(|c| c.save_rate))
    .bind(c.map(|c| c.impressions))
    .bind(h.last_metrics_update)
    .bind(sqlx::types::Json(&h.metrics_history))
    .bind(h.fatigue_score)
    .bind(h.status.as_str())
    .bind(h.days_active)
    .bind(h.days_since_baseline)
    .bind(h.refresh_recommended)
    .bind(h.refresh_recommended_at)
    .bind(&h.refresh_reason)
    .bind(h.last_refresh_at)
    .bind(h.refresh_count)
    .execute(&mut **tx)
    .await
    .context("upsert creative_health failed")?;
    Ok(())
}

/// Read-modify-write of one record under a row lock, creating it on first
/// sight.
pub async fn update_creative_health(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    content_type: ContentType,
    content_id: &str,
    date: NaiveDate,
    metrics: CreativeMetrics,
    cfg: &FatigueConfig,
) -> EngineResult<CreativeHealth> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut health = load_for_update(&mut tx, user_id, content_type, content_id)
        .await?
        .unwrap_or_else(|| CreativeHealth::new(user_id, content_type, content_id));
    let before = health.status;

    apply_daily_metrics(&mut health, date, metrics, cfg, Utc::now());
    save(&mut tx, &health).await?;
    tx.commit().await.context("commit transaction failed")?;

    if health.status != before {
        tracing::info!(
            %user_id,
            content_id,
            from = before.as_str(),
            to = health.status.as_str(),
            fatigue_score = health.fatigue_score,
            "creative health status changed"
        );
    }
    Ok(health)
}

pub async fn mark_refreshed(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    content_type: ContentType,
    content_id: &str,
) -> EngineResult<CreativeHealth> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    let Some(mut health) = load_for_update(&mut tx, user_id, content_type, content_id).await? else {
        return Err(EngineError::not_found(
            "creative_health",
            format!("{content_type}/{content_id}"),
        ));
    };

    reset_for_refresh(&mut health, Utc::now());
    save(&mut tx, &health).await?;
    tx.commit().await.context("commit transaction failed")?;

    tracing::info!(%user_id, content_id, refresh_count = health.refresh_count, "creative refreshed");
    Ok(health)
}

pub async fn get(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    content_type: ContentType,
    content_id: &str,
) -> EngineResult<CreativeHealth> {
    let row: Option<CreativeHealthRow> = sqlx::query_as(&format!(
        "SELECT {HEALTH_COLUMNS} FROM creative_health \
         WHERE user_id = $1 AND content_type = $2 AND content_id = $3"
    ))
    .bind(user_id)
    .bind(content_type.as_str())
    .bind(content_id)
    .fetch_optional(pool)
    .await
    .context("select creative_health failed")?;

    match row {
        Some(row) => Ok(CreativeHealth::try_from(row)?),
        None => Err(EngineError::not_found(
            "creative_health",
            format!("{content_type}/{content_id}"),
        )),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub content_type: Option<ContentType>,
    pub status: Option<HealthStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Records ordered by fatigue score, worst first, plus the total count.
pub async fn list(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    filter: &ListFilter,
) -> EngineResult<(Vec<CreativeHealth>, i64)> {
    let rows: Vec<CreativeHealthRow> = sqlx::query_as(&format!(
        "SELECT {HEALTH_COLUMNS} FROM creative_health \
         WHERE user_id = $1 AND ($2::text IS NULL OR content_type = $2) \
           AND ($3::text IS NULL OR status = $3) \
         ORDER BY fatigue_score DESC, content_id LIMIT $4 OFFSET $5"
    ))
    .bind(user_id)
    .bind(filter.content_type.map(ContentType::as_str))
    .bind(filter.status.map(HealthStatus::as_str))
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await
    .context("select creative_health failed")?;

    let total: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM creative_health \
         WHERE user_id = $1 AND ($2::text IS NULL OR content_type = $2) \
           AND ($3::text IS NULL OR status = $3)",
    )
    .bind(user_id)
    .bind(filter.content_type.map(ContentType::as_str))
    .bind(filter.status.map(HealthStatus::as_str))
    .fetch_one(pool)
    .await
    .context("count creative_health failed")?;

    Ok((decode(rows)?, total))
}

pub async fn all_for_user(pool: &sqlx::PgPool, user_id: Uuid) -> EngineResult<Vec<CreativeHealth>> {
    let rows: Vec<CreativeHealthRow> = sqlx::query_as(&format!(
        "SELECT {HEALTH_COLUMNS} FROM creative_health WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select creative_health failed")?;
    decode(rows)
}

pub async fn fatigued(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    min_score: i32,
) -> EngineResult<Vec<CreativeHealth>> {
    let rows: Vec<CreativeHealthRow> = sqlx::query_as(&format!(
        "SELECT {HEALTH_COLUMNS} FROM creative_health \
         WHERE user_id = $1 AND fatigue_score >= $2 ORDER BY fatigue_score DESC"
    ))
    .bind(user_id)
    .bind(min_score)
    .fetch_all(pool)
    .await
    .context("select fatigued creative_health failed")?;
    decode(rows)
}

/// Content flagged for refresh, longest-waiting first.
pub async fn refresh_queue(pool: &sqlx::PgPool, user_id: Uuid) -> EngineResult<Vec<CreativeHealth>> {
    let rows: Vec<CreativeHealthRow> = sqlx::query_as(&format!(
        "SELECT {HEALTH_COLUMNS} FROM creative_health \
         WHERE user_id = $1 AND refresh_recommended ORDER BY refresh_recommended_at ASC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select refresh queue failed")?;
    decode(rows)
}
