use crate::domain::pillar::{
    ContentPillar, MixRecommendation, MixRecommendationRow, Period, PeriodType, PillarPerformance,
};
use crate::engine::content_mix::PLATFORM;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

pub async fn pillars(pool: &sqlx::PgPool) -> anyhow::Result<Vec<ContentPillar>> {
    sqlx::query_as(
        "SELECT id, name, description, recommended_percentage, display_order \
         FROM content_pillars ORDER BY display_order",
    )
    .fetch_all(pool)
    .await
    .context("select content_pillars failed")
}

/// Idempotent per (user, pillar, platform, period).
pub async fn upsert_performance(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    period: Period,
    rows: &[PillarPerformance],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    for p in rows {
        sqlx::query(
            "INSERT INTO content_pillar_performance (user_id, pillar_id, platform, period_type, \
             period_start, content_count, impressions, clicks, saves, avg_ctr, avg_save_rate, \
             winner_count, winner_percentage, current_percentage) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (user_id, pillar_id, platform, period_type, period_start) DO UPDATE SET \
               content_count = EXCLUDED.content_count, \
               impressions = EXCLUDED.impressions, \
               clicks = EXCLUDED.clicks, \
               saves = EXCLUDED.saves, \
               avg_ctr = EXCLUDED.avg_ctr, \
               avg_save_rate = EXCLUDED.avg_save_rate, \
               winner_count = EXCLUDED.winner_count, \
               winner_percentage = EXCLUDED.winner_percentage, \
               current_percentage = EXCLUDED.current_percentage, \
               updated_at = now()",
        )
        .bind(user_id)
        .bind(p.pillar_id)
        .bind(PLATFORM)
        .bind(period.period_type.as_str())
        .bind(period.start)
        .bind(p.content_count)
        .bind(p.impressions)
        .bind(p.clicks)
        .bind(p.saves)
        .bind(p.avg_ctr)
        .bind(p.avg_save_rate)
        .bind(p.winner_count)
        .bind(p.winner_percentage)
        .bind(p.current_percentage)
        .execute(&mut *tx)
        .await
        .context("upsert content_pillar_performance failed")?;
    }
    tx.commit().await.context("commit transaction failed")?;
    Ok(())
}

const PERFORMANCE_COLUMNS: &str = "pillar_id, content_count, impressions, clicks, saves, avg_ctr, \
     avg_save_rate, winner_count, winner_percentage, current_percentage";

/// Rows of the most recent stored period of the given type.
pub async fn latest_performance(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    period_type: PeriodType,
) -> anyhow::Result<(Option<Period>, Vec<PillarPerformance>)> {
    let start: Option<NaiveDate> = sqlx::query_scalar(
        "SELECT max(period_start) FROM content_pillar_performance \
         WHERE user_id = $1 AND platform = $2 AND period_type = $3",
    )
    .bind(user_id)
    .bind(PLATFORM)
    .bind(period_type.as_str())
    .fetch_one(pool)
    .await
    .context("select latest period failed")?;

    let Some(start) = start else {
        return Ok((None, Vec::new()));
    };

    let rows: Vec<PillarPerformance> = sqlx::query_as(&format!(
        "SELECT {PERFORMANCE_COLUMNS} FROM content_pillar_performance \
         WHERE user_id = $1 AND platform = $2 AND period_type = $3 AND period_start = $4"
    ))
    .bind(user_id)
    .bind(PLATFORM)
    .bind(period_type.as_str())
    .bind(start)
    .fetch_all(pool)
    .await
    .context("select content_pillar_performance failed")?;

    Ok((
        Some(Period {
            period_type,
            start,
        }),
        rows,
    ))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PerformanceHistoryRow {
    pub period_start: NaiveDate,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub performance: PillarPerformance,
}

/// Newest periods first, `periods` of them.
pub async fn performance_history(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    period_type: PeriodType,
    periods: i64,
) -> anyhow::Result<Vec<PerformanceHistoryRow>> {
    sqlx::query_as(&format!(
        "SELECT period_start, {PERFORMANCE_COLUMNS} FROM content_pillar_performance \
         WHERE user_id = $1 AND platform = $2 AND period_type = $3 \
           AND period_start IN ( \
             SELECT DISTINCT period_start FROM content_pillar_performance \
             WHERE user_id = $1 AND platform = $2 AND period_type = $3 \
             ORDER BY period_start DESC LIMIT $4) \
         ORDER BY period_start DESC, pillar_id"
    ))
    .bind(user_id)
    .bind(PLATFORM)
    .bind(period_type.as_str())
    .bind(periods)
    .fetch_all(pool)
    .await
    .context("select performance history failed")
}

/// Replaces the user's current mix.
pub async fn save_mix(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    recs: &[MixRecommendation],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    sqlx::query("DELETE FROM content_mix_recommendations WHERE user_id = $1 AND platform = $2")
        .bind(user_id)
        .bind(PLATFORM)
        .execute(&mut *tx)
        .await
        .context("delete content_mix_recommendations failed")?;

    for r in recs {
        sqlx::query(
            "INSERT INTO content_mix_recommendations (user_id, pillar_id, platform, \
             recommended_percentage, current_percentage, reasoning, confidence_score, \
             generated_at, valid_until) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(user_id)
        .bind(r.pillar_id)
        .bind(&r.platform)
        .bind(r.recommended_percentage)
        .bind(r.current_percentage)
        .bind(sqlx::types::Json(&r.reasoning))
        .bind(r.confidence_score)
        .bind(r.generated_at)
        .bind(r.valid_until)
        .execute(&mut *tx)
        .await
        .context("insert content_mix_recommendations failed")?;
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(())
}

pub async fn mix_recommendations(
    pool: &sqlx::PgPool,
    user_id: Uuid,
) -> anyhow::Result<Vec<MixRecommendation>> {
    let rows: Vec<MixRecommendationRow> = sqlx::query_as(
        "SELECT m.pillar_id, p.name AS pillar_name, m.platform, m.recommended_percentage, \
                m.current_percentage, m.reasoning, m.confidence_score, m.generated_at, m.valid_until \
         FROM content_mix_recommendations m \
         JOIN content_pillars p ON p.id = m.pillar_id \
         WHERE m.user_id = $1 AND m.platform = $2 \
         ORDER BY m.recommended_percentage DESC, p.display_order",
    )
    .bind(user_id)
    .bind(PLATFORM)
    .fetch_all(pool)
    .await
    .context("select content_mix_recommendations failed")?;
    Ok(rows.into_iter().map(MixRecommendation::from).collect())
}
