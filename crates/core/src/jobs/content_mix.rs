use super::{JobContext, JobReport, RunOptions};
use crate::domain::pillar::{MixRecommendation, PeriodType};
use crate::engine::content_mix::{aggregate_pillar_performance, recommend_mix};
use crate::error::EngineResult;
use crate::storage::{pillars, snapshots};
use crate::time::period::scheduled_mix_periods;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Aggregates the current week (and month, early in the month), then
/// regenerates the user's mix.
pub async fn run(ctx: &JobContext, user_id: Uuid, opts: RunOptions) -> EngineResult<JobReport> {
    let all_pillars = pillars::pillars(&ctx.pool).await?;
    let mut report = JobReport::default();

    for period in scheduled_mix_periods(opts.as_of) {
        let items = snapshots::content_item_metrics(&ctx.pool, user_id, period).await?;
        let performance = aggregate_pillar_performance(&all_pillars, &items);
        report.examined += items.len();

        tracing::debug!(
            %user_id,
            period_type = period.period_type.as_str(),
            period_start = %period.start,
            items = items.len(),
            pillars = performance.len(),
            "pillar performance aggregated"
        );
        if !opts.dry_run {
            pillars::upsert_performance(&ctx.pool, user_id, period, &performance).await?;
        }
    }

    let recs = if opts.dry_run {
        Vec::new()
    } else {
        generate_mix(ctx, user_id, opts.now).await?
    };
    report.generated = recs.len();

    tracing::info!(%user_id, items = report.examined, pillars = report.generated, "content mix refreshed");
    Ok(report)
}

/// Recommends a mix from the latest stored weekly performance and replaces
/// the user's saved set.
pub async fn generate_mix(
    ctx: &JobContext,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> EngineResult<Vec<MixRecommendation>> {
    let all_pillars = pillars::pillars(&ctx.pool).await?;
    let (period, performance) =
        pillars::latest_performance(&ctx.pool, user_id, PeriodType::Week).await?;

    let recs = recommend_mix(&all_pillars, &performance, &ctx.engine.mix, now);
    pillars::save_mix(&ctx.pool, user_id, &recs).await?;

    tracing::info!(
        %user_id,
        period_start = ?period.map(|p| p.start),
        pillars = recs.len(),
        "mix recommendations saved"
    );
    Ok(recs)
}
