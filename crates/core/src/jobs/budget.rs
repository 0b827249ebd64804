use super::{JobContext, JobReport, RunOptions};
use crate::engine::budget::generate_recommendations;
use crate::error::EngineResult;
use crate::storage::{recommendations, snapshots};
use uuid::Uuid;

/// Regenerates the user's pending budget recommendations from the trailing
/// seven days.
pub async fn run(ctx: &JobContext, user_id: Uuid, opts: RunOptions) -> EngineResult<JobReport> {
    let settings = snapshots::user_settings(&ctx.pool, user_id).await?;
    let campaigns = snapshots::campaign_performance(&ctx.pool, user_id, opts.as_of).await?;

    let recs = generate_recommendations(&campaigns, &settings.guardrails, &ctx.engine.budget, opts.now);

    let mut report = JobReport {
        examined: campaigns.len(),
        generated: recs.len(),
        ..Default::default()
    };

    if opts.dry_run {
        for r in &recs {
            tracing::info!(
                %user_id,
                campaign_id = %r.campaign_id,
                recommendation_type = r.recommendation_type.as_str(),
                recommended_daily_budget = r.recommended_daily_budget,
                confidence = r.confidence_score,
                "dry-run: recommendation not saved"
            );
        }
        return Ok(report);
    }

    report.superseded = recommendations::replace_pending(&ctx.pool, user_id, &recs).await? as usize;

    tracing::info!(
        %user_id,
        campaigns = report.examined,
        generated = report.generated,
        superseded = report.superseded,
        "budget recommendations generated"
    );
    Ok(report)
}
