use super::{JobContext, JobReport, RunOptions};
use crate::domain::creative::{ContentType, CreativeMetrics};
use crate::domain::metrics::MetricSnapshot;
use crate::error::EngineResult;
use crate::storage::{creative_health, snapshots};
use uuid::Uuid;

fn rates(s: &MetricSnapshot) -> CreativeMetrics {
    CreativeMetrics {
        ctr: s.ctr(),
        engagement_rate: s.engagement_rate(),
        save_rate: s.save_rate(),
        impressions: s.impressions,
    }
}

/// Folds each published item's latest snapshot into its health record.
pub async fn run(ctx: &JobContext, user_id: Uuid, opts: RunOptions) -> EngineResult<JobReport> {
    let rows = snapshots::latest_content_snapshots(&ctx.pool, user_id, opts.as_of).await?;
    let mut report = JobReport::default();

    for row in &rows {
        report.examined += 1;
        let content_type: ContentType = match row.content_type.parse() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(%user_id, content_id = %row.snapshot.entity_id, error = %e, "skipping content");
                report.skipped += 1;
                continue;
            }
        };
        if opts.dry_run {
            continue;
        }

        let health = creative_health::update_creative_health(
            &ctx.pool,
            user_id,
            content_type,
            &row.snapshot.entity_id.to_string(),
            row.snapshot.as_of_date,
            rates(&row.snapshot),
            &ctx.engine.fatigue,
        )
        .await?;

        report.generated += 1;
        if health.status.needs_refresh() {
            report.pending += 1;
        }
    }

    tracing::info!(
        %user_id,
        items = report.examined,
        updated = report.generated,
        needs_refresh = report.pending,
        "creative health pass finished"
    );
    Ok(report)
}
