use super::{JobContext, JobReport, RunOptions};
use crate::ads::{self, to_platform_units, AdPlatformClient, PlatformAction};
use crate::domain::rule::{default_rules, Action};
use crate::engine::rules::{evaluate_campaign, plan_action, PlannedChange};
use crate::error::EngineResult;
use crate::storage::actions::{self, ActionStatus};
use crate::storage::snapshots::{self, AutomationMode};
use crate::storage::rules;
use std::sync::Arc;
use uuid::Uuid;

fn platform_action(change: PlannedChange, multiplier: f64) -> PlatformAction {
    match change {
        PlannedChange::Pause => PlatformAction::Pause,
        PlannedChange::DailyBudget { to, .. } => PlatformAction::SetDailyBudget {
            amount: to_platform_units(to, multiplier),
        },
    }
}

/// Evaluates every active campaign against the user's rules. Autopilot users
/// get the actions applied right away; everyone else gets pending actions
/// awaiting approval.
pub async fn run(ctx: &JobContext, user_id: Uuid, opts: RunOptions) -> EngineResult<JobReport> {
    let settings = snapshots::user_settings(&ctx.pool, user_id).await?;

    let mut user_rules = rules::active_rules(&ctx.pool, user_id).await?;
    if user_rules.is_empty() {
        if opts.dry_run {
            user_rules = default_rules();
        } else {
            rules::seed_default_rules(&ctx.pool, user_id).await?;
            user_rules = rules::active_rules(&ctx.pool, user_id).await?;
        }
    }

    let campaigns = snapshots::campaign_performance(&ctx.pool, user_id, opts.as_of).await?;
    let mut report = JobReport::default();
    let mut client: Option<Arc<dyn AdPlatformClient>> = None;

    for campaign in &campaigns {
        report.examined += 1;
        let metrics = snapshots::to_campaign_metrics(campaign, ctx.engine.budget.average_order_value);
        let outcome = evaluate_campaign(&metrics, &user_rules);

        if outcome.is_winner && !opts.dry_run {
            actions::set_winner(&ctx.pool, campaign.id, true).await?;
        }

        for action in &outcome.actions {
            report.generated += 1;
            let change = plan_action(action);
            if opts.dry_run {
                tracing::info!(
                    %user_id,
                    campaign_id = %campaign.id,
                    action_type = action.action_type.as_str(),
                    ?change,
                    "dry-run: action not recorded"
                );
                continue;
            }

            match (settings.automation_mode, change) {
                (AutomationMode::Autopilot, Some(change)) => {
                    if client.is_none() {
                        client = match ctx.ads.for_user(user_id).await {
                            Ok(c) => Some(c),
                            Err(e) => {
                                record_failure(ctx, user_id, action, change, &e.to_string()).await?;
                                report.failed += 1;
                                continue;
                            }
                        };
                    }
                    let Some(c) = client.as_deref() else {
                        continue;
                    };
                    if apply_action(ctx, user_id, c, action, change).await? {
                        report.applied += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                _ => {
                    actions::record(&ctx.pool, user_id, action, change, ActionStatus::Pending, None)
                        .await?;
                    report.pending += 1;
                }
            }
        }
    }

    tracing::info!(
        %user_id,
        campaigns = report.examined,
        actions = report.generated,
        applied = report.applied,
        pending = report.pending,
        failed = report.failed,
        "performance evaluation finished"
    );
    Ok(report)
}

/// Returns whether the platform accepted the change. A rejection is recorded
/// on the action row rather than failing the pass.
async fn apply_action(
    ctx: &JobContext,
    user_id: Uuid,
    client: &dyn AdPlatformClient,
    action: &Action,
    change: PlannedChange,
) -> EngineResult<bool> {
    let platform = platform_action(change, ctx.engine.budget.platform_unit_multiplier);
    match ads::execute(client, &action.platform_campaign_id, platform).await {
        Ok(()) => {
            actions::apply_locally(&ctx.pool, action.campaign_id, change).await?;
            actions::record(&ctx.pool, user_id, action, Some(change), ActionStatus::Applied, None)
                .await?;
            Ok(true)
        }
        Err(e) => {
            record_failure(ctx, user_id, action, change, &e.to_string()).await?;
            Ok(false)
        }
    }
}

async fn record_failure(
    ctx: &JobContext,
    user_id: Uuid,
    action: &Action,
    change: PlannedChange,
    message: &str,
) -> EngineResult<()> {
    actions::record(
        &ctx.pool,
        user_id,
        action,
        Some(change),
        ActionStatus::Failed,
        Some(message),
    )
    .await?;
    Ok(())
}
