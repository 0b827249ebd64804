use crate::domain::metrics::CampaignMetrics;
use crate::domain::rule::{Action, ActionType, EvaluationOutcome, Rule};

/// Runs every rule against one campaign. Rules are visited in priority order
/// and each match contributes independently; nothing short-circuits, so
/// conflicting actions (a pause next to an increase) are left to the caller.
pub fn evaluate_campaign(metrics: &CampaignMetrics, rules: &[Rule]) -> EvaluationOutcome {
    let mut ordered: Vec<&Rule> = rules.iter().collect();
    ordered.sort_by_key(|r| r.priority);

    let mut out = EvaluationOutcome::default();
    for rule in ordered {
        if !rule.guard.admits(metrics) {
            continue;
        }

        let Some(value) = rule.metric.value(metrics) else {
            tracing::debug!(
                campaign_id = %metrics.campaign_id,
                rule_id = %rule.id,
                metric = rule.metric.as_str(),
                "metric undefined; rule skipped"
            );
            continue;
        };

        if !rule.comparison.matches(value) {
            continue;
        }

        if rule.action_type == ActionType::FlagWinner {
            out.is_winner = true;
            continue;
        }

        out.actions.push(Action {
            rule_id: rule.id,
            campaign_id: metrics.campaign_id,
            platform_campaign_id: metrics.platform_campaign_id.clone(),
            action_type: rule.action_type,
            action_config: rule.action_config,
            metrics_snapshot: metrics.clone(),
            current_budget: metrics.daily_budget,
        });
    }

    out
}

/// What an action does once applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlannedChange {
    DailyBudget { from: f64, to: f64 },
    Pause,
}

/// Default ceiling for rule-driven increases without a `max_daily`.
const DEFAULT_MAX_DAILY: f64 = 100.0;

pub fn plan_action(action: &Action) -> Option<PlannedChange> {
    let current = action.current_budget;
    let pct = action.action_config.percentage.unwrap_or(0.0) / 100.0;
    match action.action_type {
        ActionType::IncreaseBudget => {
            let cap = action.action_config.max_daily.unwrap_or(DEFAULT_MAX_DAILY);
            Some(PlannedChange::DailyBudget {
                from: current,
                to: (current * (1.0 + pct)).min(cap),
            })
        }
        ActionType::DecreaseBudget => Some(PlannedChange::DailyBudget {
            from: current,
            to: current * (1.0 - pct),
        }),
        ActionType::Pause => Some(PlannedChange::Pause),
        ActionType::FlagWinner => None,
    }
}
