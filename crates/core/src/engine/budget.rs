use crate::ads::PlatformAction;
use crate::domain::recommendation::{
    BudgetRecommendation, CampaignPerformance, Guardrails, Reasoning, RecommendationStatus,
    RecommendationType,
};
use crate::engine::config::BudgetThresholds;
use crate::scoring::evidence_confidence;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

const INCREASE_VALID_DAYS: i64 = 3;
const DECREASE_VALID_DAYS: i64 = 5;
const PAUSE_VALID_DAYS: i64 = 7;

/// Budget recommendations for every campaign with enough spend. Each campaign
/// gets at most one: increase, then pause, then decrease, first match wins.
pub fn generate_recommendations(
    campaigns: &[CampaignPerformance],
    guardrails: &Guardrails,
    cfg: &BudgetThresholds,
    now: DateTime<Utc>,
) -> Vec<BudgetRecommendation> {
    campaigns
        .iter()
        .filter_map(|c| recommend(c, guardrails, cfg, now))
        .collect()
}

fn recommend(
    c: &CampaignPerformance,
    guardrails: &Guardrails,
    cfg: &BudgetThresholds,
    now: DateTime<Utc>,
) -> Option<BudgetRecommendation> {
    if c.spend_7d < cfg.min_spend {
        return None;
    }

    let cpa = (c.conversions_7d > 0).then(|| c.spend_7d / c.conversions_7d as f64)?;
    let roas = (c.spend_7d > 0.0)
        .then(|| c.conversions_7d as f64 * cfg.average_order_value / c.spend_7d);
    let confidence = evidence_confidence(c.days_active, c.conversions_7d);

    let draft = if cpa < cfg.cpa_excellent && c.conversions_7d >= cfg.min_conversions {
        let new_budget = c.daily_budget * (1.0 + cfg.increase_pct / 100.0);
        let additional_spend = (new_budget - c.daily_budget) * 7.0;

        let mut supporting = Vec::new();
        if c.days_active >= 7 {
            supporting.push("7+ days of consistent performance".to_string());
        }
        if let Some(r) = roas.filter(|r| *r > cfg.roas_excellent) {
            supporting.push(format!(
                "ROAS of {r:.1}x exceeds {:.0}x target",
                cfg.roas_excellent
            ));
        }
        supporting.push(format!(
            "{} conversions provides statistical confidence",
            c.conversions_7d
        ));

        Draft {
            kind: RecommendationType::Increase,
            new_budget,
            change_pct: cfg.increase_pct,
            reasoning: Reasoning {
                primary: format!(
                    "CPA of ${cpa:.2} is {}% below ${:.0} target",
                    ((1.0 - cpa / cfg.cpa_excellent) * 100.0).round(),
                    cfg.cpa_excellent
                ),
                supporting,
                risks: guardrail_risks(new_budget, guardrails),
            },
            additional_spend,
            additional_conversions: Some((additional_spend / cpa).round() as i64),
            new_cpa: Some(cpa),
            valid_days: INCREASE_VALID_DAYS,
        }
    } else if cpa > cfg.cpa_poor && c.days_active >= cfg.min_days_for_pause {
        let mut supporting = vec![format!("Active for {} days", c.days_active)];
        if let Some(r) = roas.filter(|r| *r < cfg.roas_good) {
            supporting.push(format!("ROAS of {r:.1}x below break-even"));
        }

        Draft {
            kind: RecommendationType::Pause,
            new_budget: 0.0,
            change_pct: -100.0,
            reasoning: Reasoning {
                primary: format!("CPA of ${cpa:.2} exceeds ${:.0} threshold", cfg.cpa_poor),
                supporting,
                risks: vec![
                    "Pausing may lose audience learning".to_string(),
                    "Consider creative refresh first".to_string(),
                ],
            },
            additional_spend: -c.daily_budget * 7.0,
            additional_conversions: Some(0),
            new_cpa: None,
            valid_days: PAUSE_VALID_DAYS,
        }
    } else if cpa > cfg.cpa_acceptable && cpa <= cfg.cpa_poor {
        let new_budget = c.daily_budget * (1.0 - cfg.decrease_pct / 100.0);
        let mut risks = vec!["May reduce delivery and learning".to_string()];
        risks.extend(guardrail_risks(new_budget, guardrails));

        Draft {
            kind: RecommendationType::Decrease,
            new_budget,
            change_pct: -cfg.decrease_pct,
            reasoning: Reasoning {
                primary: format!(
                    "CPA of ${cpa:.2} is in borderline range (${:.0}-{:.0})",
                    cfg.cpa_acceptable, cfg.cpa_poor
                ),
                supporting: vec!["Reducing budget preserves spend while optimizing".to_string()],
                risks,
            },
            additional_spend: (new_budget - c.daily_budget) * 7.0,
            additional_conversions: None,
            new_cpa: None,
            valid_days: DECREASE_VALID_DAYS,
        }
    } else {
        return None;
    };

    Some(BudgetRecommendation {
        id: Uuid::new_v4(),
        campaign_id: c.id,
        campaign_name: c.name.clone(),
        current_daily_budget: c.daily_budget,
        current_cpa: Some(cpa),
        current_roas: roas,
        current_spend_7d: c.spend_7d,
        recommendation_type: draft.kind,
        recommended_daily_budget: draft.new_budget,
        recommended_change_percentage: draft.change_pct,
        confidence_score: confidence,
        reasoning: draft.reasoning,
        projected_additional_spend: draft.additional_spend,
        projected_additional_conversions: draft.additional_conversions,
        projected_new_cpa: draft.new_cpa,
        status: RecommendationStatus::Pending,
        valid_until: now + Duration::days(draft.valid_days),
        created_at: now,
    })
}

struct Draft {
    kind: RecommendationType,
    new_budget: f64,
    change_pct: f64,
    reasoning: Reasoning,
    additional_spend: f64,
    additional_conversions: Option<i64>,
    new_cpa: Option<f64>,
    valid_days: i64,
}

fn guardrail_risks(new_daily_budget: f64, guardrails: &Guardrails) -> Vec<String> {
    let mut risks = Vec::new();
    if let Some(cap) = guardrails.weekly_cap.filter(|c| *c > 0.0) {
        if new_daily_budget * 7.0 > cap * 0.8 {
            risks.push("Approaching weekly spend cap".to_string());
        }
    }
    if let Some(cap) = guardrails.monthly_cap.filter(|c| *c > 0.0) {
        if new_daily_budget * 30.0 > cap * 0.5 {
            risks.push("May exceed 50% of monthly budget".to_string());
        }
    }
    risks
}

/// The platform call that applying `rec` requires, if any. Budgets are
/// converted to platform units here.
pub fn plan_application(rec: &BudgetRecommendation, cfg: &BudgetThresholds) -> Option<PlatformAction> {
    match rec.recommendation_type {
        RecommendationType::Pause => Some(PlatformAction::Pause),
        t if t.is_budget_change() => Some(PlatformAction::SetDailyBudget {
            amount: crate::ads::to_platform_units(
                rec.recommended_daily_budget,
                cfg.platform_unit_multiplier,
            ),
        }),
        _ => None,
    }
}
