use crate::error::ApiResult;
use crate::AppState;
use adpilot_core::domain::metrics::CampaignMetrics;
use adpilot_core::domain::rule::EvaluationOutcome;
use adpilot_core::engine::rules::evaluate_campaign;
use adpilot_core::jobs::{self, Job, JobReport, RunOptions};
use adpilot_core::storage::rules;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct Seeded {
    created: usize,
}

pub async fn seed(State(state): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<Seeded> {
    let ctx = state.ctx()?;
    let created = rules::seed_default_rules(&ctx.pool, user_id).await?;
    Ok(Json(Seeded { created }))
}

/// Runs the user's active rules against caller-supplied metrics without
/// recording anything.
pub async fn evaluate(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(metrics): Json<CampaignMetrics>,
) -> ApiResult<EvaluationOutcome> {
    let ctx = state.ctx()?;
    let active = rules::active_rules(&ctx.pool, user_id).await?;
    Ok(Json(evaluate_campaign(&metrics, &active)))
}

pub async fn run_evaluation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<JobReport> {
    let ctx = state.ctx()?;
    let opts = RunOptions::new(Utc::now().date_naive(), false);
    let report = jobs::run_for_user(ctx, Job::PerformanceEvaluation, user_id, opts).await?;
    Ok(Json(report))
}
