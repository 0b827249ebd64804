use crate::error::ApiResult;
use crate::AppState;
use adpilot_core::domain::recommendation::BudgetRecommendation;
use adpilot_core::jobs::{self, Job, RunOptions};
use adpilot_core::storage::recommendations::{self, Applied};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: i64 = 50;

pub async fn pending(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<BudgetRecommendation>> {
    let ctx = state.ctx()?;
    Ok(Json(recommendations::pending(&ctx.pool, user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<i64>,
}

pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Vec<BudgetRecommendation>> {
    let ctx = state.ctx()?;
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);
    Ok(Json(recommendations::history(&ctx.pool, user_id, limit).await?))
}

#[derive(Debug, Serialize)]
pub struct Generated {
    superseded: usize,
    recommendations: Vec<BudgetRecommendation>,
}

pub async fn generate(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Generated> {
    let ctx = state.ctx()?;
    let opts = RunOptions::new(Utc::now().date_naive(), false);
    let report = jobs::run_for_user(ctx, Job::BudgetRecommendations, user_id, opts).await?;
    Ok(Json(Generated {
        superseded: report.superseded,
        recommendations: recommendations::pending(&ctx.pool, user_id).await?,
    }))
}

pub async fn apply(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Applied> {
    let ctx = state.ctx()?;
    let applied =
        recommendations::apply(&ctx.pool, ctx.ads.as_ref(), &ctx.engine.budget, user_id, id).await?;
    Ok(Json(applied))
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Rejected {
    id: Uuid,
    status: &'static str,
}

pub async fn reject(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
    body: Option<Json<RejectBody>>,
) -> ApiResult<Rejected> {
    let ctx = state.ctx()?;
    let reason = body.and_then(|Json(b)| b.reason);
    recommendations::reject(&ctx.pool, user_id, id, reason.as_deref()).await?;
    Ok(Json(Rejected {
        id,
        status: "rejected",
    }))
}
