use crate::error::{ApiError, ApiResult};
use crate::AppState;
use adpilot_core::domain::pillar::{GapAction, MixRecommendation, PeriodType};
use adpilot_core::engine::content_mix::gap_actions;
use adpilot_core::jobs::content_mix::generate_mix;
use adpilot_core::storage::pillars::{self, PerformanceHistoryRow};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_HISTORY_PERIODS: i64 = 4;

#[derive(Debug, Serialize)]
pub struct MixView {
    recommendations: Vec<MixRecommendation>,
    gaps: Vec<GapAction>,
}

impl MixView {
    fn new(recommendations: Vec<MixRecommendation>) -> Self {
        let gaps = gap_actions(&recommendations);
        Self {
            recommendations,
            gaps,
        }
    }
}

pub async fn current(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<MixView> {
    let ctx = state.ctx()?;
    let recs = pillars::mix_recommendations(&ctx.pool, user_id).await?;
    Ok(Json(MixView::new(recs)))
}

pub async fn generate(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<MixView> {
    let ctx = state.ctx()?;
    let recs = generate_mix(ctx, user_id, Utc::now()).await?;
    Ok(Json(MixView::new(recs)))
}

#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    period_type: Option<String>,
    periods: Option<i64>,
}

pub async fn performance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(q): Query<PerformanceQuery>,
) -> ApiResult<Vec<PerformanceHistoryRow>> {
    let ctx = state.ctx()?;
    let period_type = match q.period_type.as_deref() {
        Some(s) => s
            .parse::<PeriodType>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => PeriodType::Week,
    };
    let periods = q.periods.unwrap_or(DEFAULT_HISTORY_PERIODS).clamp(1, 52);
    let rows = pillars::performance_history(&ctx.pool, user_id, period_type, periods).await?;
    Ok(Json(rows))
}
