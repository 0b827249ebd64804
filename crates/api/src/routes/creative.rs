use crate::error::{ApiError, ApiResult};
use crate::AppState;
use adpilot_core::domain::creative::{
    ContentType, CreativeHealth, CreativeMetrics, HealthStatus, HealthSummary, TrendPoint,
};
use adpilot_core::engine::fatigue;
use adpilot_core::storage::creative_health::{self, ListFilter};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_MIN_FATIGUE_SCORE: i32 = 50;
const DEFAULT_PAGE_SIZE: i64 = 50;

fn content_type(s: &str) -> Result<ContentType, ApiError> {
    s.parse().map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    content_type: ContentType,
    content_id: String,
    /// Defaults to today (UTC).
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(flatten)]
    metrics: CreativeMetrics,
}

pub async fn update(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UpdateBody>,
) -> ApiResult<CreativeHealth> {
    let ctx = state.ctx()?;
    if body.content_id.trim().is_empty() {
        return Err(ApiError::BadRequest("content_id is required".into()));
    }
    let health = creative_health::update_creative_health(
        &ctx.pool,
        user_id,
        body.content_type,
        &body.content_id,
        body.date.unwrap_or_else(|| Utc::now().date_naive()),
        body.metrics,
        &ctx.engine.fatigue,
    )
    .await?;
    Ok(Json(health))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    content_type: Option<String>,
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Page {
    items: Vec<CreativeHealth>,
    total: i64,
}

pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Page> {
    let ctx = state.ctx()?;
    let status = match q.status.as_deref() {
        Some(s) => Some(
            s.parse::<HealthStatus>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        ),
        None => None,
    };
    let filter = ListFilter {
        content_type: q.content_type.as_deref().map(content_type).transpose()?,
        status,
        limit: q.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 500),
        offset: q.offset.unwrap_or(0).max(0),
    };
    let (items, total) = creative_health::list(&ctx.pool, user_id, &filter).await?;
    Ok(Json(Page { items, total }))
}

pub async fn summary(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<HealthSummary> {
    let ctx = state.ctx()?;
    Ok(Json(ctx.aggregates.creative_health_summary(user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct FatiguedQuery {
    min_score: Option<i32>,
}

pub async fn fatigued(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(q): Query<FatiguedQuery>,
) -> ApiResult<Vec<CreativeHealth>> {
    let ctx = state.ctx()?;
    let min_score = q.min_score.unwrap_or(DEFAULT_MIN_FATIGUE_SCORE);
    Ok(Json(creative_health::fatigued(&ctx.pool, user_id, min_score).await?))
}

pub async fn refresh_queue(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<CreativeHealth>> {
    let ctx = state.ctx()?;
    Ok(Json(creative_health::refresh_queue(&ctx.pool, user_id).await?))
}

pub async fn trend(
    State(state): State<AppState>,
    Path((user_id, kind, content_id)): Path<(Uuid, String, String)>,
) -> ApiResult<Vec<TrendPoint>> {
    let ctx = state.ctx()?;
    let health = creative_health::get(&ctx.pool, user_id, content_type(&kind)?, &content_id).await?;
    Ok(Json(fatigue::trend(&health)))
}

pub async fn mark_refreshed(
    State(state): State<AppState>,
    Path((user_id, kind, content_id)): Path<(Uuid, String, String)>,
) -> ApiResult<CreativeHealth> {
    let ctx = state.ctx()?;
    let health =
        creative_health::mark_refreshed(&ctx.pool, user_id, content_type(&kind)?, &content_id)
            .await?;
    Ok(Json(health))
}
