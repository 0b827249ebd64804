use crate::error::{ApiError, ApiResult};
use crate::AppState;
use adpilot_core::domain::ab_test::{
    AbTest, CreateTestInput, DailyResult, SignificanceResult, TestStatus, VariantStats,
};
use adpilot_core::engine::significance::{check_significance, plan_test};
use adpilot_core::storage::ab_tests;
use adpilot_core::EngineError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

pub async fn create(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<CreateTestInput>,
) -> Result<(StatusCode, Json<AbTest>), ApiError> {
    let ctx = state.ctx()?;
    let plan = plan_test(&input)?;
    let test = ab_tests::create(&ctx.pool, user_id, &input, &plan).await?;
    ab_tests::log_activity(
        &ctx.pool,
        user_id,
        "ab_test_created",
        "ab_test",
        Some(test.id),
        json!({ "test_name": test.name }),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(test)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Vec<AbTest>> {
    let ctx = state.ctx()?;
    let status = q
        .status
        .as_deref()
        .map(str::parse::<TestStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(ab_tests::list(&ctx.pool, user_id, status).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path((user_id, test_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<AbTest> {
    let ctx = state.ctx()?;
    Ok(Json(ab_tests::get(&ctx.pool, user_id, test_id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((user_id, test_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let ctx = state.ctx()?;
    ab_tests::delete_draft(&ctx.pool, user_id, test_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Conditional move to `to`. `only_from` narrows the accepted source status
/// where two routes share a target (start vs resume).
async fn move_to(
    state: &AppState,
    user_id: Uuid,
    test_id: Uuid,
    only_from: Option<TestStatus>,
    to: TestStatus,
    activity: &str,
) -> ApiResult<AbTest> {
    let ctx = state.ctx()?;
    if let Some(from) = only_from {
        let test = ab_tests::get(&ctx.pool, user_id, test_id).await?;
        if test.status != from {
            return Err(EngineError::invalid_state("ab_test", test_id, test.status, to).into());
        }
    }
    let test = ab_tests::transition(&ctx.pool, user_id, test_id, to).await?;
    ab_tests::log_activity(
        &ctx.pool,
        user_id,
        activity,
        "ab_test",
        Some(test_id),
        json!({ "test_name": test.name }),
    )
    .await?;
    Ok(Json(test))
}

pub async fn start(
    State(state): State<AppState>,
    Path((user_id, test_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<AbTest> {
    move_to(
        &state,
        user_id,
        test_id,
        Some(TestStatus::Draft),
        TestStatus::Running,
        "ab_test_started",
    )
    .await
}

pub async fn pause(
    State(state): State<AppState>,
    Path((user_id, test_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<AbTest> {
    move_to(&state, user_id, test_id, None, TestStatus::Paused, "ab_test_paused").await
}

pub async fn resume(
    State(state): State<AppState>,
    Path((user_id, test_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<AbTest> {
    move_to(
        &state,
        user_id,
        test_id,
        Some(TestStatus::Paused),
        TestStatus::Running,
        "ab_test_resumed",
    )
    .await
}

pub async fn cancel(
    State(state): State<AppState>,
    Path((user_id, test_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<AbTest> {
    move_to(&state, user_id, test_id, None, TestStatus::Cancelled, "ab_test_cancelled").await
}

#[derive(Debug, Deserialize)]
pub struct DeclareWinnerBody {
    variant_id: Uuid,
    #[serde(default)]
    confidence: Option<f64>,
}

pub async fn declare_winner(
    State(state): State<AppState>,
    Path((user_id, test_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<DeclareWinnerBody>,
) -> ApiResult<AbTest> {
    let ctx = state.ctx()?;
    let test =
        ab_tests::declare_winner(&ctx.pool, user_id, test_id, body.variant_id, body.confidence)
            .await?;
    ab_tests::log_activity(
        &ctx.pool,
        user_id,
        "ab_test_winner_declared",
        "ab_test",
        Some(test_id),
        json!({
            "test_name": test.name,
            "winner_variant_id": body.variant_id,
            "confidence": body.confidence,
            "manual": true,
        }),
    )
    .await?;
    Ok(Json(test))
}

#[derive(Debug, Deserialize)]
pub struct ResultsBody {
    variant_id: Uuid,
    #[serde(flatten)]
    result: DailyResult,
}

pub async fn record_results(
    State(state): State<AppState>,
    Path((user_id, test_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ResultsBody>,
) -> Result<StatusCode, ApiError> {
    let ctx = state.ctx()?;
    ab_tests::record_results(&ctx.pool, user_id, test_id, body.variant_id, &body.result).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct SignificanceReport {
    test: AbTest,
    stats: Vec<VariantStats>,
    result: SignificanceResult,
}

pub async fn significance(
    State(state): State<AppState>,
    Path((user_id, test_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<SignificanceReport> {
    let ctx = state.ctx()?;
    let test = ab_tests::get(&ctx.pool, user_id, test_id).await?;
    let stats = ctx.aggregates.ab_test_stats(test.id).await?;
    let result = check_significance(&test, &stats);
    Ok(Json(SignificanceReport {
        test,
        stats,
        result,
    }))
}
