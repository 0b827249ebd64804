use adpilot_core::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    BadRequest(String),
    /// Started without a database.
    Unavailable,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Engine(EngineError::Storage(err))
    }
}

pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::AlreadyProcessed { .. } | EngineError::InvalidState { .. } => {
            StatusCode::CONFLICT
        }
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::Platform(_) => StatusCode::BAD_GATEWAY,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Engine(EngineError::Storage(e)) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %format!("{e:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            Self::Engine(e) => (status_for(&e), e.to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "database unavailable".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        assert_eq!(
            status_for(&EngineError::not_found("ab_test", "x")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&EngineError::already_processed("budget_recommendation", "x", "applied")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&EngineError::invalid_state("ab_test", "x", "draft", "completed")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&EngineError::InvalidInput("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&EngineError::Platform("Campaign is archived".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn platform_message_reaches_the_body() {
        let res = ApiError::from(EngineError::Platform("Campaign is archived".into())).into_response();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }
}
