use adpilot_core::ads::pinterest::{PinterestClientFactory, PinterestConnector};
use adpilot_core::config::Settings;
use adpilot_core::engine::EngineConfig;
use adpilot_core::jobs::JobContext;
use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod routes;

use error::ApiError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let engine = EngineConfig::from_env()?;
    engine.validate()?;

    let ctx = match connect(&settings).await {
        Ok(pool) => Some(build_context(&settings, pool, engine).await?),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %format!("{e:#}"), "database unavailable; starting API in degraded mode");
            None
        }
    };

    let app = router(AppState { ctx });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    adpilot_core::storage::migrate(&pool).await?;
    Ok(pool)
}

async fn build_context(
    settings: &Settings,
    pool: PgPool,
    engine: EngineConfig,
) -> anyhow::Result<JobContext> {
    let connector = PinterestConnector::from_settings(settings)?;
    let aggregates = adpilot_core::storage::aggregates::probe(&pool).await?;
    Ok(JobContext {
        ads: Arc::new(PinterestClientFactory::new(pool.clone(), connector)),
        pool,
        engine: Arc::new(engine),
        aggregates,
    })
}

#[derive(Clone)]
pub struct AppState {
    ctx: Option<JobContext>,
}

impl AppState {
    pub fn ctx(&self) -> Result<&JobContext, ApiError> {
        self.ctx.as_ref().ok_or(ApiError::Unavailable)
    }
}

fn router(state: AppState) -> Router {
    use routes::{ab_tests, budget, creative, mix, rules};

    Router::new()
        .route("/healthz", get(healthz))
        .route("/users/:user_id/rules/seed", post(rules::seed))
        .route("/users/:user_id/rules/evaluate", post(rules::evaluate))
        .route("/users/:user_id/performance/evaluate", post(rules::run_evaluation))
        .route("/users/:user_id/budget-recommendations", get(budget::pending))
        .route("/users/:user_id/budget-recommendations/history", get(budget::history))
        .route("/users/:user_id/budget-recommendations/generate", post(budget::generate))
        .route("/users/:user_id/budget-recommendations/:id/apply", post(budget::apply))
        .route("/users/:user_id/budget-recommendations/:id/reject", post(budget::reject))
        .route(
            "/users/:user_id/ab-tests",
            get(ab_tests::list).post(ab_tests::create),
        )
        .route(
            "/users/:user_id/ab-tests/:test_id",
            get(ab_tests::get).delete(ab_tests::delete),
        )
        .route("/users/:user_id/ab-tests/:test_id/start", post(ab_tests::start))
        .route("/users/:user_id/ab-tests/:test_id/pause", post(ab_tests::pause))
        .route("/users/:user_id/ab-tests/:test_id/resume", post(ab_tests::resume))
        .route("/users/:user_id/ab-tests/:test_id/cancel", post(ab_tests::cancel))
        .route(
            "/users/:user_id/ab-tests/:test_id/declare-winner",
            post(ab_tests::declare_winner),
        )
        .route("/users/:user_id/ab-tests/:test_id/results", post(ab_tests::record_results))
        .route(
            "/users/:user_id/ab-tests/:test_id/significance",
            get(ab_tests::significance),
        )
        .route(
            "/users/:user_id/creative-health",
            get(creative::list).post(creative::update),
        )
        .route("/users/:user_id/creative-health/summary", get(creative::summary))
        .route("/users/:user_id/creative-health/fatigued", get(creative::fatigued))
        .route(
            "/users/:user_id/creative-health/refresh-queue",
            get(creative::refresh_queue),
        )
        .route(
            "/users/:user_id/creative-health/:content_type/:content_id/trend",
            get(creative::trend),
        )
        .route(
            "/users/:user_id/creative-health/:content_type/:content_id/refresh",
            post(creative::mark_refreshed),
        )
        .route("/users/:user_id/content-mix", get(mix::current))
        .route("/users/:user_id/content-mix/generate", post(mix::generate))
        .route("/users/:user_id/content-mix/performance", get(mix::performance))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
