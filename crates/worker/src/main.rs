use adpilot_core::ads::pinterest::{PinterestClientFactory, PinterestConnector};
use adpilot_core::config::Settings;
use adpilot_core::engine::EngineConfig;
use adpilot_core::jobs::{self, Job, JobContext, JobReport, RunOptions};
use adpilot_core::storage::{ab_tests, lock, snapshots};
use adpilot_core::time::period::resolve_as_of_date;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "adpilot_worker")]
struct Args {
    #[command(subcommand)]
    job: JobCommand,

    /// Only process this user.
    #[arg(long, global = true)]
    user_id: Option<Uuid>,

    /// Metrics as-of date (YYYY-MM-DD). Defaults to today's UTC date.
    #[arg(long, global = true)]
    as_of_date: Option<String>,

    /// Compute everything but write nothing and call no ad platform.
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum JobCommand {
    /// Evaluate performance rules for every active campaign.
    PerformanceEvaluation,
    /// Regenerate pending budget recommendations.
    BudgetRecommendations,
    /// Check running A/B tests and close the decided ones.
    AbSignificance,
    /// Fold the latest content metrics into creative health.
    CreativeHealth,
    /// Aggregate pillar performance and regenerate the content mix.
    ContentMix,
}

impl From<JobCommand> for Job {
    fn from(cmd: JobCommand) -> Self {
        match cmd {
            JobCommand::PerformanceEvaluation => Job::PerformanceEvaluation,
            JobCommand::BudgetRecommendations => Job::BudgetRecommendations,
            JobCommand::AbSignificance => Job::AbSignificance,
            JobCommand::CreativeHealth => Job::CreativeHealth,
            JobCommand::ContentMix => Job::ContentMix,
        }
    }
}

#[derive(Debug, Default)]
struct Summary {
    users: usize,
    succeeded: usize,
    failed: usize,
    locked: usize,
    totals: JobReport,
}

enum UserOutcome {
    Done(JobReport),
    Locked,
}

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

    let args = Args::parse();
    let job: Job = args.job.into();
    let as_of = resolve_as_of_date(args.as_of_date.as_deref(), chrono::Utc::now())?;
    let opts = RunOptions::new(as_of, args.dry_run);

    let engine = EngineConfig::from_env()?;
    engine.validate()?;

    let db_url = settings.require_database_url()?;
    // Each in-flight user holds one connection for its job lock.
    let max_connections = u32::try_from(settings.worker_concurrency * 2 + 2).unwrap_or(u32::MAX);
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    adpilot_core::storage::migrate(&pool).await?;

    let ctx = JobContext {
        ads: Arc::new(PinterestClientFactory::new(
            pool.clone(),
            PinterestConnector::from_settings(&settings)?,
        )),
        aggregates: adpilot_core::storage::aggregates::probe(&pool).await?,
        engine: Arc::new(engine),
        pool,
    };

    let users = match args.user_id {
        Some(id) => vec![id],
        None => target_users(&ctx.pool, job).await?,
    };

    tracing::info!(%job, %as_of, dry_run = opts.dry_run, users = users.len(), "job started");
    let started = Instant::now();

    let summary = run_all(&ctx, job, users, opts, settings.worker_concurrency).await;

    tracing::info!(
        %job,
        %as_of,
        users = summary.users,
        succeeded = summary.succeeded,
        failed = summary.failed,
        locked = summary.locked,
        totals = %serde_json::to_string(&summary.totals).unwrap_or_default(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "job finished"
    );

    if summary.failed > 0 {
        anyhow::bail!("{job}: {} of {} users failed", summary.failed, summary.users);
    }
    Ok(())
}

async fn target_users(pool: &sqlx::PgPool, job: Job) -> anyhow::Result<Vec<Uuid>> {
    match job {
        Job::AbSignificance => ab_tests::users_with_running_tests(pool).await,
        _ => snapshots::connected_users(pool).await,
    }
}

async fn run_all(
    ctx: &JobContext,
    job: Job,
    users: Vec<Uuid>,
    opts: RunOptions,
    concurrency: usize,
) -> Summary {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for user_id in users {
        let ctx = ctx.clone();
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            (user_id, run_user(&ctx, job, user_id, opts).await)
        });
    }

    let mut summary = Summary::default();
    while let Some(joined) = set.join_next().await {
        summary.users += 1;
        match joined {
            Ok((_, Ok(UserOutcome::Done(report)))) => {
                summary.succeeded += 1;
                summary.totals += &report;
            }
            Ok((user_id, Ok(UserOutcome::Locked))) => {
                tracing::warn!(%job, %user_id, "job lock held by another run; user skipped");
                summary.locked += 1;
            }
            Ok((user_id, Err(err))) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(%job, %user_id, error = %format!("{err:#}"), "user run failed");
                summary.failed += 1;
            }
            Err(join_err) => {
                tracing::error!(%job, error = %join_err, "user task panicked");
                summary.failed += 1;
            }
        }
    }
    summary
}

async fn run_user(
    ctx: &JobContext,
    job: Job,
    user_id: Uuid,
    opts: RunOptions,
) -> anyhow::Result<UserOutcome> {
    let Some(guard) = lock::try_acquire_job_lock(&ctx.pool, job.as_str(), user_id).await? else {
        return Ok(UserOutcome::Locked);
    };

    let result = jobs::run_for_user(ctx, job, user_id, opts).await;

    if let Err(e) = guard.release().await {
        tracing::warn!(%job, %user_id, error = %e, "failed to release job lock");
    }

    let report = result.with_context(|| format!("{job} failed for user {user_id}"))?;
    Ok(UserOutcome::Done(report))
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
