//! Per-user batch passes shared by the worker (scheduled) and the API
//! (on-demand triggers). Each pass re-reads everything it needs from the
//! store; nothing is carried between runs.

pub mod ab_significance;
pub mod budget;
pub mod content_mix;
pub mod creative_health;
pub mod performance;

use crate::ads::AdClientFactory;
use crate::engine::EngineConfig;
use crate::storage::aggregates::AggregateSource;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    PerformanceEvaluation,
    BudgetRecommendations,
    AbSignificance,
    CreativeHealth,
    ContentMix,
}

impl Job {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerformanceEvaluation => "performance-evaluation",
            Self::BudgetRecommendations => "budget-recommendations",
            Self::AbSignificance => "ab-significance",
            Self::CreativeHealth => "creative-health",
            Self::ContentMix => "content-mix",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Long-lived collaborators, built once per process.
#[derive(Clone)]
pub struct JobContext {
    pub pool: sqlx::PgPool,
    pub engine: Arc<EngineConfig>,
    pub ads: Arc<dyn AdClientFactory>,
    pub aggregates: Arc<dyn AggregateSource>,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub as_of: NaiveDate,
    pub now: DateTime<Utc>,
    /// Compute everything but write nothing and call no platform.
    pub dry_run: bool,
}

impl RunOptions {
    pub fn new(as_of: NaiveDate, dry_run: bool) -> Self {
        Self {
            as_of,
            now: Utc::now(),
            dry_run,
        }
    }
}

/// Counters for one user's pass. Fields a job does not touch stay zero and
/// are omitted from the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    #[serde(skip_serializing_if = "is_zero")]
    pub examined: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub generated: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub applied: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub pending: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub failed: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub superseded: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub skipped: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl std::ops::AddAssign<&JobReport> for JobReport {
    fn add_assign(&mut self, rhs: &JobReport) {
        self.examined += rhs.examined;
        self.generated += rhs.generated;
        self.applied += rhs.applied;
        self.pending += rhs.pending;
        self.failed += rhs.failed;
        self.superseded += rhs.superseded;
        self.skipped += rhs.skipped;
    }
}

/// Runs one job for one user.
pub async fn run_for_user(
    ctx: &JobContext,
    job: Job,
    user_id: uuid::Uuid,
    opts: RunOptions,
) -> crate::EngineResult<JobReport> {
    match job {
        Job::PerformanceEvaluation => performance::run(ctx, user_id, opts).await,
        Job::BudgetRecommendations => budget::run(ctx, user_id, opts).await,
        Job::AbSignificance => ab_significance::run(ctx, user_id, opts).await,
        Job::CreativeHealth => creative_health::run(ctx, user_id, opts).await,
        Job::ContentMix => content_mix::run(ctx, user_id, opts).await,
    }
}
