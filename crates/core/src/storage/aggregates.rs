//! Read-side aggregates that a database may expose as stored functions.
//!
//! Deployments that ran the full migration have `get_creative_health_summary`
//! and `get_ab_test_stats`; older databases fall back to aggregating rows in
//! the process. [`probe`] picks the implementation once at startup.

use crate::domain::ab_test::VariantStats;
use crate::domain::creative::HealthSummary;
use crate::engine::fatigue;
use crate::storage::creative_health;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait AggregateSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn creative_health_summary(&self, user_id: Uuid) -> anyhow::Result<HealthSummary>;

    async fn ab_test_stats(&self, test_id: Uuid) -> anyhow::Result<Vec<VariantStats>>;
}

pub struct StoredFunctions {
    pool: sqlx::PgPool,
}

impl StoredFunctions {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AggregateSource for StoredFunctions {
    fn name(&self) -> &'static str {
        "stored_functions"
    }

    async fn creative_health_summary(&self, user_id: Uuid) -> anyhow::Result<HealthSummary> {
        sqlx::query_as("SELECT * FROM get_creative_health_summary($1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("get_creative_health_summary failed")
    }

    async fn ab_test_stats(&self, test_id: Uuid) -> anyhow::Result<Vec<VariantStats>> {
        sqlx::query_as("SELECT * FROM get_ab_test_stats($1)")
            .bind(test_id)
            .fetch_all(&self.pool)
            .await
            .context("get_ab_test_stats failed")
    }
}

pub struct ManualAggregation {
    pool: sqlx::PgPool,
}

impl ManualAggregation {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AggregateSource for ManualAggregation {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn creative_health_summary(&self, user_id: Uuid) -> anyhow::Result<HealthSummary> {
        let records = creative_health::all_for_user(&self.pool, user_id)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(fatigue::summarize(&records))
    }

    async fn ab_test_stats(&self, test_id: Uuid) -> anyhow::Result<Vec<VariantStats>> {
        sqlx::query_as(
            "SELECT v.id AS variant_id, v.name AS variant_name, v.is_control, \
                    COALESCE(sum(r.impressions), 0)::bigint AS total_impressions, \
                    COALESCE(sum(r.clicks), 0)::bigint AS total_clicks, \
                    COALESCE(sum(r.saves), 0)::bigint AS total_saves, \
                    COALESCE(sum(r.conversions), 0)::bigint AS total_conversions, \
                    COALESCE(sum(r.spend), 0)::double precision AS total_spend \
             FROM ab_test_variants v \
             LEFT JOIN ab_test_results r ON r.variant_id = v.id AND r.test_id = v.test_id \
             WHERE v.test_id = $1 \
             GROUP BY v.id, v.name, v.is_control \
             ORDER BY v.is_control DESC, v.name",
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
        .context("aggregate ab_test_results failed")
    }
}

/// Uses the stored functions when both exist, manual aggregation otherwise.
pub async fn probe(pool: &sqlx::PgPool) -> anyhow::Result<Arc<dyn AggregateSource>> {
    let found: i64 = sqlx::query_scalar(
        "SELECT count(DISTINCT proname) FROM pg_proc \
         WHERE proname IN ('get_creative_health_summary', 'get_ab_test_stats')",
    )
    .fetch_one(pool)
    .await
    .context("probe pg_proc failed")?;

    let source: Arc<dyn AggregateSource> = if found == 2 {
        Arc::new(StoredFunctions::new(pool.clone()))
    } else {
        Arc::new(ManualAggregation::new(pool.clone()))
    };
    tracing::info!(source = source.name(), "aggregate source selected");
    Ok(source)
}
