//! Shared helpers for the database integration tests.
//!
//! Tests share one database and run in parallel, so each test works under a
//! fresh user id instead of truncating tables.

#![allow(dead_code)]

use adpilot_core::ads::{AdAccount, AdClientFactory, AdPlatformClient, PlatformAction};
use adpilot_core::EngineResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

pub async fn test_pool() -> sqlx::PgPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("failed to connect to test database");
    adpilot_core::storage::migrate(&pool)
        .await
        .expect("migrations failed");
    pool
}

/// Inserts an active campaign for `user_id` and returns its id.
pub async fn insert_campaign(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    name: &str,
    daily_budget: f64,
) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO ad_campaigns (user_id, platform_campaign_id, name, daily_budget, started_at) \
         VALUES ($1, $2, $3, $4, now() - interval '20 days') RETURNING id",
    )
    .bind(user_id)
    .bind(format!("pc-{}", Uuid::new_v4().simple()))
    .bind(name)
    .bind(daily_budget)
    .fetch_one(pool)
    .await
    .expect("insert campaign")
}

/// Seven days of even spend ending on `as_of`; all conversions land on the
/// last day.
pub async fn insert_week_of_metrics(
    pool: &sqlx::PgPool,
    campaign_id: Uuid,
    as_of: chrono::NaiveDate,
    spend: f64,
    conversions: i64,
) {
    for day in 0..7 {
        sqlx::query(
            "INSERT INTO campaign_metrics_daily (campaign_id, metric_date, spend, conversions, clicks, impressions) \
             VALUES ($1, $2, $3, $4, 50, 2000)",
        )
        .bind(campaign_id)
        .bind(as_of - chrono::Duration::days(day))
        .bind(spend / 7.0)
        .bind(if day == 0 { conversions } else { 0 })
        .execute(pool)
        .await
        .expect("insert metrics");
    }
}

pub async fn pending_count(pool: &sqlx::PgPool, campaign_id: Uuid) -> i64 {
    sqlx::query_scalar(
        "SELECT count(*) FROM budget_recommendations WHERE campaign_id = $1 AND status = 'pending'",
    )
    .bind(campaign_id)
    .fetch_one(pool)
    .await
    .expect("count pending")
}

/// Records calls; optionally fails every call or stalls to widen races.
#[derive(Default)]
pub struct RecordingClient {
    pub calls: Mutex<Vec<(String, PlatformAction)>>,
    pub fail_with: Option<String>,
    pub delay: Option<Duration>,
}

#[async_trait::async_trait]
impl AdPlatformClient for RecordingClient {
    fn platform_name(&self) -> &'static str {
        "recording"
    }

    async fn get_ad_accounts(&self) -> anyhow::Result<Vec<AdAccount>> {
        Ok(Vec::new())
    }

    async fn pause_campaign(&self, campaign_id: &str) -> anyhow::Result<()> {
        self.call(campaign_id, PlatformAction::Pause).await
    }

    async fn set_daily_budget(&self, campaign_id: &str, amount: i64) -> anyhow::Result<()> {
        self.call(campaign_id, PlatformAction::SetDailyBudget { amount })
            .await
    }
}

impl RecordingClient {
    async fn call(&self, campaign_id: &str, action: PlatformAction) -> anyhow::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.fail_with {
            anyhow::bail!("{msg}");
        }
        self.calls
            .lock()
            .unwrap()
            .push((campaign_id.to_string(), action));
        Ok(())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// Hands out the same client for every user.
pub struct FixedFactory {
    pub client: Arc<RecordingClient>,
    pub lookups: AtomicUsize,
}

impl FixedFactory {
    pub fn new(client: RecordingClient) -> Self {
        Self {
            client: Arc::new(client),
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl AdClientFactory for FixedFactory {
    async fn for_user(&self, _user_id: Uuid) -> EngineResult<Arc<dyn AdPlatformClient>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}
