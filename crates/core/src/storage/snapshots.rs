//! Read side of the external collectors: settings, campaign windows and
//! per-content metrics.

use crate::domain::metrics::{CampaignMetrics, MetricSnapshot};
use crate::domain::pillar::{ContentItemMetrics, Period};
use crate::domain::recommendation::{CampaignPerformance, Guardrails};
use crate::time::period::{period_end, trailing_window_start};
use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

const PERFORMANCE_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationMode {
    Manual,
    Autopilot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserSettings {
    pub automation_mode: AutomationMode,
    pub guardrails: Guardrails,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            automation_mode: AutomationMode::Manual,
            guardrails: Guardrails::default(),
        }
    }
}

/// Users with a connected Pinterest integration.
pub async fn connected_users(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Uuid>> {
    sqlx::query_scalar(
        "SELECT user_id FROM user_settings \
         WHERE integrations -> 'pinterest' IS NOT NULL AND integrations -> 'pinterest' <> 'null'::jsonb \
         ORDER BY user_id",
    )
    .fetch_all(pool)
    .await
    .context("select connected users failed")
}

pub async fn user_settings(pool: &sqlx::PgPool, user_id: Uuid) -> anyhow::Result<UserSettings> {
    let row: Option<(String, Option<f64>, Option<f64>)> = sqlx::query_as(
        "SELECT automation_mode, weekly_budget_cap, monthly_budget_cap \
         FROM user_settings WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("select user_settings failed")?;

    Ok(match row {
        Some((mode, weekly_cap, monthly_cap)) => UserSettings {
            automation_mode: if mode == "autopilot" {
                AutomationMode::Autopilot
            } else {
                AutomationMode::Manual
            },
            guardrails: Guardrails {
                weekly_cap,
                monthly_cap,
            },
        },
        None => UserSettings::default(),
    })
}

pub async fn pinterest_access_token(
    pool: &sqlx::PgPool,
    user_id: Uuid,
) -> anyhow::Result<Option<String>> {
    let token: Option<Option<String>> = sqlx::query_scalar(
        "SELECT integrations -> 'pinterest' ->> 'access_token' FROM user_settings WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("select pinterest access token failed")?;
    Ok(token.flatten().filter(|t| !t.is_empty()))
}

/// Active campaigns with their trailing seven-day totals up to `as_of`.
pub async fn campaign_performance(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    as_of: NaiveDate,
) -> anyhow::Result<Vec<CampaignPerformance>> {
    sqlx::query_as(
        "SELECT c.id, c.platform_campaign_id, c.name, c.daily_budget, \
         COALESCE(sum(m.spend), 0)::double precision AS spend_7d, \
         COALESCE(sum(m.conversions), 0)::bigint AS conversions_7d, \
         COALESCE(sum(m.clicks), 0)::bigint AS clicks_7d, \
         COALESCE(sum(m.impressions), 0)::bigint AS impressions_7d, \
         GREATEST(0, $3::date - COALESCE(c.started_at, c.created_at)::date)::int AS days_active \
         FROM ad_campaigns c \
         LEFT JOIN campaign_metrics_daily m \
           ON m.campaign_id = c.id AND m.metric_date BETWEEN $2 AND $3 \
         WHERE c.user_id = $1 AND c.status = 'ACTIVE' \
         GROUP BY c.id ORDER BY c.name",
    )
    .bind(user_id)
    .bind(trailing_window_start(as_of, PERFORMANCE_WINDOW_DAYS))
    .bind(as_of)
    .fetch_all(pool)
    .await
    .context("select campaign performance failed")
}

pub fn to_campaign_metrics(p: &CampaignPerformance, average_order_value: f64) -> CampaignMetrics {
    CampaignMetrics {
        campaign_id: p.id,
        platform_campaign_id: p.platform_campaign_id.clone(),
        spend: p.spend_7d,
        conversions: p.conversions_7d,
        clicks: p.clicks_7d,
        impressions: p.impressions_7d,
        days_active: p.days_active,
        daily_budget: p.daily_budget,
        average_order_value,
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContentSnapshot {
    pub content_type: String,
    #[sqlx(flatten)]
    pub snapshot: MetricSnapshot,
}

/// Latest snapshot on or before `as_of` for each published item.
pub async fn latest_content_snapshots(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    as_of: NaiveDate,
) -> anyhow::Result<Vec<ContentSnapshot>> {
    sqlx::query_as(
        "SELECT DISTINCT ON (i.id) i.content_type, i.id AS entity_id, m.metric_date AS as_of_date, \
         m.spend, m.conversions, m.clicks, m.impressions, m.views, m.likes, m.comments, m.shares, m.saves \
         FROM content_items i \
         JOIN content_metrics_daily m ON m.content_id = i.id AND m.metric_date <= $2 \
         WHERE i.user_id = $1 AND i.status = 'published' \
         ORDER BY i.id, m.metric_date DESC",
    )
    .bind(user_id)
    .bind(as_of)
    .fetch_all(pool)
    .await
    .context("select latest content snapshots failed")
}

/// Per-item totals for content published in `period`.
pub async fn content_item_metrics(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    period: Period,
) -> anyhow::Result<Vec<ContentItemMetrics>> {
    sqlx::query_as(
        "SELECT i.id AS content_id, i.pillar_id, \
         COALESCE(sum(m.impressions), 0)::bigint AS impressions, \
         COALESCE(sum(m.clicks), 0)::bigint AS clicks, \
         COALESCE(sum(m.saves), 0)::bigint AS saves, \
         i.is_winner \
         FROM content_items i \
         LEFT JOIN content_metrics_daily m \
           ON m.content_id = i.id AND m.metric_date >= $2 AND m.metric_date < $3 \
         WHERE i.user_id = $1 AND i.status = 'published' \
           AND i.published_at >= $2 AND i.published_at < $3 \
         GROUP BY i.id",
    )
    .bind(user_id)
    .bind(period.start)
    .bind(period_end(period))
    .fetch_all(pool)
    .await
    .context("select content item metrics failed")
}
