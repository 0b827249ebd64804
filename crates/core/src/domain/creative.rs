use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

pub const HISTORY_CAPACITY: usize = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Pin,
    AdCreative,
    Asset,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pin => "pin",
            Self::AdCreative => "ad_creative",
            Self::Asset => "asset",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "pin" => Self::Pin,
            "ad_creative" => Self::AdCreative,
            "asset" => Self::Asset,
            other => anyhow::bail!("unknown content type: {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    PendingBaseline,
    Healthy,
    Declining,
    Fatigued,
    Critical,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingBaseline => "pending_baseline",
            Self::Healthy => "healthy",
            Self::Declining => "declining",
            Self::Fatigued => "fatigued",
            Self::Critical => "critical",
        }
    }

    pub fn needs_refresh(self) -> bool {
        matches!(self, Self::Fatigued | Self::Critical)
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "pending_baseline" => Self::PendingBaseline,
            "healthy" => Self::Healthy,
            "declining" => Self::Declining,
            "fatigued" => Self::Fatigued,
            "critical" => Self::Critical,
            other => anyhow::bail!("unknown health status: {other}"),
        })
    }
}

/// Rates observed for a creative on one day (or averaged over a window).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CreativeMetrics {
    pub ctr: f64,
    pub engagement_rate: f64,
    pub save_rate: f64,
    pub impressions: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub metrics: CreativeMetrics,
}

/// Daily entries, oldest first, holding at most [`HISTORY_CAPACITY`] days.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsHistory(VecDeque<DailyMetrics>);

impl MetricsHistory {
    pub fn new() -> Self {
        Self(VecDeque::with_capacity(HISTORY_CAPACITY))
    }

    /// Overwrites the entry for `entry.date` if present, otherwise inserts in
    /// date order. Once full the oldest day is dropped; an entry older than
    /// every stored day is ignored.
    pub fn record(&mut self, entry: DailyMetrics) {
        let at = self.0.partition_point(|d| d.date < entry.date);
        if let Some(existing) = self.0.get_mut(at).filter(|d| d.date == entry.date) {
            *existing = entry;
            return;
        }
        if self.0.len() >= HISTORY_CAPACITY {
            if at == 0 {
                return;
            }
            self.0.pop_front();
            self.0.insert(at - 1, entry);
            return;
        }
        self.0.insert(at, entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DailyMetrics> {
        self.0.iter()
    }

    pub fn total_impressions(&self) -> i64 {
        self.0.iter().map(|d| d.metrics.impressions).sum()
    }

    /// Oldest `n` days.
    pub fn first(&self, n: usize) -> impl Iterator<Item = &DailyMetrics> + Clone {
        self.0.iter().take(n)
    }

    /// Newest `n` days, oldest of them first.
    pub fn last(&self, n: usize) -> impl Iterator<Item = &DailyMetrics> + Clone {
        self.0.iter().skip(self.0.len().saturating_sub(n))
    }
}

impl FromIterator<DailyMetrics> for MetricsHistory {
    fn from_iter<I: IntoIterator<Item = DailyMetrics>>(iter: I) -> Self {
        let mut out = Self::new();
        for entry in iter {
            out.record(entry);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub ctr: f64,
    pub engagement_rate: f64,
    pub save_rate: f64,
    pub impressions: i64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeHealth {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_type: ContentType,
    pub content_id: String,
    pub baseline: Option<Baseline>,
    pub current: Option<CreativeMetrics>,
    pub last_metrics_update: Option<DateTime<Utc>>,
    pub metrics_history: MetricsHistory,
    pub fatigue_score: i32,
    pub status: HealthStatus,
    pub days_active: i32,
    pub days_since_baseline: i32,
    pub refresh_recommended: bool,
    pub refresh_recommended_at: Option<DateTime<Utc>>,
    pub refresh_reason: Option<String>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub refresh_count: i32,
}

impl CreativeHealth {
    /// Fresh record in the pending-baseline state.
    pub fn new(user_id: Uuid, content_type: ContentType, content_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            content_type,
            content_id: content_id.into(),
            baseline: None,
            current: None,
            last_metrics_update: None,
            metrics_history: MetricsHistory::new(),
            fatigue_score: 0,
            status: HealthStatus::PendingBaseline,
            days_active: 0,
            days_since_baseline: 0,
            refresh_recommended: false,
            refresh_recommended_at: None,
            refresh_reason: None,
            last_refresh_at: None,
            refresh_count: 0,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreativeHealthRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_type: String,
    pub content_id: String,
    pub baseline_ctr: Option<f64>,
    pub baseline_engagement_rate: Option<f64>,
    pub baseline_save_rate: Option<f64>,
    pub baseline_impressions: Option<i64>,
    pub baseline_captured_at: Option<DateTime<Utc>>,
    pub current_ctr: Option<f64>,
    pub current_engagement_rate: Option<f64>,
    pub current_save_rate: Option<f64>,
    pub current_impressions: Option<i64>,
    pub last_metrics_update: Option<DateTime<Utc>>,
    pub metrics_history: sqlx::types::Json<MetricsHistory>,
    pub fatigue_score: i32,
    pub status: String,
    pub days_active: i32,
    pub days_since_baseline: i32,
    pub refresh_recommended: bool,
    pub refresh_recommended_at: Option<DateTime<Utc>>,
    pub refresh_reason: Option<String>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub refresh_count: i32,
}

impl TryFrom<CreativeHealthRow> for CreativeHealth {
    type Error = anyhow::Error;

    fn try_from(row: CreativeHealthRow) -> anyhow::Result<Self> {
        let baseline = match (
            row.baseline_ctr,
            row.baseline_engagement_rate,
            row.baseline_save_rate,
            row.baseline_captured_at,
        ) {
            (Some(ctr), Some(engagement_rate), Some(save_rate), Some(captured_at)) => {
                Some(Baseline {
                    ctr,
                    engagement_rate,
                    save_rate,
                    impressions: row.baseline_impressions.unwrap_or(0),
                    captured_at,
                })
            }
            _ => None,
        };
        let current = row.current_ctr.map(|ctr| CreativeMetrics {
            ctr,
            engagement_rate: row.current_engagement_rate.unwrap_or(0.0),
            save_rate: row.current_save_rate.unwrap_or(0.0),
            impressions: row.current_impressions.unwrap_or(0),
        });

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            content_type: row.content_type.parse()?,
            content_id: row.content_id,
            baseline,
            current,
            last_metrics_update: row.last_metrics_update,
            metrics_history: row.metrics_history.0,
            fatigue_score: row.fatigue_score,
            status: row.status.parse()?,
            days_active: row.days_active,
            days_since_baseline: row.days_since_baseline,
            refresh_recommended: row.refresh_recommended,
            refresh_recommended_at: row.refresh_recommended_at,
            refresh_reason: row.refresh_reason,
            last_refresh_at: row.last_refresh_at,
            refresh_count: row.refresh_count,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HealthSummary {
    pub total_tracked: i64,
    pub pending_baseline: i64,
    pub healthy: i64,
    pub declining: i64,
    pub fatigued: i64,
    pub critical: i64,
    pub refresh_recommended: i64,
    pub avg_fatigue_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub ctr: f64,
    pub baseline_ctr: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32, impressions: i64) -> DailyMetrics {
        DailyMetrics {
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Days::new(n as u64),
            metrics: CreativeMetrics {
                ctr: 0.01,
                engagement_rate: 0.02,
                save_rate: 0.005,
                impressions,
            },
        }
    }

    #[test]
    fn same_day_overwrites() {
        let mut h = MetricsHistory::new();
        h.record(day(0, 100));
        h.record(day(0, 250));
        assert_eq!(h.len(), 1);
        assert_eq!(h.total_impressions(), 250);
    }

    #[test]
    fn history_drops_oldest_when_full() {
        let h: MetricsHistory = (0..95).map(|n| day(n, 1)).collect();
        assert_eq!(h.len(), HISTORY_CAPACITY);
        assert_eq!(h.iter().next().unwrap().date, day(5, 1).date);
        assert_eq!(h.iter().last().unwrap().date, day(94, 1).date);
    }

    #[test]
    fn backfilled_day_lands_in_date_order() {
        let mut h = MetricsHistory::new();
        for n in [2, 3, 4, 1] {
            h.record(day(n, n as i64));
        }
        let order: Vec<NaiveDate> = h.iter().map(|d| d.date).collect();
        assert_eq!(order, vec![day(1, 0).date, day(2, 0).date, day(3, 0).date, day(4, 0).date]);
        assert_eq!(h.first(1).next().unwrap().date, day(1, 0).date);
        assert_eq!(h.last(1).next().unwrap().date, day(4, 0).date);
    }

    #[test]
    fn full_history_keeps_newest_days_on_backfill() {
        let mut h: MetricsHistory = (10..10 + HISTORY_CAPACITY as u32).map(|n| day(n, 1)).collect();

        // Older than everything kept: ignored.
        h.record(day(0, 500));
        assert_eq!(h.len(), HISTORY_CAPACITY);
        assert_eq!(h.iter().next().unwrap().date, day(10, 1).date);
        assert_eq!(h.total_impressions(), HISTORY_CAPACITY as i64);

        // Inside the window: the oldest day makes room.
        let gap = 10 + HISTORY_CAPACITY as u32 + 5;
        h.record(day(gap, 1));
        h.record(day(gap - 2, 7));
        let dates: Vec<NaiveDate> = h.iter().map(|d| d.date).collect();
        assert_eq!(h.len(), HISTORY_CAPACITY);
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(dates[0], day(12, 1).date);
        assert_eq!(*dates.last().unwrap(), day(gap, 1).date);
    }

    #[test]
    fn first_and_last_windows() {
        let h: MetricsHistory = (0..10).map(|n| day(n, n as i64)).collect();
        let first: Vec<i64> = h.first(7).map(|d| d.metrics.impressions).collect();
        let last: Vec<i64> = h.last(3).map(|d| d.metrics.impressions).collect();
        assert_eq!(first, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(last, vec![7, 8, 9]);
    }

    #[test]
    fn history_serializes_as_flat_array() {
        let h: MetricsHistory = (0..1).map(|n| day(n, 10)).collect();
        let v = serde_json::to_value(&h).unwrap();
        assert_eq!(v[0]["date"], "2026-01-01");
        assert_eq!(v[0]["impressions"], 10);
    }
}
