//! Creative fatigue: a one-time baseline from a creative's first week, then a
//! daily score of how far its recent rates have fallen from that baseline.

use crate::domain::creative::{
    Baseline, CreativeHealth, CreativeMetrics, DailyMetrics, HealthStatus, HealthSummary,
    MetricsHistory, TrendPoint,
};
use crate::engine::config::{FatigueConfig, StatusBands};
use crate::scoring::{fatigue_score, mean, Rates};
use chrono::{DateTime, NaiveDate, Utc};

/// Status band for a score once a baseline exists.
pub fn status_for(score: i32, bands: &StatusBands) -> HealthStatus {
    if score < bands.healthy {
        HealthStatus::Healthy
    } else if score < bands.declining {
        HealthStatus::Declining
    } else if score < bands.fatigued {
        HealthStatus::Fatigued
    } else {
        HealthStatus::Critical
    }
}

fn window_rates<'a>(days: impl Iterator<Item = &'a DailyMetrics> + Clone) -> Rates {
    Rates {
        ctr: mean(days.clone().map(|d| d.metrics.ctr)),
        engagement_rate: mean(days.clone().map(|d| d.metrics.engagement_rate)),
        save_rate: mean(days.map(|d| d.metrics.save_rate)),
    }
}

/// Folds one day of metrics into `health`.
///
/// The baseline is captured at most once per refresh cycle; later calls never
/// touch it.
pub fn apply_daily_metrics(
    health: &mut CreativeHealth,
    date: NaiveDate,
    metrics: CreativeMetrics,
    cfg: &FatigueConfig,
    now: DateTime<Utc>,
) {
    health.metrics_history.record(DailyMetrics { date, metrics });
    health.current = Some(metrics);
    health.last_metrics_update = Some(now);
    health.days_active = health.metrics_history.len() as i32;

    if health.baseline.is_none()
        && health.metrics_history.len() >= cfg.baseline_min_days
        && health.metrics_history.total_impressions() >= cfg.baseline_min_impressions
    {
        let rates = window_rates(health.metrics_history.first(cfg.baseline_min_days));
        health.baseline = Some(Baseline {
            ctr: rates.ctr,
            engagement_rate: rates.engagement_rate,
            save_rate: rates.save_rate,
            impressions: health
                .metrics_history
                .first(cfg.baseline_min_days)
                .map(|d| d.metrics.impressions)
                .sum(),
            captured_at: now,
        });
        tracing::debug!(content_id = %health.content_id, "baseline captured");
    }

    let Some(baseline) = health.baseline else {
        health.fatigue_score = 0;
        health.status = HealthStatus::PendingBaseline;
        return;
    };

    let current = window_rates(health.metrics_history.last(cfg.current_window_days));
    let base = Rates {
        ctr: baseline.ctr,
        engagement_rate: baseline.engagement_rate,
        save_rate: baseline.save_rate,
    };

    health.fatigue_score = fatigue_score(base, current, &cfg.weights);
    health.status = status_for(health.fatigue_score, &cfg.bands);
    health.days_since_baseline = (health.days_active - cfg.baseline_min_days as i32).max(0);

    if health.status.needs_refresh() && !health.refresh_recommended {
        health.refresh_recommended = true;
        health.refresh_recommended_at = Some(now);
        health.refresh_reason = Some(format!(
            "Fatigue score {} ({}): performance down from baseline",
            health.fatigue_score,
            health.status.as_str()
        ));
    }
}

/// Puts a refreshed creative back at the start of its lifecycle.
pub fn reset_for_refresh(health: &mut CreativeHealth, now: DateTime<Utc>) {
    health.baseline = None;
    health.metrics_history = MetricsHistory::new();
    health.fatigue_score = 0;
    health.status = HealthStatus::PendingBaseline;
    health.days_active = 0;
    health.days_since_baseline = 0;
    health.refresh_recommended = false;
    health.refresh_recommended_at = None;
    health.refresh_reason = None;
    health.last_refresh_at = Some(now);
    health.refresh_count += 1;
}

/// Per-status counts; the average score only covers baselined records.
pub fn summarize<'a>(records: impl IntoIterator<Item = &'a CreativeHealth>) -> HealthSummary {
    let mut out = HealthSummary::default();
    let mut baselined_scores = Vec::new();

    for r in records {
        out.total_tracked += 1;
        match r.status {
            HealthStatus::PendingBaseline => out.pending_baseline += 1,
            HealthStatus::Healthy => out.healthy += 1,
            HealthStatus::Declining => out.declining += 1,
            HealthStatus::Fatigued => out.fatigued += 1,
            HealthStatus::Critical => out.critical += 1,
        }
        if r.refresh_recommended {
            out.refresh_recommended += 1;
        }
        if r.baseline.is_some() {
            baselined_scores.push(f64::from(r.fatigue_score));
        }
    }

    out.avg_fatigue_score = mean(baselined_scores);
    out
}

pub fn trend(health: &CreativeHealth) -> Vec<TrendPoint> {
    let baseline_ctr = health.baseline.map(|b| b.ctr);
    health
        .metrics_history
        .iter()
        .map(|d| TrendPoint {
            date: d.date,
            ctr: d.metrics.ctr,
            baseline_ctr,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::creative::ContentType;
    use chrono::{Days, Duration, TimeZone};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 6, 0, 0).unwrap()
    }

    fn date(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 1).unwrap() + Days::new(n)
    }

    fn m(ctr: f64, impressions: i64) -> CreativeMetrics {
        CreativeMetrics {
            ctr,
            engagement_rate: ctr * 2.0,
            save_rate: ctr / 2.0,
            impressions,
        }
    }

    fn fresh() -> CreativeHealth {
        CreativeHealth::new(Uuid::from_u128(5), ContentType::Pin, "pin-123")
    }

    fn feed(h: &mut CreativeHealth, days: std::ops::Range<u64>, metrics: CreativeMetrics) {
        let cfg = FatigueConfig::default();
        for n in days {
            apply_daily_metrics(h, date(n), metrics, &cfg, t0() + Duration::days(n as i64));
        }
    }

    #[test]
    fn baseline_waits_for_days_and_impressions() {
        let mut h = fresh();
        feed(&mut h, 0..6, m(0.02, 500));
        assert!(h.baseline.is_none());
        assert_eq!(h.status, HealthStatus::PendingBaseline);

        let mut thin = fresh();
        feed(&mut thin, 0..10, m(0.02, 50));
        assert!(thin.baseline.is_none());
        assert_eq!(thin.days_active, 10);

        feed(&mut h, 6..7, m(0.02, 500));
        let b = h.baseline.expect("baseline after seven days");
        assert!((b.ctr - 0.02).abs() < 1e-12);
        assert_eq!(b.impressions, 3500);
        assert_eq!(h.status, HealthStatus::Healthy);
    }

    #[test]
    fn baseline_is_captured_once() {
        let mut h = fresh();
        feed(&mut h, 0..7, m(0.02, 500));
        let captured = h.baseline.unwrap();

        feed(&mut h, 7..30, m(0.005, 500));
        assert_eq!(h.baseline.unwrap().captured_at, captured.captured_at);
        assert_eq!(h.baseline.unwrap().ctr, captured.ctr);
        assert_eq!(h.days_since_baseline, 23);
    }

    #[test]
    fn decline_moves_through_bands_and_flags_refresh() {
        let mut h = fresh();
        feed(&mut h, 0..7, m(0.02, 500));
        assert_eq!(h.fatigue_score, 0);

        // Every rate down 40% over the trailing week.
        feed(&mut h, 7..14, m(0.012, 500));
        assert_eq!(h.fatigue_score, 40);
        assert_eq!(h.status, HealthStatus::Declining);
        assert!(!h.refresh_recommended);

        feed(&mut h, 14..21, m(0.004, 500));
        assert_eq!(h.fatigue_score, 80);
        assert_eq!(h.status, HealthStatus::Critical);
        assert!(h.refresh_recommended);
        assert!(h.refresh_recommended_at.is_some());
        // Flagged on entering the fatigued band, not re-flagged at critical.
        assert!(h.refresh_reason.as_deref().unwrap().contains("fatigued"));
    }

    #[test]
    fn same_day_updates_overwrite() {
        let mut h = fresh();
        feed(&mut h, 0..1, m(0.02, 100));
        feed(&mut h, 0..1, m(0.03, 200));
        assert_eq!(h.days_active, 1);
        assert_eq!(h.metrics_history.total_impressions(), 200);
        assert_eq!(h.current.unwrap().ctr, 0.03);
    }

    #[test]
    fn refresh_resets_and_counts() {
        let mut h = fresh();
        feed(&mut h, 0..21, m(0.02, 500));
        reset_for_refresh(&mut h, t0());
        assert!(h.baseline.is_none());
        assert!(h.metrics_history.is_empty());
        assert_eq!(h.status, HealthStatus::PendingBaseline);
        assert_eq!(h.refresh_count, 1);
        assert_eq!(h.last_refresh_at, Some(t0()));

        reset_for_refresh(&mut h, t0());
        assert_eq!(h.refresh_count, 2);
    }

    #[test]
    fn summary_averages_only_baselined() {
        let mut a = fresh();
        feed(&mut a, 0..7, m(0.02, 500));
        feed(&mut a, 7..14, m(0.012, 500));
        let b = fresh();

        let s = summarize([&a, &b]);
        assert_eq!(s.total_tracked, 2);
        assert_eq!(s.pending_baseline, 1);
        assert_eq!(s.declining, 1);
        assert_eq!(s.avg_fatigue_score, 40.0);
    }

    #[test]
    fn trend_carries_baseline_ctr() {
        let mut h = fresh();
        feed(&mut h, 0..8, m(0.02, 500));
        let points = trend(&h);
        assert_eq!(points.len(), 8);
        assert!(points.iter().all(|p| p.baseline_ctr == Some(h.baseline.unwrap().ctr)));
    }

    #[test]
    fn bands_are_configurable() {
        let bands = StatusBands {
            healthy: 10,
            declining: 20,
            fatigued: 30,
        };
        assert_eq!(status_for(9, &bands), HealthStatus::Healthy);
        assert_eq!(status_for(20, &bands), HealthStatus::Fatigued);
        assert_eq!(status_for(30, &bands), HealthStatus::Critical);
    }
}
