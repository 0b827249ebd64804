use crate::domain::pillar::{Period, PeriodType};
use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Metrics windows are computed in UTC. An explicit `YYYY-MM-DD` wins.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid as-of date: {s}"));
    }
    Ok(now_utc.date_naive())
}

/// First day of the period containing `date`. Weeks start on Monday.
pub fn period_start(period_type: PeriodType, date: NaiveDate) -> NaiveDate {
    match period_type {
        PeriodType::Week => date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
        PeriodType::Month => date.with_day(1).unwrap_or(date),
        PeriodType::Quarter => {
            let month = (date.month0() / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
        }
    }
}

/// Exclusive end of the period starting at `start`.
pub fn period_end(period: Period) -> NaiveDate {
    let months = match period.period_type {
        PeriodType::Week => return period.start + Duration::days(7),
        PeriodType::Month => 1,
        PeriodType::Quarter => 3,
    };
    period
        .start
        .checked_add_months(chrono::Months::new(months))
        .unwrap_or(period.start)
}

/// Periods the scheduled mix job aggregates on `date`: the current week, plus
/// the current month during its first seven days.
pub fn scheduled_mix_periods(date: NaiveDate) -> Vec<Period> {
    let mut out = vec![Period {
        period_type: PeriodType::Week,
        start: period_start(PeriodType::Week, date),
    }];
    if date.day() <= 7 {
        out.push(Period {
            period_type: PeriodType::Month,
            start: period_start(PeriodType::Month, date),
        });
    }
    out
}

/// Inclusive start of the trailing `days`-day window ending on `as_of`.
pub fn trailing_window_start(as_of: NaiveDate, days: i64) -> NaiveDate {
    as_of - Duration::days(days.max(1) - 1)
}
