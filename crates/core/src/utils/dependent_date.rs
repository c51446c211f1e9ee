//! 跨工作流依赖的日期区间计算

use chrono::{DateTime, Datelike, Duration, Utc};

use super::date::{end_of_day, end_of_hour, start_of_day, start_of_hour};
use crate::{SchedulerError, SchedulerResult};

/// 一个闭区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    fn day(date: DateTime<Utc>) -> Self {
        Self::new(start_of_day(&date), end_of_day(&date))
    }

    fn hour(date: DateTime<Utc>) -> Self {
        Self::new(start_of_hour(&date), end_of_hour(&date))
    }
}

/// 按周期和日期值计算需要检查的区间列表
///
/// 周期为 `hour`/`day`/`week`/`month`，日期值如 `last1Days`、`thisWeek`、`lastMonday`。
pub fn date_intervals(
    business_date: DateTime<Utc>,
    cycle: &str,
    date_value: &str,
) -> SchedulerResult<Vec<DateInterval>> {
    let intervals = match (cycle, date_value) {
        ("hour", "currentHour") => last_hours(business_date, 0),
        ("hour", "last1Hour") => last_hours(business_date, 1),
        ("hour", "last2Hours") => last_hours(business_date, 2),
        ("hour", "last3Hours") => last_hours(business_date, 3),
        ("hour", "last24Hours") => last_hours(business_date, 24),
        ("day", "today") => last_days(business_date, 0),
        ("day", "last1Days") => last_days(business_date, 1),
        ("day", "last2Days") => last_days(business_date, 2),
        ("day", "last3Days") => last_days(business_date, 3),
        ("day", "last7Days") => last_days(business_date, 7),
        ("week", "thisWeek") => this_week(business_date),
        ("week", "lastWeek") => last_week(business_date),
        ("week", day) => match weekday_offset(day) {
            Some(offset) => vec![last_week_day(business_date, offset)],
            None => return Err(unsupported(cycle, date_value)),
        },
        ("month", "thisMonth") => this_month(business_date),
        ("month", "lastMonth") => last_month(business_date),
        ("month", "lastMonthBegin") => {
            let begin = first_day_of_last_month(business_date);
            vec![DateInterval::day(begin)]
        }
        ("month", "lastMonthEnd") => {
            let end = first_day_of_month(business_date) - Duration::days(1);
            vec![DateInterval::day(end)]
        }
        _ => return Err(unsupported(cycle, date_value)),
    };
    Ok(intervals)
}

fn unsupported(cycle: &str, date_value: &str) -> SchedulerError {
    SchedulerError::InvalidTaskParams(format!("不支持的依赖周期: {cycle}/{date_value}"))
}

/// 当前小时或之前的若干个整小时，按时间先后排列
fn last_hours(business_date: DateTime<Utc>, hours: i64) -> Vec<DateInterval> {
    if hours == 0 {
        return vec![DateInterval::hour(business_date)];
    }
    (1..=hours)
        .rev()
        .map(|h| DateInterval::hour(business_date - Duration::hours(h)))
        .collect()
}

fn last_days(business_date: DateTime<Utc>, days: i64) -> Vec<DateInterval> {
    if days == 0 {
        return vec![DateInterval::day(business_date)];
    }
    (1..=days)
        .rev()
        .map(|d| DateInterval::day(business_date - Duration::days(d)))
        .collect()
}

fn monday_of(date: DateTime<Utc>) -> DateTime<Utc> {
    let offset = i64::from(date.weekday().num_days_from_monday());
    start_of_day(&(date - Duration::days(offset)))
}

/// 本周一到当天
fn this_week(business_date: DateTime<Utc>) -> Vec<DateInterval> {
    days_between(monday_of(business_date), business_date)
}

fn last_week(business_date: DateTime<Utc>) -> Vec<DateInterval> {
    let monday = monday_of(business_date) - Duration::days(7);
    days_between(monday, monday + Duration::days(6))
}

fn weekday_offset(value: &str) -> Option<i64> {
    let offset = match value {
        "lastMonday" => 0,
        "lastTuesday" => 1,
        "lastWednesday" => 2,
        "lastThursday" => 3,
        "lastFriday" => 4,
        "lastSaturday" => 5,
        "lastSunday" => 6,
        _ => return None,
    };
    Some(offset)
}

fn last_week_day(business_date: DateTime<Utc>, offset: i64) -> DateInterval {
    let monday = monday_of(business_date) - Duration::days(7);
    DateInterval::day(monday + Duration::days(offset))
}

fn first_day_of_month(date: DateTime<Utc>) -> DateTime<Utc> {
    let offset = i64::from(date.day0());
    start_of_day(&(date - Duration::days(offset)))
}

fn first_day_of_last_month(date: DateTime<Utc>) -> DateTime<Utc> {
    first_day_of_month(first_day_of_month(date) - Duration::days(1))
}

/// 本月一号到当天
fn this_month(business_date: DateTime<Utc>) -> Vec<DateInterval> {
    days_between(first_day_of_month(business_date), business_date)
}

fn last_month(business_date: DateTime<Utc>) -> Vec<DateInterval> {
    let end = first_day_of_month(business_date) - Duration::days(1);
    days_between(first_day_of_last_month(business_date), end)
}

fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateInterval> {
    let mut intervals = Vec::new();
    let mut current = start_of_day(&start);
    let last = start_of_day(&end);
    while current <= last {
        intervals.push(DateInterval::day(current));
        current += Duration::days(1);
    }
    intervals
}
