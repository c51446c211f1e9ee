use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use scheduler_core::{SchedulerError, SchedulerResult};

/// CRON表达式解析工具
///
/// 定时配置沿用Quartz风格，`?` 表示不指定，解析前统一替换为 `*`。
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = cron_expr.replace('?', "*");
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 区间 (start, end] 内的全部触发时间
    pub fn fire_dates_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let dates: Vec<DateTime<Utc>> = self
            .schedule
            .after(&start)
            .take_while(|time| *time <= end)
            .collect();
        debug!(
            "计算触发时间: {} ~ {}, 共 {} 个",
            start.format("%Y-%m-%d %H:%M:%S UTC"),
            end.format("%Y-%m-%d %H:%M:%S UTC"),
            dates.len()
        );
        dates
    }
}

/// 多个定时配置在区间内的触发时间，去重后升序排列
pub fn merged_fire_dates(
    crontabs: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> SchedulerResult<Vec<DateTime<Utc>>> {
    let mut dates = Vec::new();
    for crontab in crontabs {
        dates.extend(CronScheduler::new(crontab)?.fire_dates_between(start, end));
    }
    dates.sort();
    dates.dedup();
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_question_mark_is_accepted() {
        assert!(CronScheduler::new("0 0 0 1/2 * ?").is_ok());
        let err = CronScheduler::new("not a cron").err().unwrap();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[test]
    fn test_fire_dates_exclude_start() {
        let cron = CronScheduler::new("0 0 0 * * ?").unwrap();
        let dates = cron.fire_dates_between(utc(2019, 1, 1), utc(2019, 1, 3));
        assert_eq!(dates, vec![utc(2019, 1, 2), utc(2019, 1, 3)]);
    }

    #[test]
    fn test_odd_days_in_month() {
        let dates = merged_fire_dates(
            &["0 0 0 1/2 * ?".to_string()],
            utc(2019, 1, 1),
            utc(2019, 1, 31),
        )
        .unwrap();
        assert_eq!(dates.len(), 15);
        assert_eq!(dates.first(), Some(&utc(2019, 1, 3)));
        assert_eq!(dates.last(), Some(&utc(2019, 1, 31)));
    }

    #[test]
    fn test_next_execution_time() {
        let cron = CronScheduler::new("0 30 * * * *").unwrap();
        let next = cron.next_execution_time(utc(2020, 5, 1)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2020, 5, 1, 0, 30, 0).unwrap());
    }
}
