use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::{SchedulerError, SchedulerResult};

/// 命令参数中使用的时间格式
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 解析 `yyyy-MM-dd HH:mm:ss`（或仅日期）格式的时间，按UTC处理
pub fn parse_datetime(value: &str) -> SchedulerResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| SchedulerError::InvalidCommandParam(format!("无法解析时间: {value}")))
}

pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// 当天零点
pub fn start_of_day(value: &DateTime<Utc>) -> DateTime<Utc> {
    value
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(*value)
}

/// 当天最后一秒
pub fn end_of_day(value: &DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(value) + Duration::days(1) - Duration::seconds(1)
}

/// 整点开始
pub fn start_of_hour(value: &DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(value) + Duration::hours(i64::from(value.hour()))
}

pub fn end_of_hour(value: &DateTime<Utc>) -> DateTime<Utc> {
    start_of_hour(value) + Duration::hours(1) - Duration::seconds(1)
}

/// 按分钟计算的时间差
pub fn diff_minutes(later: &DateTime<Utc>, earlier: &DateTime<Utc>) -> i64 {
    (*later - *earlier).num_minutes()
}
