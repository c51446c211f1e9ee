//! 全局参数固化
//!
//! 将 `${name}` 引用替换为内置参数或其他参数的值，
//! 将 `$[yyyyMMdd±N]` 形式的时间占位符按业务时间展开。

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::models::{CommandType, Property};

pub const PARAMETER_BUSINESS_DATE: &str = "system.biz.date";
pub const PARAMETER_CURRENT_DATE: &str = "system.biz.curdate";
pub const PARAMETER_DATETIME: &str = "system.datetime";

/// 计算内置的业务时间参数
///
/// 补数与定时调度以调度时间为基准，手动启动以当前时间为基准；业务日期为基准日期的前一天。
pub fn business_time_params(
    command_type: CommandType,
    schedule_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> HashMap<String, String> {
    let base = match (command_type, schedule_time) {
        (CommandType::ComplementData | CommandType::Scheduler, Some(time)) => time,
        _ => now,
    };
    let mut params = HashMap::new();
    params.insert(
        PARAMETER_BUSINESS_DATE.to_string(),
        (base - Duration::days(1)).format("%Y%m%d").to_string(),
    );
    params.insert(
        PARAMETER_CURRENT_DATE.to_string(),
        base.format("%Y%m%d").to_string(),
    );
    params.insert(
        PARAMETER_DATETIME.to_string(),
        base.format("%Y%m%d%H%M%S").to_string(),
    );
    params
}

/// 固化全局参数，返回值已替换的新列表
pub fn cure_global_params(
    global_params: &[Property],
    command_type: CommandType,
    schedule_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<Property> {
    let base = schedule_time.unwrap_or(now);
    let mut known = business_time_params(command_type, schedule_time, now);
    for property in global_params {
        known
            .entry(property.prop.clone())
            .or_insert_with(|| property.value.clone());
    }

    global_params
        .iter()
        .map(|property| {
            let value = replace_variables(&property.value, &known);
            let value = replace_time_placeholders(&value, base);
            Property {
                value,
                ..property.clone()
            }
        })
        .collect()
}

/// 用启动参数覆盖同名的全局参数
pub fn apply_start_params(global_params: &mut [Property], start_params: &HashMap<String, String>) {
    for property in global_params.iter_mut() {
        if let Some(value) = start_params.get(&property.prop) {
            property.value = value.clone();
        }
    }
}

/// 替换 `${name}` 引用，未知的引用保持原样
pub fn replace_variables(value: &str, params: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = after[..end].trim();
                match params.get(name) {
                    Some(replacement) => result.push_str(replacement),
                    None => result.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// 展开 `$[...]` 时间占位符
pub fn replace_time_placeholders(value: &str, base: DateTime<Utc>) -> String {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("$[") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find(']') {
            Some(end) => {
                result.push_str(&evaluate_time_expression(&after[..end], base));
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// 求值形如 `yyyyMMdd`、`yyyy-MM-dd-1`、`yyyyMMdd+7` 的表达式
fn evaluate_time_expression(expression: &str, base: DateTime<Utc>) -> String {
    let expression = expression.trim();
    let (pattern, offset_days) = split_day_offset(expression);
    let date = base + Duration::days(offset_days);
    date.format(&to_chrono_format(pattern)).to_string()
}

/// 拆分末尾的天数偏移，例如 `yyyy-MM-dd-1` -> (`yyyy-MM-dd`, -1)
fn split_day_offset(expression: &str) -> (&str, i64) {
    if let Some(pos) = expression.rfind(['+', '-']) {
        let (pattern, offset) = expression.split_at(pos);
        if offset.len() > 1 && offset[1..].chars().all(|c| c.is_ascii_digit()) {
            if let Ok(days) = offset.parse::<i64>() {
                return (pattern, days);
            }
        }
    }
    (expression, 0)
}

fn to_chrono_format(pattern: &str) -> String {
    pattern
        .replace("yyyy", "%Y")
        .replace("MM", "%m")
        .replace("dd", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::date::parse_datetime;

    fn base() -> DateTime<Utc> {
        parse_datetime("2020-01-20 08:30:00").unwrap()
    }

    #[test]
    fn test_time_placeholders() {
        assert_eq!(replace_time_placeholders("$[yyyyMMdd]", base()), "20200120");
        assert_eq!(replace_time_placeholders("$[yyyy-MM-dd-1]", base()), "2020-01-19");
        assert_eq!(replace_time_placeholders("$[yyyyMMdd+7]", base()), "20200127");
        assert_eq!(replace_time_placeholders("dt=$[HHmmss]", base()), "dt=083000");
        assert_eq!(
            replace_time_placeholders("$[yyyyMMddHHmmss]", base()),
            "20200120083000"
        );
    }

    #[test]
    fn test_replace_variables() {
        let mut params = HashMap::new();
        params.insert("a".to_string(), "1".to_string());
        assert_eq!(replace_variables("x=${a},y=${b}", &params), "x=1,y=${b}");
        assert_eq!(replace_variables("${a", &params), "${a");
    }

    #[test]
    fn test_cure_global_params_for_complement() {
        let params = vec![
            Property::new("bizdate", "${system.biz.date}"),
            Property::new("day", "$[yyyyMMdd]"),
        ];
        let cured = cure_global_params(
            &params,
            CommandType::ComplementData,
            Some(base()),
            Utc::now(),
        );
        assert_eq!(cured[0].value, "20200119");
        assert_eq!(cured[1].value, "20200120");
    }

    #[test]
    fn test_apply_start_params() {
        let mut params = vec![Property::new("a", "1"), Property::new("b", "2")];
        let mut overrides = HashMap::new();
        overrides.insert("b".to_string(), "20".to_string());
        apply_start_params(&mut params, &overrides);
        assert_eq!(params[0].value, "1");
        assert_eq!(params[1].value, "20");
    }
}
