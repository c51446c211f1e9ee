use chrono::{TimeZone, Utc};
use scheduler_dispatcher::cron_utils::merged_fire_dates;
use scheduler_dispatcher::CronScheduler;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== 补数日期演示 ===\n");

    let start = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).single().ok_or("无效的开始时间")?;
    let end = Utc.with_ymd_and_hms(2019, 1, 10, 0, 0, 0).single().ok_or("无效的结束时间")?;
    println!("补数区间: {} ~ {}\n", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"));

    println!("1. 单个定时配置（隔天零点）:");
    let every_other_day = CronScheduler::new("0 0 0 1/2 * ?")?;
    for date in every_other_day.fire_dates_between(start, end) {
        println!("   {}", date.format("%Y-%m-%d %H:%M:%S"));
    }

    println!();
    println!("2. 多个定时配置合并去重:");
    let crontabs = vec!["0 0 0 1/2 * ?".to_string(), "0 0 0 1/3 * ?".to_string()];
    for date in merged_fire_dates(&crontabs, start, end)? {
        println!("   {}", date.format("%Y-%m-%d %H:%M:%S"));
    }

    println!();
    println!("3. 下一次触发:");
    match every_other_day.next_execution_time(end) {
        Some(next) => println!("   {}", next.format("%Y-%m-%d %H:%M:%S")),
        None => println!("   无"),
    }

    Ok(())
}
