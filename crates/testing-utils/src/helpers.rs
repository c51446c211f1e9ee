//! Test helper utilities

use chrono::{DateTime, TimeZone, Utc};
use scheduler_core::config::MasterConfig;
use std::time::Duration;
use tokio::time::sleep;

pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Master configuration with short poll intervals for fast tests
    pub fn fast_master_config() -> MasterConfig {
        MasterConfig {
            listen_host: "127.0.0.1:5678".to_string(),
            state_poll_interval_ms: 5,
            command_poll_interval_ms: 5,
            task_commit_retry_times: 2,
            task_commit_interval_ms: 1,
            ..MasterConfig::default()
        }
    }
}

/// UTC time from calendar fields
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .expect("invalid calendar date in test fixture")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_utc_builds_exact_time() {
        let time = utc(2019, 1, 20, 13, 5, 9);
        assert_eq!((time.year(), time.month(), time.day()), (2019, 1, 20));
        assert_eq!((time.hour(), time.minute(), time.second()), (13, 5, 9));
    }

    #[test]
    #[should_panic(expected = "invalid calendar date")]
    fn test_utc_rejects_invalid_date() {
        utc(2019, 2, 30, 0, 0, 0);
    }
}
