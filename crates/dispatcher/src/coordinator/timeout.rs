//! 超时判断

use chrono::{DateTime, Duration, Utc};

use scheduler_core::models::{Flag, ProcessInstance, TaskInstance};

/// 开启超时检查、尚未告警且运行时长超过阈值的任务
pub fn task_timed_out(task: &TaskInstance, now: DateTime<Utc>) -> bool {
    if !task.timeout.enable || task.timeout.interval <= 0 || task.alert_flag == Flag::Yes {
        return false;
    }
    if task.state.is_finished() {
        return false;
    }
    match task.start_time.or(task.submit_time) {
        Some(start) => now - start > Duration::minutes(i64::from(task.timeout.interval)),
        None => false,
    }
}

/// 工作流实例运行时长超过定义的超时时间
pub fn process_timed_out(instance: &ProcessInstance, now: DateTime<Utc>) -> bool {
    if instance.timeout <= 0 {
        return false;
    }
    match instance.start_time {
        Some(start) => now - start > Duration::minutes(i64::from(instance.timeout)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::{ExecutionStatus, TaskNode, TaskTimeout, TimeoutStrategy};

    fn running_task(interval: i32, started_minutes_ago: i64, now: DateTime<Utc>) -> TaskInstance {
        let mut node = TaskNode::new("slow", "SHELL");
        node.timeout = TaskTimeout {
            enable: true,
            strategy: TimeoutStrategy::Warn,
            interval,
        };
        let mut task = TaskInstance::from_node(&node, 1, 1);
        task.state = ExecutionStatus::RunningExecution;
        task.start_time = Some(now - Duration::minutes(started_minutes_ago));
        task
    }

    #[test]
    fn test_task_timeout_fires_once() {
        let now = Utc::now();
        assert!(!task_timed_out(&running_task(10, 5, now), now));

        let mut task = running_task(10, 11, now);
        assert!(task_timed_out(&task, now));
        task.alert_flag = Flag::Yes;
        assert!(!task_timed_out(&task, now));
    }

    #[test]
    fn test_disabled_timeout_never_fires() {
        let now = Utc::now();
        let mut task = running_task(10, 60, now);
        task.timeout.enable = false;
        assert!(!task_timed_out(&task, now));
    }
}
