//! 任务队列排序键
//!
//! 格式: `{工作流实例优先级}_{工作流实例ID}_{任务优先级}_{任务实例ID}_{Worker IP列表}`。
//! 优先级为序号（越小越高），Worker IP以逗号分隔，无法解析时使用默认哨兵值。

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::SchedulerError;

/// 不限定Worker的哨兵值
pub const DEFAULT_WORKER_SENTINEL: &str = "-1";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskPriorityKey {
    pub process_instance_priority: i32,
    pub process_instance_id: i64,
    pub task_instance_priority: i32,
    pub task_instance_id: i64,
    /// 逗号分隔的Worker IP，或默认哨兵值
    pub worker_ips: String,
}

impl TaskPriorityKey {
    pub fn new(
        process_instance_priority: i32,
        process_instance_id: i64,
        task_instance_priority: i32,
        task_instance_id: i64,
        worker_ips: &[String],
    ) -> Self {
        let worker_ips = if worker_ips.is_empty() {
            DEFAULT_WORKER_SENTINEL.to_string()
        } else {
            worker_ips.join(",")
        };
        Self {
            process_instance_priority,
            process_instance_id,
            task_instance_priority,
            task_instance_id,
            worker_ips,
        }
    }

    pub fn is_any_worker(&self) -> bool {
        self.worker_ips == DEFAULT_WORKER_SENTINEL
    }

    /// 可执行该任务的Worker IP列表，空表示任意Worker
    pub fn worker_ip_list(&self) -> Vec<&str> {
        if self.is_any_worker() {
            return Vec::new();
        }
        self.worker_ips.split(',').filter(|s| !s.is_empty()).collect()
    }

    fn sort_tuple(&self) -> (i32, i64, i32, i64) {
        (
            self.process_instance_priority,
            self.process_instance_id,
            self.task_instance_priority,
            self.task_instance_id,
        )
    }
}

impl fmt::Display for TaskPriorityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.process_instance_priority,
            self.process_instance_id,
            self.task_instance_priority,
            self.task_instance_id,
            self.worker_ips
        )
    }
}

impl FromStr for TaskPriorityKey {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchedulerError::TaskQueue(format!("无效的任务队列键: {s}"));
        let mut parts = s.splitn(5, '_');
        let mut next_number = || -> Result<i64, SchedulerError> {
            parts
                .next()
                .and_then(|p| p.parse::<i64>().ok())
                .ok_or_else(invalid)
        };
        let process_instance_priority = next_number()? as i32;
        let process_instance_id = next_number()?;
        let task_instance_priority = next_number()? as i32;
        let task_instance_id = next_number()?;
        let worker_ips = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(invalid)?
            .to_string();
        Ok(Self {
            process_instance_priority,
            process_instance_id,
            task_instance_priority,
            task_instance_id,
            worker_ips,
        })
    }
}

impl Ord for TaskPriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_tuple()
            .cmp(&other.sort_tuple())
            .then_with(|| self.worker_ips.cmp(&other.worker_ips))
    }
}

impl PartialOrd for TaskPriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
