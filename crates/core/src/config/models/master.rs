use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::DEFAULT_WORKER_GROUP;

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// 写入工作流实例与任务实例的主机标识
    pub listen_host: String,
    /// 同时运行的工作流协调器上限
    pub exec_threads: usize,
    /// 单个工作流实例内并行运行的任务上限
    pub exec_task_num: usize,
    pub state_poll_interval_ms: u64,
    pub command_poll_interval_ms: u64,
    pub heartbeat_interval_seconds: u64,
    pub heartbeat_timeout_seconds: u64,
    pub failover_check_interval_seconds: u64,
    /// 任务提交失败时的重试次数
    pub task_commit_retry_times: u32,
    pub task_commit_interval_ms: u64,
    pub default_worker_group: String,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            listen_host: "127.0.0.1:5678".to_string(),
            exec_threads: 100,
            exec_task_num: 20,
            state_poll_interval_ms: 1000,
            command_poll_interval_ms: 1000,
            heartbeat_interval_seconds: 10,
            heartbeat_timeout_seconds: 60,
            failover_check_interval_seconds: 30,
            task_commit_retry_times: 5,
            task_commit_interval_ms: 1000,
            default_worker_group: DEFAULT_WORKER_GROUP.to_string(),
        }
    }
}

impl MasterConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen_host.is_empty() {
            return Err(anyhow::anyhow!("Master主机标识不能为空"));
        }

        if self.exec_threads == 0 {
            return Err(anyhow::anyhow!("工作流执行线程数必须大于0"));
        }

        if self.exec_task_num == 0 {
            return Err(anyhow::anyhow!("任务并行数必须大于0"));
        }

        if self.state_poll_interval_ms == 0 || self.command_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        if self.heartbeat_interval_seconds == 0 || self.failover_check_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔与失联检测间隔必须大于0"));
        }

        if self.heartbeat_timeout_seconds <= self.heartbeat_interval_seconds {
            return Err(anyhow::anyhow!("心跳超时时间必须大于心跳间隔"));
        }

        if self.task_commit_retry_times == 0 {
            return Err(anyhow::anyhow!("任务提交重试次数必须大于0"));
        }

        if self.default_worker_group.trim().is_empty() {
            return Err(anyhow::anyhow!("默认Worker分组不能为空"));
        }

        Ok(())
    }

    pub fn state_poll_interval(&self) -> Duration {
        Duration::from_millis(self.state_poll_interval_ms)
    }

    pub fn command_poll_interval(&self) -> Duration {
        Duration::from_millis(self.command_poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn failover_check_interval(&self) -> Duration {
        Duration::from_secs(self.failover_check_interval_seconds)
    }

    pub fn task_commit_interval(&self) -> Duration {
        Duration::from_millis(self.task_commit_interval_ms)
    }
}
