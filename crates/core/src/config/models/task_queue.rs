use serde::{Deserialize, Serialize};

/// 任务队列后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskQueueBackend {
    #[default]
    Redis,
    Memory,
}

/// Task queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueueConfig {
    #[serde(default)]
    pub backend: TaskQueueBackend,
    pub url: String,
    pub queue_key: String,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            backend: TaskQueueBackend::Redis,
            url: "redis://localhost:6379".to_string(),
            queue_key: "scheduler:tasks_queue".to_string(),
        }
    }
}

impl TaskQueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue_key.is_empty() {
            return Err(anyhow::anyhow!("任务队列键不能为空"));
        }

        if self.backend == TaskQueueBackend::Redis
            && !self.url.starts_with("redis://")
            && !self.url.starts_with("rediss://")
        {
            return Err(anyhow::anyhow!("Redis队列URL必须以redis://或rediss://开头"));
        }

        Ok(())
    }
}
