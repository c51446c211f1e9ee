pub mod in_memory;
pub mod redis;

pub use self::redis::RedisTaskQueue;
pub use in_memory::InMemoryTaskQueue;

use scheduler_core::config::{TaskQueueBackend, TaskQueueConfig};
use scheduler_core::traits::TaskQueue;
use scheduler_core::SchedulerResult;
use std::sync::Arc;
use tracing::info;

/// 按配置创建任务队列
pub async fn create_task_queue(config: &TaskQueueConfig) -> SchedulerResult<Arc<dyn TaskQueue>> {
    match config.backend {
        TaskQueueBackend::Redis => {
            info!("使用Redis任务队列: {}", config.queue_key);
            Ok(Arc::new(
                RedisTaskQueue::new(&config.url, config.queue_key.clone()).await?,
            ))
        }
        TaskQueueBackend::Memory => {
            info!("使用内存任务队列");
            Ok(Arc::new(InMemoryTaskQueue::new()))
        }
    }
}
