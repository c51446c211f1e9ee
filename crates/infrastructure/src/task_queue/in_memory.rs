use async_trait::async_trait;
use scheduler_core::traits::TaskQueue;
use scheduler_core::{SchedulerResult, TaskPriorityKey};
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::debug;

/// 内存任务优先级队列
///
/// 键按 `TaskPriorityKey` 的数值顺序保存，适用于嵌入式部署与测试。
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    keys: Mutex<BTreeSet<TaskPriorityKey>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前队列内容快照，按优先级排列
    pub async fn snapshot(&self) -> Vec<TaskPriorityKey> {
        self.keys.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn put(&self, key: &TaskPriorityKey) -> SchedulerResult<()> {
        if self.keys.lock().await.insert(key.clone()) {
            debug!("任务放入队列: {}", key);
        }
        Ok(())
    }

    async fn poll(&self, limit: usize) -> SchedulerResult<Vec<TaskPriorityKey>> {
        let mut keys = self.keys.lock().await;
        let mut polled = Vec::with_capacity(limit.min(keys.len()));
        while polled.len() < limit {
            match keys.pop_first() {
                Some(key) => polled.push(key),
                None => break,
            }
        }
        Ok(polled)
    }

    async fn contains(&self, key: &TaskPriorityKey) -> SchedulerResult<bool> {
        Ok(self.keys.lock().await.contains(key))
    }

    async fn remove(&self, key: &TaskPriorityKey) -> SchedulerResult<bool> {
        Ok(self.keys.lock().await.remove(key))
    }

    async fn size(&self) -> SchedulerResult<usize> {
        Ok(self.keys.lock().await.len())
    }
}
